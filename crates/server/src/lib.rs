//! HTTP server for the lorry package host.
//!
//! This crate provides:
//! - The resource registry (upload staging and ingestion)
//! - The package transaction coordinator
//! - Token authentication and the owner-or-moderator rule
//! - Read and write HTTP endpoints
//! - Prometheus metrics

pub mod auth;
pub mod bootstrap;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod resources;
pub mod routes;
pub mod state;

pub use auth::{TraceId, UserIdentity};
pub use coordinator::{PackageCoordinator, PackageEdit, PackageSubmission, TxState};
pub use error::ApiError;
pub use resources::{ResourceRegistry, StagedFile};
pub use routes::create_router;
pub use state::AppState;
