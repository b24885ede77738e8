//! Blob storage for the lorry package host.
//!
//! This crate provides:
//! - An object-store abstraction with atomic writes
//! - A local filesystem backend
//! - The content-addressed [`BlobStore`] with per-digest leases

pub mod backends;
pub mod blob;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use blob::{BlobLease, BlobStore, PutOutcome, RemovalGuard};
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectStore, StreamingUpload};

use lorry_core::config::StorageConfig;
use std::sync::Arc;

/// Create the content store described by `config`.
pub async fn from_config(config: &StorageConfig) -> StorageResult<BlobStore> {
    config.validate().map_err(StorageError::Config)?;
    let backend = FilesystemBackend::new(&config.path).await?;
    Ok(BlobStore::new(Arc::new(backend)))
}
