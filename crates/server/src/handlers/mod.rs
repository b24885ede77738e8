//! HTTP request handlers.

pub mod auth;
pub mod catalog;
pub mod common;
pub mod files;
pub mod uploads;

pub use auth::*;
pub use catalog::*;
pub use common::*;
pub use files::*;
pub use uploads::*;
