//! Metadata store for the lorry package host.
//!
//! This crate provides the relational side of the package aggregate:
//! - Packages, their resources and tag associations
//! - The dependency graph with cycle detection
//! - Tag orphan collection
//! - Accounts used by token authentication
//!
//! SQLite is the only backend.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use lorry_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::new(&config.path, config.query_timeout_secs).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested/metadata.db");
        let config = MetadataConfig {
            path: db_path.clone(),
            query_timeout_secs: None,
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        // Migrations are idempotent.
        store.migrate().await.unwrap();
        assert!(db_path.exists());
    }
}
