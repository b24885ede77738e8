//! Application state shared across handlers.

use crate::auth::{Authenticator, TokenAuthenticator};
use crate::coordinator::PackageCoordinator;
use crate::resources::ResourceRegistry;
use anyhow::Context;
use lorry_core::UploadRules;
use lorry_core::config::AppConfig;
use lorry_metadata::MetadataStore;
use lorry_storage::BlobStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Content store.
    pub blobs: BlobStore,
    pub resources: ResourceRegistry,
    pub coordinator: PackageCoordinator,
    /// Resolves bearer tokens to users.
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Validates the configuration and creates the staging directory. Fails
    /// on an invalid configuration instead of starting half-configured.
    pub async fn new(
        config: AppConfig,
        blobs: BlobStore,
        metadata: Arc<dyn MetadataStore>,
    ) -> anyhow::Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        let resources = ResourceRegistry::new(
            blobs.clone(),
            metadata.clone(),
            config.storage.staging_path.clone(),
        )
        .await
        .with_context(|| {
            format!(
                "failed to prepare staging directory {}",
                config.storage.staging_path.display()
            )
        })?;

        let coordinator = PackageCoordinator::new(
            metadata.clone(),
            resources.clone(),
            UploadRules::new(config.packages.clone()),
        );
        let authenticator: Arc<dyn Authenticator> =
            Arc::new(TokenAuthenticator::new(metadata.clone()));

        Ok(Self {
            config: Arc::new(config),
            metadata,
            blobs,
            resources,
            coordinator,
            authenticator,
        })
    }

    /// Clamp a requested page size to the configured bounds.
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        self.config.server.page_limit(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorry_metadata::SqliteStore;
    use lorry_storage::FilesystemBackend;
    use tempfile::tempdir;

    async fn parts(dir: &std::path::Path) -> (BlobStore, Arc<dyn MetadataStore>) {
        let backend = FilesystemBackend::new(dir.join("resources")).await.unwrap();
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(dir.join("metadata.db"), None).await.unwrap());
        (BlobStore::new(Arc::new(backend)), metadata)
    }

    #[tokio::test]
    async fn new_creates_staging_directory() {
        let temp = tempdir().unwrap();
        let (blobs, metadata) = parts(temp.path()).await;
        let mut config = AppConfig::for_testing();
        config.storage.path = temp.path().join("resources");
        config.storage.staging_path = temp.path().join("staging");

        let state = AppState::new(config, blobs, metadata).await.unwrap();
        assert!(temp.path().join("staging").is_dir());
        assert_eq!(state.page_limit(Some(10_000)), 500);
    }

    #[tokio::test]
    async fn new_rejects_invalid_config() {
        let temp = tempdir().unwrap();
        let (blobs, metadata) = parts(temp.path()).await;
        let mut config = AppConfig::for_testing();
        config.packages.allowed_extensions.clear();

        let err = AppState::new(config, blobs, metadata).await.err().unwrap();
        assert!(err.to_string().contains("allowed_extensions"));
    }
}
