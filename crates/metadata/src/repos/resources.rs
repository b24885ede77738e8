//! Resource repository.

use crate::error::MetadataResult;
use crate::models::ResourceRow;
use async_trait::async_trait;
use lorry_core::{ContentHash, PackageId, ResourceId};

/// Read access to resources. Writes go through [`crate::repos::PackageRepo`].
#[async_trait]
pub trait ResourceRepo: Send + Sync {
    async fn get_resource(&self, resource_id: ResourceId) -> MetadataResult<Option<ResourceRow>>;

    /// Resources of a package, oldest first.
    async fn get_package_resources(&self, package_id: PackageId)
    -> MetadataResult<Vec<ResourceRow>>;

    /// Number of committed resources referencing a digest.
    async fn count_resources_with_hash(&self, hash: &ContentHash) -> MetadataResult<u64>;
}
