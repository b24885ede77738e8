//! Tag repository.

use crate::error::MetadataResult;
use crate::models::TagRow;
use async_trait::async_trait;
use lorry_core::{PackageId, TagName};

/// Repository for the shared tag registry.
#[async_trait]
pub trait TagRepo: Send + Sync {
    /// Return the tag with this canonical title, creating it if needed.
    async fn resolve_tag(&self, name: &TagName) -> MetadataResult<TagRow>;

    async fn get_tag_by_title(&self, title: &str) -> MetadataResult<Option<TagRow>>;

    /// Tags of a package, ordered by title.
    async fn get_package_tags(&self, package_id: PackageId) -> MetadataResult<Vec<TagRow>>;

    /// Delete every candidate tag with no remaining package association.
    ///
    /// Runs in its own transaction and must be called after the write that
    /// removed the associations has committed. Returns the deleted titles.
    async fn gc_orphan_tags(&self, candidate_ids: &[i64]) -> MetadataResult<Vec<String>>;

    /// User tags whose title contains `fragment`, ordered by title.
    async fn suggest_tags(&self, fragment: &str, limit: u32) -> MetadataResult<Vec<String>>;
}
