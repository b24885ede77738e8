//! Dependency graph repository.

use crate::error::MetadataResult;
use crate::models::DependencyChange;
use async_trait::async_trait;
use lorry_core::PackageId;

/// Repository for directed dependency edges between packages.
#[async_trait]
pub trait DependencyRepo: Send + Sync {
    /// Whether adding the edge `from -> to` would close a cycle.
    ///
    /// True when `from == to` or when `from` is reachable from `to` by
    /// following dependency edges.
    async fn would_create_cycle(&self, from: PackageId, to: PackageId) -> MetadataResult<bool>;

    /// Reconcile the outgoing edges of `package_id` with `desired`.
    ///
    /// Self references, duplicates, unknown packages and cycle-closing edges
    /// are dropped silently and reported in [`DependencyChange::dropped`].
    async fn set_dependencies(
        &self,
        package_id: PackageId,
        desired: &[PackageId],
    ) -> MetadataResult<DependencyChange>;

    /// Packages `package_id` depends on.
    async fn get_dependencies(&self, package_id: PackageId) -> MetadataResult<Vec<PackageId>>;

    /// Packages that depend on `package_id`.
    async fn get_dependants(&self, package_id: PackageId) -> MetadataResult<Vec<PackageId>>;
}
