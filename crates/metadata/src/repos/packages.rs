//! Package repository: the transactional write paths of the package aggregate.

use crate::error::MetadataResult;
use crate::models::{NewPackage, PackageChanges, PackagePage, PackageQuery, PackageRow, PackageUpdate};
use async_trait::async_trait;
use lorry_core::PackageId;

/// Repository for packages.
///
/// Each write runs in one database transaction covering the package row,
/// its resources, tag associations and dependency edges. Tag orphan
/// collection and blob removal are left to the caller, after commit.
#[async_trait]
pub trait PackageRepo: Send + Sync {
    /// Insert a package with its resources, tags and dependency edges.
    async fn create_package(&self, package: &NewPackage) -> MetadataResult<PackageChanges>;

    /// Apply a desired-state diff to an existing package.
    ///
    /// Fails with `Constraint` and persists nothing if the package would be
    /// left without resources.
    async fn update_package(&self, update: &PackageUpdate) -> MetadataResult<PackageChanges>;

    /// Delete a package: its resources, tag associations, edges in both
    /// directions, then the row itself.
    async fn delete_package(&self, package_id: PackageId) -> MetadataResult<PackageChanges>;

    async fn get_package(&self, package_id: PackageId) -> MetadataResult<Option<PackageRow>>;

    /// Search by keywords (any) and tags (all).
    async fn search_packages(&self, query: &PackageQuery) -> MetadataResult<PackagePage>;

    /// Every package id with its title, ordered by title.
    async fn list_package_suggestions(&self) -> MetadataResult<Vec<(PackageId, String)>>;
}
