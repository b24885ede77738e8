//! Database models mapping to the metadata schema.

use crate::error::MetadataResult;
use lorry_core::{ContentHash, PackageId, ResourceId, TagName};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Users
// =============================================================================

/// Account record. `token_hash` is the SHA-256 hex of the bearer token.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub name: String,
    pub is_moderator: bool,
    pub token_hash: String,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Packages
// =============================================================================

/// Package aggregate root.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub package_id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub author: String,
    pub description: String,
    pub long_description: String,
    /// Derived search document, see `lorry_core::package::search_text`.
    pub search_text: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PackageRow {
    pub fn id(&self) -> PackageId {
        PackageId::from_uuid(self.package_id)
    }
}

// =============================================================================
// Resources
// =============================================================================

/// One uploaded file owned by a package.
#[derive(Debug, Clone, FromRow)]
pub struct ResourceRow {
    pub resource_id: Uuid,
    pub package_id: Uuid,
    pub owner_id: Uuid,
    pub original_filename: String,
    pub size_bytes: i64,
    pub md5: String,
    pub sha256: String,
    pub created_at: OffsetDateTime,
}

impl ResourceRow {
    pub fn id(&self) -> ResourceId {
        ResourceId::from_uuid(self.resource_id)
    }

    pub fn package(&self) -> PackageId {
        PackageId::from_uuid(self.package_id)
    }

    /// Strong digest, also the blob key.
    pub fn content_hash(&self) -> MetadataResult<ContentHash> {
        Ok(ContentHash::from_hex(&self.sha256)?)
    }

    pub fn size(&self) -> u64 {
        self.size_bytes.max(0) as u64
    }
}

/// A resource to insert as part of a package write.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub resource_id: ResourceId,
    pub original_filename: String,
    pub size_bytes: u64,
    pub md5: String,
    pub sha256: ContentHash,
}

// =============================================================================
// Tags
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TagRow {
    pub tag_id: i64,
    pub title: String,
}

impl TagRow {
    pub fn name(&self) -> TagName {
        TagName::from_stored(&self.title)
    }
}

// =============================================================================
// Package writes
// =============================================================================

/// Complete state of a package to create.
#[derive(Debug, Clone)]
pub struct NewPackage {
    pub package_id: PackageId,
    pub owner_id: Uuid,
    pub title: String,
    pub author: String,
    pub description: String,
    pub long_description: String,
    pub search_text: String,
    /// Final tag set, user tags and auto-tags together.
    pub tags: Vec<TagName>,
    /// Requested outgoing edges; filtered like [`DependencyRepo::set_dependencies`].
    ///
    /// [`DependencyRepo::set_dependencies`]: crate::repos::DependencyRepo::set_dependencies
    pub dependencies: Vec<PackageId>,
    pub resources: Vec<NewResource>,
    pub created_at: OffsetDateTime,
}

/// Desired-state diff applied to an existing package.
#[derive(Debug, Clone)]
pub struct PackageUpdate {
    pub package_id: PackageId,
    pub title: String,
    pub author: String,
    pub description: String,
    pub long_description: String,
    /// New search document, or `None` to keep the stored one.
    pub search_text: Option<String>,
    /// Final tag set after the update.
    pub tags: Vec<TagName>,
    /// Desired outgoing edges after the update.
    pub dependencies: Vec<PackageId>,
    /// Resources to detach. Ids owned by other packages are ignored.
    pub remove_resources: Vec<ResourceId>,
    pub add_resources: Vec<NewResource>,
    pub updated_at: OffsetDateTime,
}

/// Outcome of reconciling a package's outgoing edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyChange {
    pub added: Vec<PackageId>,
    pub removed: Vec<PackageId>,
    /// Requested edges that were silently skipped: self references,
    /// duplicates, unknown packages and edges that would close a cycle.
    pub dropped: Vec<PackageId>,
}

/// What a committed package write left behind for post-commit cleanup.
#[derive(Debug, Clone, Default)]
pub struct PackageChanges {
    /// Tags that lost an association and may now be orphaned.
    pub removed_tag_ids: Vec<i64>,
    /// Digests of resources that were deleted; candidates for blob removal.
    pub removed_hashes: Vec<ContentHash>,
    pub dependencies: DependencyChange,
}

// =============================================================================
// Search
// =============================================================================

/// Explicit listing query.
#[derive(Debug, Clone)]
pub struct PackageQuery {
    /// Matched as whole words against the search text, any keyword suffices.
    pub keywords: Vec<String>,
    /// Every tag must be present on a match.
    pub tags: Vec<TagName>,
    pub sort: lorry_core::SortOrder,
    pub offset: u64,
    pub limit: u64,
}

impl Default for PackageQuery {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            tags: Vec::new(),
            sort: lorry_core::SortOrder::newest_first(),
            offset: 0,
            limit: 50,
        }
    }
}

/// One page of search results plus the total match count.
#[derive(Debug, Clone, Default)]
pub struct PackagePage {
    pub ids: Vec<PackageId>,
    pub total: u64,
}
