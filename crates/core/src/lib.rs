//! Core domain types and shared logic for the lorry package host.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Resource digests (strong and weak) and blob keys
//! - Package and resource identifiers
//! - Slug, filename and tag canonicalisation
//! - Upload validation rules
//! - Configuration structs

pub mod config;
pub mod error;
pub mod hash;
pub mod package;
pub mod size;
pub mod slug;
pub mod tag;

pub use error::{Error, Result};
pub use hash::{ContentHash, DigestHasher, Md5Digest, ResourceDigests};
pub use package::{PackageId, ResourceId, SortKey, SortOrder, UploadRules};
pub use size::format_size;
pub use slug::{secure_filename, slugify};
pub use tag::TagName;

/// Maximum length of a canonical tag title.
pub const MAX_TAG_LEN: usize = 32;

/// Minimum length of a canonical tag title.
pub const MIN_TAG_LEN: usize = 2;

/// Maximum length of a package slug.
pub const MAX_SLUG_LEN: usize = 32;
