//! Shared helpers for metadata store tests.

use lorry_core::{ContentHash, PackageId, ResourceId, TagName};
use lorry_metadata::models::{NewPackage, NewResource, UserRow};
use lorry_metadata::repos::UserRepo;
use lorry_metadata::{MetadataStore, SqliteStore};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// In-memory SQLite store with one registered user.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<SqliteStore>,
    pub owner: UserRow,
}

impl TestMetadata {
    pub async fn new() -> Self {
        let store = Arc::new(SqliteStore::new(":memory:", None).await.unwrap());
        let owner = UserRow {
            user_id: Uuid::new_v4(),
            name: "alice".to_string(),
            is_moderator: false,
            token_hash: "a".repeat(64),
            created_at: OffsetDateTime::now_utc(),
        };
        store.create_user(&owner).await.unwrap();
        Self { store, owner }
    }

    #[allow(dead_code)]
    pub fn dyn_store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    /// A package with one resource holding `content`, created at `created_at`.
    #[allow(dead_code)]
    pub fn package(&self, title: &str, tags: &[&str], content: &[u8]) -> NewPackage {
        NewPackage {
            package_id: PackageId::new(),
            owner_id: self.owner.user_id,
            title: title.to_string(),
            author: self.owner.name.clone(),
            description: format!("{title} description"),
            long_description: String::new(),
            search_text: lorry_core::package::search_text(
                title,
                "",
                &self.owner.name,
                std::iter::empty(),
            ),
            tags: tags.iter().map(|t| TagName::from_stored(*t)).collect(),
            dependencies: Vec::new(),
            resources: vec![resource(&format!("{title}.ocs"), content)],
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[allow(dead_code)]
pub fn resource(filename: &str, content: &[u8]) -> NewResource {
    NewResource {
        resource_id: ResourceId::new(),
        original_filename: filename.to_string(),
        size_bytes: content.len() as u64,
        md5: lorry_core::Md5Digest::compute(content).to_hex(),
        sha256: ContentHash::compute(content),
    }
}
