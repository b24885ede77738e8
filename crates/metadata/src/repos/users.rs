//! User repository.

use crate::error::MetadataResult;
use crate::models::UserRow;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, user: &UserRow) -> MetadataResult<()>;

    async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>>;

    /// Look up the account owning a bearer token hash.
    async fn get_user_by_token_hash(&self, token_hash: &str) -> MetadataResult<Option<UserRow>>;

    /// Create the named account or re-point its token and role.
    async fn upsert_user_by_name(
        &self,
        name: &str,
        token_hash: &str,
        is_moderator: bool,
    ) -> MetadataResult<UserRow>;
}
