//! Moderator account initialization.

use anyhow::{Context, Result, anyhow};
use lorry_core::config::AdminConfig;
use lorry_metadata::MetadataStore;

/// Ensure the configured moderator account exists with the configured token.
///
/// Idempotent. If the token hash changes between restarts the account keeps
/// its id and packages; only the token it answers to is replaced.
pub async fn ensure_admin_user(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    // Lowercase so it matches auth::hash_token output.
    let hash = config.normalized_token_hash().map_err(|e| anyhow!(e))?;

    if let Some(existing) = metadata.get_user_by_token_hash(&hash).await? {
        if existing.name == config.name && existing.is_moderator {
            tracing::debug!(user_id = %existing.user_id, "admin account already exists");
            return Ok(());
        }
        if existing.name != config.name {
            anyhow::bail!(
                "admin token hash is already used by account '{}'; use a new token hash",
                existing.name
            );
        }
    }

    let user = metadata
        .upsert_user_by_name(&config.name, &hash, true)
        .await
        .context("failed to create admin account")?;
    tracing::info!(user_id = %user.user_id, name = %user.name, "admin account ready");

    Ok(())
}
