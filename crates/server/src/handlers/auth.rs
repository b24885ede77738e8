//! Authentication-related endpoints.

use crate::auth::AuthenticatedUser;
use axum::Json;
use serde::Serialize;

/// Response for the authenticated caller.
#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub user_id: String,
    pub name: String,
    pub is_moderator: bool,
}

/// GET /v1/auth/whoami - Return the caller's identity.
pub async fn whoami(auth: AuthenticatedUser) -> Json<WhoamiResponse> {
    let identity = auth.identity;
    Json(WhoamiResponse {
        user_id: identity.user_id.simple().to_string(),
        name: identity.name,
        is_moderator: identity.is_moderator,
    })
}
