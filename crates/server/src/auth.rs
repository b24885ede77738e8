//! Authentication collaborator and request middleware.
//!
//! Callers identify themselves with a bearer token. The token is hashed with
//! SHA-256 and looked up in the users table; the resulting [`UserIdentity`]
//! drives the owner-or-moderator rule for package mutations.

use crate::error::ApiError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use lorry_metadata::{MetadataError, MetadataStore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Maximum length for trace IDs.
/// Longer trace IDs are truncated to prevent log bloat and potential log injection.
const MAX_TRACE_ID_LEN: usize = 128;

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a trace ID from a client-provided value, keeping at most
    /// [`MAX_TRACE_ID_LEN`] printable ASCII characters.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic() || *c == ' ')
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is making a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub name: String,
    pub is_moderator: bool,
}

impl UserIdentity {
    /// Owner-or-moderator rule for package mutations.
    pub fn can_modify(&self, owner_id: Uuid) -> bool {
        self.is_moderator || self.user_id == owner_id
    }
}

/// Credentials presented by a caller.
#[derive(Clone, Debug)]
pub enum Credentials {
    BearerToken(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => ApiError::Unauthorized("invalid token".to_string()),
            AuthError::Metadata(e) => ApiError::Metadata(e),
        }
    }
}

/// Resolves credentials to an identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError>;
}

/// Bearer-token authenticator backed by the users table.
pub struct TokenAuthenticator {
    metadata: Arc<dyn MetadataStore>,
}

impl TokenAuthenticator {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserIdentity, AuthError> {
        let Credentials::BearerToken(token) = credentials;
        let user = self
            .metadata
            .get_user_by_token_hash(&hash_token(token))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        Ok(UserIdentity {
            user_id: user.user_id,
            name: user.name,
            is_moderator: user.is_moderator,
        })
    }
}

/// Authenticated request extension.
///
/// Also usable as an extractor; it rejects unauthenticated requests with 401.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub identity: UserIdentity,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
    }
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
}

fn extract_or_generate_trace_id(req: &Request) -> TraceId {
    req.headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_else(TraceId::new)
}

/// SHA-256 hex of a bearer token, as stored in the users table.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Authentication middleware that validates tokens and sets up trace context.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let trace_id = extract_or_generate_trace_id(&req);
    let trace_id_str = trace_id.0.clone();
    req.extensions_mut().insert(trace_id);

    if let Some(token) = extract_bearer_token(&req) {
        let credentials = Credentials::BearerToken(token.to_string());
        let identity = state.authenticator.authenticate(&credentials).await?;
        req.extensions_mut().insert(AuthenticatedUser { identity });
    }

    let response = next
        .run(req)
        .instrument(tracing::info_span!("request", trace_id = %trace_id_str))
        .await;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_sanitized() {
        let id = TraceId::from_client("abc\n\u{7f}def");
        assert_eq!(id.as_str(), "abcdef");
        assert_eq!(TraceId::from_client(&"x".repeat(500)).as_str().len(), 128);
        assert!(!TraceId::from_client("\n\n").as_str().is_empty());
    }

    #[test]
    fn test_hash_token_matches_known_digest() {
        assert_eq!(
            hash_token("test-admin-token"),
            lorry_core::ContentHash::compute(b"test-admin-token").to_hex()
        );
    }

    #[test]
    fn test_can_modify() {
        let owner = Uuid::new_v4();
        let user = UserIdentity {
            user_id: owner,
            name: "alice".into(),
            is_moderator: false,
        };
        assert!(user.can_modify(owner));
        assert!(!user.can_modify(Uuid::new_v4()));

        let moderator = UserIdentity {
            is_moderator: true,
            ..user
        };
        assert!(moderator.can_modify(Uuid::new_v4()));
    }
}
