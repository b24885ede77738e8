//! Suggestion endpoints used by upload forms.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use lorry_core::TagName;
use serde::Deserialize;

const TAG_SUGGESTION_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct TagSuggestParams {
    #[serde(default)]
    pub tag: String,
}

/// GET /api/tags/suggest?tag= - The canonical form of the input followed by
/// existing user tags containing it.
pub async fn suggest_tags(
    State(state): State<AppState>,
    Query(params): Query<TagSuggestParams>,
) -> ApiResult<Json<Vec<String>>> {
    let Some(canonical) = TagName::user(&params.tag) else {
        return Ok(Json(Vec::new()));
    };

    let existing = state
        .metadata
        .suggest_tags(canonical.as_str(), TAG_SUGGESTION_LIMIT)
        .await?;

    let mut suggestions = vec![canonical.as_str().to_string()];
    suggestions.extend(existing.into_iter().filter(|t| t != canonical.as_str()));
    Ok(Json(suggestions))
}

/// GET /api/packages/suggestions - Every package as `"<id> <title>"`.
pub async fn package_suggestions(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let packages = state.metadata.list_package_suggestions().await?;
    Ok(Json(
        packages
            .into_iter()
            .map(|(id, title)| format!("{id} {title}"))
            .collect(),
    ))
}
