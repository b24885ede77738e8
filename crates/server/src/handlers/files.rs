//! Resource downloads.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use lorry_core::ResourceId;

/// GET /api/files/{id} - Stream a resource under its original filename.
///
/// Malformed ids are answered like unknown ones.
#[tracing::instrument(skip(state))]
pub async fn download_file(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> ApiResult<Response> {
    let resource_id = ResourceId::parse(&resource_id)?;
    let (resource, stream) = state.resources.open(resource_id).await?;

    let body = Body::from_stream(
        stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string()))),
    );
    // Stored filenames are sanitised to [A-Za-z0-9_.-], no quoting needed.
    let disposition = format!("attachment; filename=\"{}\"", resource.original_filename);

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_LENGTH, resource.size().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
