//! Package endpoints: search, detail, create, update and delete.
//!
//! Writes arrive as multipart forms. File parts are spooled to the staging
//! directory as they are read; everything else about the write is decided by
//! the [`PackageCoordinator`](crate::coordinator::PackageCoordinator).

use crate::auth::AuthenticatedUser;
use crate::coordinator::{PackageEdit, PackageSubmission};
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::format_timestamp;
use crate::resources::{ResourceRegistry, StagedFile};
use crate::state::AppState;
use axum::Json;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use lorry_core::package::{package_slug, search_keywords};
use lorry_core::{PackageId, SortOrder, TagName, secure_filename};
use lorry_metadata::models::{PackageQuery, PackageRow};
use serde::{Deserialize, Serialize};

/// Listing entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub id: String,
    pub title: String,
    pub author: String,
    pub slug: String,
    pub description: String,
    pub updated_at: String,
    pub tags: Vec<String>,
}

/// One file of a package.
#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub id: String,
    pub filename: String,
    /// Size in bytes.
    pub length: u64,
    /// Human-readable size.
    pub size: String,
    pub sha256: String,
    pub md5: String,
}

/// Detailed package payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDetail {
    #[serde(flatten)]
    pub summary: PackageSummary,
    pub long_description: String,
    pub created_at: String,
    pub dependencies: Vec<String>,
    pub dependants: Vec<String>,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    /// Comma separated; every tag must match.
    pub tags: Option<String>,
    pub sort: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SearchMeta {
    pub total: u64,
    pub skip: u64,
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub meta: SearchMeta,
    pub resources: Vec<PackageSummary>,
}

/// Body of a delete request.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub confirm_title: String,
}

/// GET /api/uploads - Search the catalog.
pub async fn search_packages(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let limit = state.page_limit(params.limit);
    let skip = params.skip.unwrap_or(0);

    let query = PackageQuery {
        keywords: params.q.as_deref().map(search_keywords).unwrap_or_default(),
        tags: params.tags.as_deref().map(tag_filter).unwrap_or_default(),
        sort: SortOrder::parse(params.sort.as_deref().unwrap_or("-updatedAt")),
        offset: skip,
        limit: u64::from(limit),
    };
    let page = state.metadata.search_packages(&query).await?;

    let mut resources = Vec::with_capacity(page.ids.len());
    for id in page.ids {
        // Deleted between the two queries.
        let Some(package) = state.metadata.get_package(id).await? else {
            continue;
        };
        resources.push(summarize(&state, &package).await?);
    }

    Ok(Json(SearchResponse {
        meta: SearchMeta {
            total: page.total,
            skip,
            limit,
        },
        resources,
    }))
}

/// GET /api/uploads/{id} - Package detail.
pub async fn get_package(
    State(state): State<AppState>,
    Path(package_id): Path<String>,
) -> ApiResult<Json<PackageDetail>> {
    let package_id = PackageId::parse(&package_id)?;
    Ok(Json(load_detail(&state, package_id).await?))
}

/// POST /api/uploads - Create a package.
#[tracing::instrument(skip_all, fields(user = %auth.identity.name))]
pub async fn create_package(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<PackageDetail>)> {
    let form = read_form(&state.resources, multipart).await?;
    let submission = PackageSubmission {
        title: form.title,
        author: form.author,
        description: form.description,
        long_description: form.long_description,
        tags: form.tags.unwrap_or_default(),
        dependencies: form.dependencies.unwrap_or_default(),
        files: form.files,
    };

    let package_id = state.coordinator.create(&auth.identity, submission).await?;
    Ok((
        StatusCode::CREATED,
        Json(load_detail(&state, package_id).await?),
    ))
}

/// POST /api/uploads/{id} - Update a package.
///
/// Omitting every `tags` (or `dependencies`) field keeps the current ones; a
/// single empty field clears them.
#[tracing::instrument(skip_all, fields(user = %auth.identity.name, package_id = %package_id))]
pub async fn update_package(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(package_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<PackageDetail>> {
    let package_id = PackageId::parse(&package_id)?;
    // Refuse before spooling any upload.
    ensure_can_modify(&state, &auth, package_id).await?;

    let form = read_form(&state.resources, multipart).await?;
    let edit = PackageEdit {
        title: form.title,
        author: form.author,
        description: form.description,
        long_description: form.long_description,
        tags: form.tags,
        dependencies: form.dependencies,
        remove_files: form.remove_files,
        files: form.files,
    };

    state
        .coordinator
        .update(&auth.identity, package_id, edit)
        .await?;
    Ok(Json(load_detail(&state, package_id).await?))
}

/// DELETE /api/uploads/{id} - Delete a package after title confirmation.
#[tracing::instrument(skip_all, fields(user = %auth.identity.name, package_id = %package_id))]
pub async fn delete_package(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(package_id): Path<String>,
    Json(req): Json<DeleteRequest>,
) -> ApiResult<StatusCode> {
    let package_id = PackageId::parse(&package_id)?;
    state
        .coordinator
        .delete(&auth.identity, package_id, &req.confirm_title)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Payloads
// =============================================================================

async fn summarize(state: &AppState, package: &PackageRow) -> ApiResult<PackageSummary> {
    let mut tags: Vec<String> = state
        .metadata
        .get_package_tags(package.id())
        .await?
        .into_iter()
        .map(|t| t.title)
        .collect();
    tags.sort();

    Ok(PackageSummary {
        id: package.id().to_string(),
        title: package.title.clone(),
        author: package.author.clone(),
        slug: package_slug(&package.title),
        description: package.description.clone(),
        updated_at: format_timestamp(package.updated_at)?,
        tags,
    })
}

async fn load_detail(state: &AppState, package_id: PackageId) -> ApiResult<PackageDetail> {
    let package = state
        .metadata
        .get_package(package_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("package {package_id}")))?;
    let summary = summarize(state, &package).await?;

    let dependencies = state.metadata.get_dependencies(package_id).await?;
    let dependants = state.metadata.get_dependants(package_id).await?;
    let files = state
        .metadata
        .get_package_resources(package_id)
        .await?
        .into_iter()
        .map(|r| FileEntry {
            id: r.id().to_string(),
            size: ResourceRegistry::size_display(&r),
            length: r.size(),
            filename: r.original_filename,
            sha256: r.sha256,
            md5: r.md5,
        })
        .collect();

    Ok(PackageDetail {
        summary,
        long_description: package.long_description,
        created_at: format_timestamp(package.created_at)?,
        dependencies: dependencies.iter().map(ToString::to_string).collect(),
        dependants: dependants.iter().map(ToString::to_string).collect(),
        files,
    })
}

async fn ensure_can_modify(
    state: &AppState,
    auth: &AuthenticatedUser,
    package_id: PackageId,
) -> ApiResult<()> {
    let package = state
        .metadata
        .get_package(package_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("package {package_id}")))?;
    if !auth.identity.can_modify(package.owner_id) {
        return Err(ApiError::Forbidden(
            "only the owner or a moderator may change this package".to_string(),
        ));
    }
    Ok(())
}

/// Parse a tag filter. Automatic tags keep their leading dot; a tag that
/// cannot be canonicalised is kept verbatim and simply matches nothing.
fn tag_filter(raw: &str) -> Vec<TagName> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.starts_with('.') {
                TagName::from_stored(t.to_lowercase())
            } else {
                TagName::user(t).unwrap_or_else(|| TagName::from_stored(t.to_lowercase()))
            }
        })
        .collect()
}

// =============================================================================
// Multipart forms
// =============================================================================

#[derive(Debug, Default)]
struct PackageForm {
    title: String,
    author: String,
    description: String,
    long_description: String,
    tags: Option<Vec<String>>,
    dependencies: Option<Vec<String>>,
    remove_files: Vec<String>,
    files: Vec<StagedFile>,
}

async fn read_form(resources: &ResourceRegistry, mut multipart: Multipart) -> ApiResult<PackageForm> {
    let mut form = PackageForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let filename = secure_filename(field.file_name().unwrap_or_default());
                if filename.is_empty() {
                    tracing::debug!("ignoring file part without a usable filename");
                    continue;
                }
                form.files.push(resources.stage(filename, field).await?);
            }
            "title" => form.title = text(field).await?,
            "author" => form.author = text(field).await?,
            "description" => form.description = text(field).await?,
            "long_description" => form.long_description = text(field).await?,
            "tags" => {
                let value = text(field).await?;
                form.tags.get_or_insert_with(Vec::new).push(value);
            }
            "dependencies" => {
                let value = text(field).await?;
                form.dependencies.get_or_insert_with(Vec::new).push(value);
            }
            "remove_files" => form.remove_files.push(text(field).await?),
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(form)
}

async fn text(field: Field<'_>) -> ApiResult<String> {
    field.text().await.map_err(bad_multipart)
}

fn bad_multipart(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("invalid multipart body: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_filter_canonicalises() {
        let tags = tag_filter("Race, .Scenario,,x");
        let tags: Vec<&str> = tags.iter().map(TagName::as_str).collect();
        assert_eq!(tags, vec!["race", ".scenario", "x"]);
    }
}
