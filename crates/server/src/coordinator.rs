//! Package transaction coordinator.
//!
//! Every package mutation moves through `Validating -> Applying -> Committing`
//! and ends `Committed` or `RolledBack`. Metadata changes land in one database
//! transaction; the content store is only touched after that transaction has
//! committed (or, for files ingested by a failed transaction, after it rolled
//! back).

use crate::auth::UserIdentity;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::resources::{IngestedResource, ResourceRegistry, StagedFile};
use lorry_core::package::{parse_dependency_ref, search_text};
use lorry_core::{ContentHash, PackageId, ResourceId, TagName, UploadRules};
use lorry_metadata::MetadataStore;
use lorry_metadata::models::{NewPackage, PackageChanges, PackageRow, PackageUpdate};
use prometheus::HistogramTimer;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;

/// Transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxState {
    Validating,
    Applying,
    Committing,
    Committed,
    RolledBack,
}

impl TxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Applying => "applying",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A new package as submitted by a caller.
#[derive(Debug, Default)]
pub struct PackageSubmission {
    pub title: String,
    pub author: String,
    pub description: String,
    pub long_description: String,
    /// Raw tag fields; each may hold several comma separated tags.
    pub tags: Vec<String>,
    /// Dependency references, `"<id>"` or `"<id> <title>"`.
    pub dependencies: Vec<String>,
    pub files: Vec<StagedFile>,
}

/// Requested changes to an existing package.
#[derive(Debug, Default)]
pub struct PackageEdit {
    pub title: String,
    pub author: String,
    pub description: String,
    pub long_description: String,
    /// `None` keeps the current user tags.
    pub tags: Option<Vec<String>>,
    /// `None` keeps the current dependencies.
    pub dependencies: Option<Vec<String>>,
    /// Resource ids to detach.
    pub remove_files: Vec<String>,
    /// New files. A file named like an existing resource replaces it.
    pub files: Vec<StagedFile>,
}

/// State tracking for one package transaction.
struct Transaction {
    operation: &'static str,
    package_id: PackageId,
    state: TxState,
    _timer: HistogramTimer,
}

impl Transaction {
    fn begin(operation: &'static str, package_id: PackageId) -> Self {
        tracing::debug!(operation, package_id = %package_id, "package transaction started");
        Self {
            operation,
            package_id,
            state: TxState::Validating,
            _timer: metrics::TRANSACTION_DURATION
                .with_label_values(&[operation])
                .start_timer(),
        }
    }

    fn advance(&mut self, next: TxState) {
        debug_assert!(!self.state.is_terminal(), "transaction already finished");
        tracing::debug!(
            operation = self.operation,
            package_id = %self.package_id,
            from = %self.state,
            to = %next,
            "package transaction state"
        );
        self.state = next;
    }

    fn commit(mut self) {
        self.advance(TxState::Committed);
    }

    /// Mark the transaction rolled back and hand the error back.
    fn reject(mut self, error: ApiError) -> ApiError {
        let from = self.state;
        self.advance(TxState::RolledBack);
        metrics::record_rejection(self.operation, error.code());
        if error.is_validation() {
            tracing::info!(
                operation = self.operation,
                package_id = %self.package_id,
                state = %from,
                error = %error,
                "package transaction rejected"
            );
        } else {
            tracing::warn!(
                operation = self.operation,
                package_id = %self.package_id,
                state = %from,
                error = %error,
                "package transaction rolled back"
            );
        }
        error
    }
}

/// Validated create request, nothing ingested yet.
struct CreatePlan {
    package: NewPackage,
    files: Vec<StagedFile>,
}

/// Validated update request, nothing ingested yet.
struct UpdatePlan {
    update: PackageUpdate,
    files: Vec<StagedFile>,
    released: Vec<ContentHash>,
}

/// Orchestrates package create, update and delete.
#[derive(Clone)]
pub struct PackageCoordinator {
    metadata: Arc<dyn MetadataStore>,
    resources: ResourceRegistry,
    rules: UploadRules,
}

impl PackageCoordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        resources: ResourceRegistry,
        rules: UploadRules,
    ) -> Self {
        Self {
            metadata,
            resources,
            rules,
        }
    }

    pub fn rules(&self) -> &UploadRules {
        &self.rules
    }

    /// Create a package owned by `user`.
    pub async fn create(
        &self,
        user: &UserIdentity,
        submission: PackageSubmission,
    ) -> ApiResult<PackageId> {
        let package_id = PackageId::new();
        let tx = Transaction::begin("create", package_id);

        let plan = match self.plan_create(user, package_id, submission) {
            Ok(plan) => plan,
            Err(e) => return Err(tx.reject(e)),
        };
        let CreatePlan { mut package, files } = plan;

        let (mut tx, ingested) = self.ingest_all(tx, files).await?;
        package.resources = ingested.iter().map(|i| i.resource.clone()).collect();

        tx.advance(TxState::Committing);
        let changes = match self.metadata.create_package(&package).await {
            Ok(changes) => changes,
            Err(e) => return Err(self.abort(tx, ingested, e.into()).await),
        };
        tx.commit();
        metrics::PACKAGES_CREATED.inc();

        tracing::info!(
            package_id = %package_id,
            owner = %user.name,
            files = ingested.len(),
            tags = package.tags.len(),
            dependencies = changes.dependencies.added.len(),
            "package created"
        );
        log_dropped_dependencies(package_id, &changes);

        drop(ingested);
        self.clean_up(package_id, &changes, Vec::new()).await;
        Ok(package_id)
    }

    /// Apply an edit to an existing package.
    pub async fn update(
        &self,
        user: &UserIdentity,
        package_id: PackageId,
        edit: PackageEdit,
    ) -> ApiResult<()> {
        let tx = Transaction::begin("update", package_id);

        let plan = match self.plan_update(user, package_id, edit).await {
            Ok(plan) => plan,
            Err(e) => return Err(tx.reject(e)),
        };
        let UpdatePlan {
            mut update,
            files,
            released,
        } = plan;

        let (mut tx, ingested) = self.ingest_all(tx, files).await?;
        update.add_resources = ingested.iter().map(|i| i.resource.clone()).collect();

        tx.advance(TxState::Committing);
        let changes = match self.metadata.update_package(&update).await {
            Ok(changes) => changes,
            Err(e) => return Err(self.abort(tx, ingested, e.into()).await),
        };
        tx.commit();
        metrics::PACKAGES_UPDATED.inc();

        tracing::info!(
            package_id = %package_id,
            editor = %user.name,
            added_files = ingested.len(),
            removed_files = update.remove_resources.len(),
            reindexed = update.search_text.is_some(),
            "package updated"
        );
        log_dropped_dependencies(package_id, &changes);

        drop(ingested);
        self.clean_up(package_id, &changes, released).await;
        Ok(())
    }

    /// Delete a package. `confirm_title` must equal its current title.
    pub async fn delete(
        &self,
        user: &UserIdentity,
        package_id: PackageId,
        confirm_title: &str,
    ) -> ApiResult<()> {
        let mut tx = Transaction::begin("delete", package_id);

        let package = match self.authorize(user, package_id).await {
            Ok(package) => package,
            Err(e) => return Err(tx.reject(e)),
        };
        if confirm_title != package.title {
            return Err(tx.reject(ApiError::validation(
                "The confirmation does not match the package title.",
            )));
        }

        tx.advance(TxState::Applying);
        let released = match self.release_all(package_id).await {
            Ok(hashes) => hashes,
            Err(e) => return Err(tx.reject(e)),
        };

        tx.advance(TxState::Committing);
        let changes = match self.metadata.delete_package(package_id).await {
            Ok(changes) => changes,
            Err(e) => return Err(tx.reject(e.into())),
        };
        tx.commit();
        metrics::PACKAGES_DELETED.inc();

        tracing::info!(
            package_id = %package_id,
            title = %package.title,
            by = %user.name,
            files = released.len(),
            dependencies = changes.dependencies.removed.len(),
            "package deleted"
        );

        self.clean_up(package_id, &changes, released).await;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    fn plan_create(
        &self,
        user: &UserIdentity,
        package_id: PackageId,
        submission: PackageSubmission,
    ) -> ApiResult<CreatePlan> {
        self.rules.validate_title(&submission.title)?;
        self.rules.validate_description(&submission.description)?;

        let files = last_file_wins(submission.files);
        if files.is_empty() {
            return Err(ApiError::validation("Need at least one file."));
        }
        self.check_files(&files)?;

        let mut tags = user_tags(&submission.tags);
        tags.extend(self.auto_tags(files.iter().map(StagedFile::filename)));

        let author = if user.is_moderator && !submission.author.trim().is_empty() {
            submission.author.trim().to_string()
        } else {
            user.name.clone()
        };

        let text = search_text(&submission.title, &submission.description, &author, &tags);
        let now = OffsetDateTime::now_utc();

        Ok(CreatePlan {
            package: NewPackage {
                package_id,
                owner_id: user.user_id,
                title: submission.title,
                author,
                description: submission.description,
                long_description: submission.long_description,
                search_text: text,
                tags: tags.into_iter().collect(),
                dependencies: dependency_ids(&submission.dependencies),
                resources: Vec::new(),
                created_at: now,
            },
            files,
        })
    }

    async fn plan_update(
        &self,
        user: &UserIdentity,
        package_id: PackageId,
        edit: PackageEdit,
    ) -> ApiResult<UpdatePlan> {
        let existing = self.authorize(user, package_id).await?;

        self.rules.validate_title(&edit.title)?;
        self.rules.validate_description(&edit.description)?;
        let files = last_file_wins(edit.files);
        self.check_files(&files)?;

        // Explicit removals, plus replacement of resources by filename.
        let explicit: HashSet<ResourceId> = edit
            .remove_files
            .iter()
            .filter_map(|raw| ResourceId::parse(raw).ok())
            .collect();
        let incoming: HashSet<&str> = files.iter().map(StagedFile::filename).collect();
        let current = self.metadata.get_package_resources(package_id).await?;
        let (removed, retained): (Vec<_>, Vec<_>) = current.into_iter().partition(|r| {
            explicit.contains(&r.id()) || incoming.contains(r.original_filename.as_str())
        });

        if retained.is_empty() && files.is_empty() {
            return Err(ApiError::validation("Need at least one remaining file."));
        }

        let released = removed
            .iter()
            .map(|r| self.resources.release(r))
            .collect::<ApiResult<Vec<_>>>()?;

        let current_tags: BTreeSet<TagName> = self
            .metadata
            .get_package_tags(package_id)
            .await?
            .iter()
            .map(|t| t.name())
            .collect();
        let mut tags = match &edit.tags {
            Some(raw) => user_tags(raw),
            None => current_tags
                .iter()
                .filter(|t| !t.is_automatic())
                .cloned()
                .collect(),
        };
        // Auto-tags follow the final file set.
        tags.extend(self.auto_tags(
            retained
                .iter()
                .map(|r| r.original_filename.as_str())
                .chain(files.iter().map(StagedFile::filename)),
        ));

        let dependencies = match &edit.dependencies {
            Some(raw) => dependency_ids(raw),
            None => self.metadata.get_dependencies(package_id).await?,
        };

        let author = if user.is_moderator && !edit.author.trim().is_empty() {
            edit.author.trim().to_string()
        } else {
            existing.author.clone()
        };

        let reindex = edit.title != existing.title
            || edit.description != existing.description
            || author != existing.author
            || tags != current_tags;
        let text = reindex.then(|| search_text(&edit.title, &edit.description, &author, &tags));

        Ok(UpdatePlan {
            update: PackageUpdate {
                package_id,
                title: edit.title,
                author,
                description: edit.description,
                long_description: edit.long_description,
                search_text: text,
                tags: tags.into_iter().collect(),
                dependencies,
                remove_resources: removed.iter().map(|r| r.id()).collect(),
                add_resources: Vec::new(),
                updated_at: OffsetDateTime::now_utc(),
            },
            files,
            released,
        })
    }

    /// Load a package and apply the owner-or-moderator rule.
    async fn authorize(&self, user: &UserIdentity, package_id: PackageId) -> ApiResult<PackageRow> {
        let package = self
            .metadata
            .get_package(package_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("package {package_id}")))?;
        if !user.can_modify(package.owner_id) {
            return Err(ApiError::Forbidden(
                "only the owner or a moderator may change this package".to_string(),
            ));
        }
        Ok(package)
    }

    fn check_files(&self, files: &[StagedFile]) -> ApiResult<()> {
        for file in files {
            self.rules.check_filename(file.filename())?;
        }
        Ok(())
    }

    fn auto_tags<'a>(&self, filenames: impl Iterator<Item = &'a str>) -> BTreeSet<TagName> {
        filenames
            .filter_map(|name| self.rules.extension_tag(name))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Content store
    // -------------------------------------------------------------------------

    /// Ingest staged files. On failure everything ingested so far is rolled
    /// back and the transaction is rejected.
    async fn ingest_all(
        &self,
        mut tx: Transaction,
        files: Vec<StagedFile>,
    ) -> ApiResult<(Transaction, Vec<IngestedResource>)> {
        tx.advance(TxState::Applying);
        let mut ingested = Vec::with_capacity(files.len());
        for file in files {
            match self.resources.ingest(file).await {
                Ok(resource) => ingested.push(resource),
                Err(e) => return Err(self.abort(tx, ingested, e).await),
            }
        }
        Ok((tx, ingested))
    }

    /// Digests of every resource of a package, recorded before deletion.
    async fn release_all(&self, package_id: PackageId) -> ApiResult<Vec<ContentHash>> {
        self.metadata
            .get_package_resources(package_id)
            .await?
            .iter()
            .map(|r| self.resources.release(r))
            .collect()
    }

    /// Roll back: release the leases, then drop blobs nothing else references.
    async fn abort(
        &self,
        tx: Transaction,
        ingested: Vec<IngestedResource>,
        error: ApiError,
    ) -> ApiError {
        let package_id = tx.package_id;
        let error = tx.reject(error);

        let hashes: Vec<ContentHash> = ingested.iter().map(|i| i.resource.sha256).collect();
        drop(ingested);
        if !hashes.is_empty() {
            let stats = self.resources.collect_unreferenced(&dedup(hashes)).await;
            tracing::debug!(
                package_id = %package_id,
                removed = stats.removed,
                retained = stats.retained,
                "rolled back ingested files"
            );
        }
        error
    }

    /// Post-commit cleanup: tag orphan GC first, then blob collection.
    async fn clean_up(
        &self,
        package_id: PackageId,
        changes: &PackageChanges,
        mut hashes: Vec<ContentHash>,
    ) {
        if !changes.removed_tag_ids.is_empty() {
            match self.metadata.gc_orphan_tags(&changes.removed_tag_ids).await {
                Ok(removed) => {
                    metrics::TAGS_COLLECTED.inc_by(removed.len() as u64);
                    if !removed.is_empty() {
                        tracing::debug!(package_id = %package_id, tags = ?removed, "orphan tags removed");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        package_id = %package_id,
                        error = %e,
                        "orphan tag collection failed"
                    );
                    metrics::record_cleanup_failure("tag_gc");
                }
            }
        }

        hashes.extend_from_slice(&changes.removed_hashes);
        if !hashes.is_empty() {
            self.resources.collect_unreferenced(&dedup(hashes)).await;
        }
    }
}

/// Keep the last file for each filename, in upload order otherwise.
fn last_file_wins(files: Vec<StagedFile>) -> Vec<StagedFile> {
    let mut kept: Vec<StagedFile> = Vec::with_capacity(files.len());
    for file in files {
        if let Some(pos) = kept.iter().position(|f| f.filename() == file.filename()) {
            kept.remove(pos);
        }
        kept.push(file);
    }
    kept
}

/// Canonical user tags from comma separated input fields.
fn user_tags(raw: &[String]) -> BTreeSet<TagName> {
    raw.iter()
        .flat_map(|field| field.split(','))
        .filter_map(TagName::user)
        .collect()
}

fn dependency_ids(raw: &[String]) -> Vec<PackageId> {
    raw.iter().filter_map(|r| parse_dependency_ref(r)).collect()
}

fn dedup(mut hashes: Vec<ContentHash>) -> Vec<ContentHash> {
    hashes.sort();
    hashes.dedup();
    hashes
}

fn log_dropped_dependencies(package_id: PackageId, changes: &PackageChanges) {
    if !changes.dependencies.dropped.is_empty() {
        tracing::debug!(
            package_id = %package_id,
            dropped = ?changes.dependencies.dropped,
            "dependency requests skipped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use lorry_core::config::PackagesConfig;
    use lorry_metadata::SqliteStore;
    use lorry_metadata::models::UserRow;
    use lorry_storage::{BlobStore, FilesystemBackend};
    use uuid::Uuid;

    const DESCRIPTION: &str =
        "A carefully balanced scenario with plenty of room for experimentation.";

    struct Fixture {
        coordinator: PackageCoordinator,
        registry: ResourceRegistry,
        metadata: Arc<dyn MetadataStore>,
        owner: UserIdentity,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let metadata: Arc<dyn MetadataStore> =
            Arc::new(SqliteStore::new(":memory:", None).await.unwrap());
        let owner = identity(&*metadata, "alice", false).await;
        let backend = FilesystemBackend::new(dir.path().join("resources"))
            .await
            .unwrap();
        let registry = ResourceRegistry::new(
            BlobStore::new(Arc::new(backend)),
            metadata.clone(),
            dir.path().join("staging"),
        )
        .await
        .unwrap();
        let coordinator = PackageCoordinator::new(
            metadata.clone(),
            registry.clone(),
            UploadRules::new(PackagesConfig::default()),
        );
        Fixture {
            coordinator,
            registry,
            metadata,
            owner,
            _dir: dir,
        }
    }

    async fn identity(metadata: &dyn MetadataStore, name: &str, moderator: bool) -> UserIdentity {
        let user = UserRow {
            user_id: Uuid::new_v4(),
            name: name.to_string(),
            is_moderator: moderator,
            token_hash: crate::auth::hash_token(name),
            created_at: OffsetDateTime::now_utc(),
        };
        metadata.create_user(&user).await.unwrap();
        UserIdentity {
            user_id: user.user_id,
            name: user.name,
            is_moderator: moderator,
        }
    }

    async fn staged(registry: &ResourceRegistry, name: &str, content: &str) -> StagedFile {
        let chunk: Result<Bytes, std::io::Error> = Ok(Bytes::from(content.to_string()));
        registry
            .stage(name.to_string(), futures::stream::iter(vec![chunk]))
            .await
            .unwrap()
    }

    fn submission(title: &str, tags: &str, files: Vec<StagedFile>) -> PackageSubmission {
        PackageSubmission {
            title: title.to_string(),
            author: "ignored".to_string(),
            description: DESCRIPTION.to_string(),
            tags: vec![tags.to_string()],
            files,
            ..Default::default()
        }
    }

    fn edit_of(package: &PackageRow) -> PackageEdit {
        PackageEdit {
            title: package.title.clone(),
            author: package.author.clone(),
            description: package.description.clone(),
            long_description: package.long_description.clone(),
            ..Default::default()
        }
    }

    async fn tag_titles(metadata: &dyn MetadataStore, id: PackageId) -> Vec<String> {
        let mut titles: Vec<String> = metadata
            .get_package_tags(id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        titles.sort();
        titles
    }

    #[test]
    fn test_last_file_wins_and_tag_parsing() {
        let tags = user_tags(&["Race, puzzle".to_string(), "x,race".to_string()]);
        let tags: Vec<&str> = tags.iter().map(TagName::as_str).collect();
        assert_eq!(tags, vec!["puzzle", "race"]);

        let id = PackageId::new();
        let deps = dependency_ids(&[format!("{id} Some Title"), "garbage".to_string()]);
        assert_eq!(deps, vec![id]);
    }

    #[tokio::test]
    async fn test_create_forces_author_and_merges_auto_tags() {
        let fx = fixture().await;
        let files = vec![
            staged(&fx.registry, "level.ocs", "one").await,
            staged(&fx.registry, "level.ocs", "two").await,
            staged(&fx.registry, "props.ocd", "three").await,
        ];
        let id = fx
            .coordinator
            .create(&fx.owner, submission("Night Race", "race", files))
            .await
            .unwrap();

        let package = fx.metadata.get_package(id).await.unwrap().unwrap();
        assert_eq!(package.author, "alice");
        assert!(package.search_text.contains("night race"));

        let resources = fx.metadata.get_package_resources(id).await.unwrap();
        assert_eq!(resources.len(), 2);
        let level = resources
            .iter()
            .find(|r| r.original_filename == "level.ocs")
            .unwrap();
        assert_eq!(level.content_hash().unwrap(), ContentHash::compute(b"two"));

        assert_eq!(
            tag_titles(&*fx.metadata, id).await,
            vec![".objects", ".scenario", "race"]
        );
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input_without_side_effects() {
        let fx = fixture().await;

        let err = fx
            .coordinator
            .create(&fx.owner, submission("Empty", "", Vec::new()))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let files = vec![staged(&fx.registry, "notes.txt", "text").await];
        let err = fx
            .coordinator
            .create(&fx.owner, submission("Notes", "", files))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let page = fx
            .metadata
            .search_packages(&Default::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(!fx.registry.blobs().exists(&ContentHash::compute(b"text")).await.unwrap());
        assert_eq!(std::fs::read_dir(fx.registry.staging_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_collects_ingested_blobs() {
        let fx = fixture().await;
        // No users row: the package insert fails after the files were ingested.
        let ghost = UserIdentity {
            user_id: Uuid::new_v4(),
            name: "ghost".to_string(),
            is_moderator: false,
        };
        let files = vec![staged(&fx.registry, "ghost.ocs", "orphaned bytes").await];

        let err = fx
            .coordinator
            .create(&ghost, submission("Ghost Town", "haunted", files))
            .await
            .unwrap_err();
        assert!(!err.is_validation());

        let hash = ContentHash::compute(b"orphaned bytes");
        assert!(!fx.registry.blobs().exists(&hash).await.unwrap());
        assert!(fx.registry.blobs().try_lock_for_removal(&hash).is_some());
        for title in ["haunted", ".scenario"] {
            assert!(fx.metadata.get_tag_by_title(title).await.unwrap().is_none());
        }
        assert_eq!(std::fs::read_dir(fx.registry.staging_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_update_swaps_auto_tags_with_file_set() {
        let fx = fixture().await;
        let files = vec![staged(&fx.registry, "level.ocs", "scenario bytes").await];
        let id = fx
            .coordinator
            .create(&fx.owner, submission("Swap", "puzzle", files))
            .await
            .unwrap();
        let package = fx.metadata.get_package(id).await.unwrap().unwrap();
        let old = fx.metadata.get_package_resources(id).await.unwrap();

        let mut edit = edit_of(&package);
        edit.remove_files = vec![old[0].id().to_string()];
        edit.files = vec![staged(&fx.registry, "props.ocd", "object bytes").await];
        fx.coordinator.update(&fx.owner, id, edit).await.unwrap();

        assert_eq!(
            tag_titles(&*fx.metadata, id).await,
            vec![".objects", "puzzle"]
        );
        // The scenario tag had no other user and the blob no other reference.
        assert!(fx.metadata.get_tag_by_title(".scenario").await.unwrap().is_none());
        let old_hash = ContentHash::compute(b"scenario bytes");
        assert!(!fx.registry.blobs().exists(&old_hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_replaces_by_filename() {
        let fx = fixture().await;
        let files = vec![staged(&fx.registry, "level.ocs", "v1").await];
        let id = fx
            .coordinator
            .create(&fx.owner, submission("Replace", "", files))
            .await
            .unwrap();
        let package = fx.metadata.get_package(id).await.unwrap().unwrap();

        let mut edit = edit_of(&package);
        edit.files = vec![staged(&fx.registry, "level.ocs", "v2").await];
        fx.coordinator.update(&fx.owner, id, edit).await.unwrap();

        let resources = fx.metadata.get_package_resources(id).await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].content_hash().unwrap(), ContentHash::compute(b"v2"));
        assert!(!fx.registry.blobs().exists(&ContentHash::compute(b"v1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_to_zero_files_is_rejected() {
        let fx = fixture().await;
        let files = vec![staged(&fx.registry, "level.ocs", "keep me").await];
        let id = fx
            .coordinator
            .create(&fx.owner, submission("Keeper", "", files))
            .await
            .unwrap();
        let package = fx.metadata.get_package(id).await.unwrap().unwrap();
        let resources = fx.metadata.get_package_resources(id).await.unwrap();

        let mut edit = edit_of(&package);
        edit.title = "Renamed".to_string();
        edit.remove_files = vec![resources[0].id().to_string()];
        let err = fx.coordinator.update(&fx.owner, id, edit).await.unwrap_err();
        assert!(err.is_validation());

        let after = fx.metadata.get_package(id).await.unwrap().unwrap();
        assert_eq!(after.title, "Keeper");
        assert_eq!(fx.metadata.get_package_resources(id).await.unwrap().len(), 1);
        assert!(fx.registry.blobs().exists(&ContentHash::compute(b"keep me")).await.unwrap());
    }

    #[tokio::test]
    async fn test_ownership_checked_before_validation() {
        let fx = fixture().await;
        let files = vec![staged(&fx.registry, "level.ocs", "mine").await];
        let id = fx
            .coordinator
            .create(&fx.owner, submission("Mine", "", files))
            .await
            .unwrap();
        let mallory = identity(&*fx.metadata, "mallory", false).await;

        // Invalid title, but the ownership failure wins.
        let edit = PackageEdit {
            title: "x".to_string(),
            ..Default::default()
        };
        let err = fx.coordinator.update(&mallory, id, edit).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = fx.coordinator.delete(&mallory, id, "Mine").await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let moderator = identity(&*fx.metadata, "mod", true).await;
        fx.coordinator.delete(&moderator, id, "Mine").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_requires_exact_title_and_cleans_up() {
        let fx = fixture().await;
        let shared = "shared bytes";
        let first = fx
            .coordinator
            .create(
                &fx.owner,
                submission("First", "common", vec![staged(&fx.registry, "a.ocs", shared).await]),
            )
            .await
            .unwrap();
        let second = fx
            .coordinator
            .create(
                &fx.owner,
                submission("Second", "common", vec![staged(&fx.registry, "b.ocs", shared).await]),
            )
            .await
            .unwrap();

        let err = fx.coordinator.delete(&fx.owner, first, "first").await.unwrap_err();
        assert!(err.is_validation());
        assert!(fx.metadata.get_package(first).await.unwrap().is_some());

        let hash = ContentHash::compute(shared.as_bytes());
        fx.coordinator.delete(&fx.owner, first, "First").await.unwrap();
        assert!(fx.metadata.get_package(first).await.unwrap().is_none());
        assert!(fx.registry.blobs().exists(&hash).await.unwrap());
        assert!(fx.metadata.get_tag_by_title("common").await.unwrap().is_some());

        fx.coordinator.delete(&fx.owner, second, "Second").await.unwrap();
        assert!(!fx.registry.blobs().exists(&hash).await.unwrap());
        assert!(fx.metadata.get_tag_by_title("common").await.unwrap().is_none());
        assert!(fx.metadata.get_tag_by_title(".scenario").await.unwrap().is_none());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(TxState::RolledBack.to_string(), "rolled_back");
        assert!(TxState::Committed.is_terminal());
        assert!(!TxState::Applying.is_terminal());
    }
}
