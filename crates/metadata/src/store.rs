//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{DependencyRepo, PackageRepo, ResourceRepo, TagRepo, UserRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    PackageRepo + ResourceRepo + TagRepo + DependencyRepo + UserRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout_secs: u64,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// `":memory:"` gives a private in-memory database, useful in tests.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(600);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection serialises writers; SQLite would otherwise answer
        // concurrent package transactions with "database is locked".
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(query_timeout_secs))
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout_secs,
        };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Advisory query timeout; bounds how long a request waits for the
    /// connection.
    pub fn query_timeout_secs(&self) -> u64 {
        self.query_timeout_secs
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use lorry_core::{ContentHash, PackageId, ResourceId, SortKey, SortOrder, TagName};
    use sqlx::{QueryBuilder, SqliteConnection};
    use std::collections::{HashSet, VecDeque};
    use time::OffsetDateTime;
    use uuid::Uuid;

    // -------------------------------------------------------------------------
    // Helpers shared by the write paths. All of them run on the connection of
    // an open transaction.
    // -------------------------------------------------------------------------

    async fn package_exists(conn: &mut SqliteConnection, package_id: Uuid) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM packages WHERE package_id = ?)")
                .bind(package_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(exists)
    }

    /// Breadth-first search from `start` along dependency edges.
    async fn reaches(
        conn: &mut SqliteConnection,
        start: Uuid,
        target: Uuid,
    ) -> MetadataResult<bool> {
        if start == target {
            return Ok(true);
        }

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            let next: Vec<Uuid> = sqlx::query_scalar(
                "SELECT dependency_id FROM package_dependencies WHERE package_id = ?",
            )
            .bind(current)
            .fetch_all(&mut *conn)
            .await?;

            for id in next {
                if id == target {
                    return Ok(true);
                }
                if visited.insert(id) {
                    queue.push_back(id);
                }
            }
        }

        Ok(false)
    }

    async fn resolve_tag_id(conn: &mut SqliteConnection, title: &str) -> MetadataResult<i64> {
        sqlx::query("INSERT OR IGNORE INTO tags (title) VALUES (?)")
            .bind(title)
            .execute(&mut *conn)
            .await?;
        let tag_id: i64 = sqlx::query_scalar("SELECT tag_id FROM tags WHERE title = ?")
            .bind(title)
            .fetch_one(&mut *conn)
            .await?;
        Ok(tag_id)
    }

    /// Make the package's associations exactly `tags`. Returns the ids of
    /// tags whose association was removed.
    async fn sync_tags(
        conn: &mut SqliteConnection,
        package_id: Uuid,
        tags: &[TagName],
    ) -> MetadataResult<Vec<i64>> {
        let current: Vec<i64> =
            sqlx::query_scalar("SELECT tag_id FROM package_tags WHERE package_id = ?")
                .bind(package_id)
                .fetch_all(&mut *conn)
                .await?;

        let mut desired = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag_id = resolve_tag_id(conn, tag.as_str()).await?;
            if !desired.contains(&tag_id) {
                desired.push(tag_id);
            }
        }

        let mut removed = Vec::new();
        for tag_id in current.iter().filter(|id| !desired.contains(id)) {
            sqlx::query("DELETE FROM package_tags WHERE package_id = ? AND tag_id = ?")
                .bind(package_id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
            removed.push(*tag_id);
        }

        for tag_id in desired.iter().filter(|id| !current.contains(id)) {
            sqlx::query("INSERT INTO package_tags (package_id, tag_id) VALUES (?, ?)")
                .bind(package_id)
                .bind(tag_id)
                .execute(&mut *conn)
                .await?;
        }

        Ok(removed)
    }

    async fn reconcile_dependencies(
        conn: &mut SqliteConnection,
        package_id: Uuid,
        desired: &[PackageId],
    ) -> MetadataResult<DependencyChange> {
        let current: Vec<Uuid> = sqlx::query_scalar(
            "SELECT dependency_id FROM package_dependencies WHERE package_id = ?",
        )
        .bind(package_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut change = DependencyChange::default();
        let mut wanted: Vec<Uuid> = Vec::with_capacity(desired.len());
        for dep in desired {
            let id = dep.as_uuid();
            if id == package_id || wanted.contains(&id) {
                change.dropped.push(*dep);
            } else {
                wanted.push(id);
            }
        }

        // Removals first so new edges are checked against the final graph.
        for id in current.iter().filter(|id| !wanted.contains(id)) {
            sqlx::query(
                "DELETE FROM package_dependencies WHERE package_id = ? AND dependency_id = ?",
            )
            .bind(package_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
            change.removed.push(PackageId::from_uuid(*id));
        }

        for id in wanted.into_iter().filter(|id| !current.contains(id)) {
            if !package_exists(conn, id).await? || reaches(conn, id, package_id).await? {
                change.dropped.push(PackageId::from_uuid(id));
                continue;
            }
            sqlx::query(
                "INSERT INTO package_dependencies (package_id, dependency_id) VALUES (?, ?)",
            )
            .bind(package_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
            change.added.push(PackageId::from_uuid(id));
        }

        if !change.dropped.is_empty() {
            tracing::debug!(
                package_id = %PackageId::from_uuid(package_id),
                dropped = change.dropped.len(),
                "skipped dependency edges"
            );
        }

        Ok(change)
    }

    async fn insert_resource(
        conn: &mut SqliteConnection,
        package_id: Uuid,
        owner_id: Uuid,
        resource: &NewResource,
        created_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO resources (resource_id, package_id, owner_id, original_filename, size_bytes, md5, sha256, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(resource.resource_id.as_uuid())
        .bind(package_id)
        .bind(owner_id)
        .bind(&resource.original_filename)
        .bind(i64::try_from(resource.size_bytes).unwrap_or(i64::MAX))
        .bind(&resource.md5)
        .bind(resource.sha256.to_hex())
        .bind(created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    fn parse_hashes(hexes: Vec<String>) -> MetadataResult<Vec<ContentHash>> {
        let mut hashes = hexes
            .iter()
            .map(|hex| ContentHash::from_hex(hex))
            .collect::<Result<Vec<_>, _>>()?;
        hashes.sort();
        hashes.dedup();
        Ok(hashes)
    }

    fn order_clause(sort: SortOrder) -> &'static str {
        match (sort.key, sort.descending) {
            (SortKey::Title, false) => "p.title COLLATE NOCASE ASC, p.rowid ASC",
            (SortKey::Title, true) => "p.title COLLATE NOCASE DESC, p.rowid DESC",
            (SortKey::ModifiedAt, false) => "p.updated_at ASC, p.rowid ASC",
            (SortKey::ModifiedAt, true) => "p.updated_at DESC, p.rowid DESC",
            (SortKey::None, false) => "p.rowid ASC",
            (SortKey::None, true) => "p.rowid DESC",
        }
    }

    fn escape_like(raw: &str) -> String {
        raw.replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    }

    fn push_search_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &PackageQuery) {
        builder.push(" WHERE 1 = 1");

        if !query.keywords.is_empty() {
            builder.push(" AND (");
            let mut any = builder.separated(" OR ");
            for keyword in &query.keywords {
                any.push("(' ' || p.search_text || ' ') LIKE ");
                any.push_bind_unseparated(format!("% {} %", escape_like(keyword)));
                any.push_unseparated(" ESCAPE '\\'");
            }
            builder.push(")");
        }

        // One EXISTS per tag: a match must carry all of them.
        for tag in &query.tags {
            builder.push(
                " AND EXISTS (SELECT 1 FROM package_tags pt JOIN tags t ON t.tag_id = pt.tag_id \
                 WHERE pt.package_id = p.package_id AND t.title = ",
            );
            builder.push_bind(tag.as_str().to_string());
            builder.push(")");
        }
    }

    // -------------------------------------------------------------------------
    // Packages
    // -------------------------------------------------------------------------

    #[async_trait]
    impl PackageRepo for SqliteStore {
        async fn create_package(&self, package: &NewPackage) -> MetadataResult<PackageChanges> {
            if package.resources.is_empty() {
                return Err(MetadataError::Constraint("Need at least one file.".to_string()));
            }

            let package_id = package.package_id.as_uuid();
            let mut tx = self.pool.begin().await?;

            if package_exists(&mut tx, package_id).await? {
                return Err(MetadataError::AlreadyExists(format!(
                    "package {}",
                    package.package_id
                )));
            }

            sqlx::query(
                "INSERT INTO packages (package_id, owner_id, title, author, description, long_description, search_text, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(package_id)
            .bind(package.owner_id)
            .bind(&package.title)
            .bind(&package.author)
            .bind(&package.description)
            .bind(&package.long_description)
            .bind(&package.search_text)
            .bind(package.created_at)
            .bind(package.created_at)
            .execute(&mut *tx)
            .await?;

            for resource in &package.resources {
                insert_resource(
                    &mut tx,
                    package_id,
                    package.owner_id,
                    resource,
                    package.created_at,
                )
                .await?;
            }

            sync_tags(&mut tx, package_id, &package.tags).await?;
            let dependencies =
                reconcile_dependencies(&mut tx, package_id, &package.dependencies).await?;

            tx.commit().await?;

            Ok(PackageChanges {
                dependencies,
                ..Default::default()
            })
        }

        async fn update_package(&self, update: &PackageUpdate) -> MetadataResult<PackageChanges> {
            let package_id = update.package_id.as_uuid();
            let mut tx = self.pool.begin().await?;

            let owner_id: Option<Uuid> =
                sqlx::query_scalar("SELECT owner_id FROM packages WHERE package_id = ?")
                    .bind(package_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let Some(owner_id) = owner_id else {
                return Err(MetadataError::NotFound(format!(
                    "package {}",
                    update.package_id
                )));
            };

            sqlx::query(
                "UPDATE packages SET title = ?, author = ?, description = ?, long_description = ?, search_text = COALESCE(?, search_text), updated_at = ? WHERE package_id = ?",
            )
            .bind(&update.title)
            .bind(&update.author)
            .bind(&update.description)
            .bind(&update.long_description)
            .bind(update.search_text.as_deref())
            .bind(update.updated_at)
            .bind(package_id)
            .execute(&mut *tx)
            .await?;

            let mut removed_hex = Vec::new();
            for resource_id in &update.remove_resources {
                let sha256: Option<String> = sqlx::query_scalar(
                    "DELETE FROM resources WHERE resource_id = ? AND package_id = ? RETURNING sha256",
                )
                .bind(resource_id.as_uuid())
                .bind(package_id)
                .fetch_optional(&mut *tx)
                .await?;
                removed_hex.extend(sha256);
            }

            for resource in &update.add_resources {
                insert_resource(&mut tx, package_id, owner_id, resource, update.updated_at).await?;
            }

            // Dropping `tx` on the error path rolls everything back.
            let remaining: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM resources WHERE package_id = ?")
                    .bind(package_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if remaining == 0 {
                return Err(MetadataError::Constraint(
                    "Need at least one remaining file.".to_string(),
                ));
            }

            let removed_tag_ids = sync_tags(&mut tx, package_id, &update.tags).await?;
            let dependencies =
                reconcile_dependencies(&mut tx, package_id, &update.dependencies).await?;

            tx.commit().await?;

            Ok(PackageChanges {
                removed_tag_ids,
                removed_hashes: parse_hashes(removed_hex)?,
                dependencies,
            })
        }

        async fn delete_package(&self, package_id: PackageId) -> MetadataResult<PackageChanges> {
            let id = package_id.as_uuid();
            let mut tx = self.pool.begin().await?;

            if !package_exists(&mut tx, id).await? {
                return Err(MetadataError::NotFound(format!("package {package_id}")));
            }

            let removed_hex: Vec<String> =
                sqlx::query_scalar("SELECT sha256 FROM resources WHERE package_id = ?")
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?;
            let removed_tag_ids: Vec<i64> =
                sqlx::query_scalar("SELECT tag_id FROM package_tags WHERE package_id = ?")
                    .bind(id)
                    .fetch_all(&mut *tx)
                    .await?;
            let outgoing: Vec<Uuid> = sqlx::query_scalar(
                "SELECT dependency_id FROM package_dependencies WHERE package_id = ?",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            // Children first, then the row.
            sqlx::query("DELETE FROM resources WHERE package_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM package_tags WHERE package_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let edges = sqlx::query(
                "DELETE FROM package_dependencies WHERE package_id = ? OR dependency_id = ?",
            )
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            sqlx::query("DELETE FROM packages WHERE package_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            tracing::debug!(%package_id, edges, "package rows deleted");

            Ok(PackageChanges {
                removed_tag_ids,
                removed_hashes: parse_hashes(removed_hex)?,
                dependencies: DependencyChange {
                    removed: outgoing.into_iter().map(PackageId::from_uuid).collect(),
                    ..Default::default()
                },
            })
        }

        async fn get_package(&self, package_id: PackageId) -> MetadataResult<Option<PackageRow>> {
            let row = sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE package_id = ?")
                .bind(package_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn search_packages(&self, query: &PackageQuery) -> MetadataResult<PackagePage> {
            let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM packages p");
            push_search_filters(&mut count, query);
            let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

            let mut page = QueryBuilder::<Sqlite>::new("SELECT p.package_id FROM packages p");
            push_search_filters(&mut page, query);
            page.push(" ORDER BY ");
            page.push(order_clause(query.sort));
            page.push(" LIMIT ");
            page.push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));
            page.push(" OFFSET ");
            page.push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));
            let ids: Vec<Uuid> = page.build_query_scalar().fetch_all(&self.pool).await?;

            Ok(PackagePage {
                ids: ids.into_iter().map(PackageId::from_uuid).collect(),
                total: total.max(0) as u64,
            })
        }

        async fn list_package_suggestions(&self) -> MetadataResult<Vec<(PackageId, String)>> {
            let rows: Vec<(Uuid, String)> = sqlx::query_as(
                "SELECT package_id, title FROM packages ORDER BY title COLLATE NOCASE, rowid",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|(id, title)| (PackageId::from_uuid(id), title))
                .collect())
        }
    }

    // -------------------------------------------------------------------------
    // Resources
    // -------------------------------------------------------------------------

    #[async_trait]
    impl ResourceRepo for SqliteStore {
        async fn get_resource(
            &self,
            resource_id: ResourceId,
        ) -> MetadataResult<Option<ResourceRow>> {
            let row =
                sqlx::query_as::<_, ResourceRow>("SELECT * FROM resources WHERE resource_id = ?")
                    .bind(resource_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn get_package_resources(
            &self,
            package_id: PackageId,
        ) -> MetadataResult<Vec<ResourceRow>> {
            let rows = sqlx::query_as::<_, ResourceRow>(
                "SELECT * FROM resources WHERE package_id = ? ORDER BY created_at, rowid",
            )
            .bind(package_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_resources_with_hash(&self, hash: &ContentHash) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resources WHERE sha256 = ?")
                .bind(hash.to_hex())
                .fetch_one(&self.pool)
                .await?;
            Ok(count.max(0) as u64)
        }
    }

    // -------------------------------------------------------------------------
    // Tags
    // -------------------------------------------------------------------------

    #[async_trait]
    impl TagRepo for SqliteStore {
        async fn resolve_tag(&self, name: &TagName) -> MetadataResult<TagRow> {
            let mut conn = self.pool.acquire().await?;
            let tag_id = resolve_tag_id(&mut conn, name.as_str()).await?;
            Ok(TagRow {
                tag_id,
                title: name.as_str().to_string(),
            })
        }

        async fn get_tag_by_title(&self, title: &str) -> MetadataResult<Option<TagRow>> {
            let row = sqlx::query_as::<_, TagRow>("SELECT tag_id, title FROM tags WHERE title = ?")
                .bind(title)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_package_tags(&self, package_id: PackageId) -> MetadataResult<Vec<TagRow>> {
            let rows = sqlx::query_as::<_, TagRow>(
                "SELECT t.tag_id, t.title FROM tags t JOIN package_tags pt ON pt.tag_id = t.tag_id WHERE pt.package_id = ? ORDER BY t.title",
            )
            .bind(package_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn gc_orphan_tags(&self, candidate_ids: &[i64]) -> MetadataResult<Vec<String>> {
            if candidate_ids.is_empty() {
                return Ok(Vec::new());
            }

            let mut tx = self.pool.begin().await?;
            let mut removed = Vec::new();
            for tag_id in candidate_ids {
                let title: Option<String> = sqlx::query_scalar(
                    "DELETE FROM tags WHERE tag_id = ? AND NOT EXISTS (SELECT 1 FROM package_tags WHERE tag_id = ?) RETURNING title",
                )
                .bind(tag_id)
                .bind(tag_id)
                .fetch_optional(&mut *tx)
                .await?;
                removed.extend(title);
            }
            tx.commit().await?;

            Ok(removed)
        }

        async fn suggest_tags(&self, fragment: &str, limit: u32) -> MetadataResult<Vec<String>> {
            let titles: Vec<String> = sqlx::query_scalar(
                "SELECT title FROM tags WHERE title LIKE ? ESCAPE '\\' AND title NOT LIKE '.%' ORDER BY title LIMIT ?",
            )
            .bind(format!("%{}%", escape_like(fragment)))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(titles)
        }
    }

    // -------------------------------------------------------------------------
    // Dependencies
    // -------------------------------------------------------------------------

    #[async_trait]
    impl DependencyRepo for SqliteStore {
        async fn would_create_cycle(
            &self,
            from: PackageId,
            to: PackageId,
        ) -> MetadataResult<bool> {
            let mut conn = self.pool.acquire().await?;
            reaches(&mut conn, to.as_uuid(), from.as_uuid()).await
        }

        async fn set_dependencies(
            &self,
            package_id: PackageId,
            desired: &[PackageId],
        ) -> MetadataResult<DependencyChange> {
            let mut tx = self.pool.begin().await?;
            if !package_exists(&mut tx, package_id.as_uuid()).await? {
                return Err(MetadataError::NotFound(format!("package {package_id}")));
            }
            let change = reconcile_dependencies(&mut tx, package_id.as_uuid(), desired).await?;
            tx.commit().await?;
            Ok(change)
        }

        async fn get_dependencies(&self, package_id: PackageId) -> MetadataResult<Vec<PackageId>> {
            let ids: Vec<Uuid> = sqlx::query_scalar(
                "SELECT dependency_id FROM package_dependencies WHERE package_id = ? ORDER BY rowid",
            )
            .bind(package_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            Ok(ids.into_iter().map(PackageId::from_uuid).collect())
        }

        async fn get_dependants(&self, package_id: PackageId) -> MetadataResult<Vec<PackageId>> {
            let ids: Vec<Uuid> = sqlx::query_scalar(
                "SELECT package_id FROM package_dependencies WHERE dependency_id = ? ORDER BY rowid",
            )
            .bind(package_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
            Ok(ids.into_iter().map(PackageId::from_uuid).collect())
        }
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(&self, user: &UserRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO users (user_id, name, is_moderator, token_hash, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(user.user_id)
            .bind(&user.name)
            .bind(user.is_moderator)
            .bind(&user.token_hash)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user_by_token_hash(
            &self,
            token_hash: &str,
        ) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn upsert_user_by_name(
            &self,
            name: &str,
            token_hash: &str,
            is_moderator: bool,
        ) -> MetadataResult<UserRow> {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "INSERT INTO users (user_id, name, is_moderator, token_hash, created_at) VALUES (?, ?, ?, ?, ?) \
                 ON CONFLICT(name) DO UPDATE SET token_hash = excluded.token_hash, is_moderator = excluded.is_moderator",
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(is_moderator)
            .bind(token_hash)
            .bind(OffsetDateTime::now_utc())
            .execute(&mut *tx)
            .await?;
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE name = ?")
                .bind(name)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(row)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Accounts
CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    is_moderator INTEGER NOT NULL DEFAULT 0,
    token_hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- Package aggregate root
CREATE TABLE IF NOT EXISTS packages (
    package_id BLOB PRIMARY KEY,
    owner_id BLOB NOT NULL REFERENCES users(user_id),
    title TEXT NOT NULL,
    author TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL,
    long_description TEXT NOT NULL DEFAULT '',
    search_text TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_packages_updated ON packages(updated_at);
CREATE INDEX IF NOT EXISTS idx_packages_owner ON packages(owner_id);

-- Uploaded files; sha256 is the blob key, reference counts are derived from it
CREATE TABLE IF NOT EXISTS resources (
    resource_id BLOB PRIMARY KEY,
    package_id BLOB NOT NULL REFERENCES packages(package_id),
    owner_id BLOB NOT NULL REFERENCES users(user_id),
    original_filename TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    md5 TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_resources_package ON resources(package_id);
CREATE INDEX IF NOT EXISTS idx_resources_sha256 ON resources(sha256);

-- Shared tag registry
CREATE TABLE IF NOT EXISTS tags (
    tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS package_tags (
    package_id BLOB NOT NULL REFERENCES packages(package_id),
    tag_id INTEGER NOT NULL REFERENCES tags(tag_id),
    PRIMARY KEY (package_id, tag_id)
);
CREATE INDEX IF NOT EXISTS idx_package_tags_tag ON package_tags(tag_id);

-- Directed dependency edges, at most one per ordered pair
CREATE TABLE IF NOT EXISTS package_dependencies (
    package_id BLOB NOT NULL REFERENCES packages(package_id),
    dependency_id BLOB NOT NULL REFERENCES packages(package_id),
    PRIMARY KEY (package_id, dependency_id),
    CHECK (package_id != dependency_id)
);
CREATE INDEX IF NOT EXISTS idx_package_dependencies_dependency ON package_dependencies(dependency_id);
"#;
