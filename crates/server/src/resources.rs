//! Resource registry: staging, ingestion and release of uploaded files.
//!
//! An upload is spooled once into the staging directory while both digests
//! and the size are computed. Ingesting moves the staged bytes into the
//! content store under a blob lease that the caller keeps until its metadata
//! transaction has finished.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use lorry_core::{ContentHash, DigestHasher, ResourceDigests, ResourceId, format_size};
use lorry_metadata::MetadataStore;
use lorry_metadata::models::{NewResource, ResourceRow};
use lorry_storage::{BlobLease, BlobStore, ByteStream, PutOutcome, StorageError};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// An uploaded file spooled to disk. The spool file is removed on drop.
#[derive(Debug)]
pub struct StagedFile {
    filename: String,
    path: PathBuf,
    digests: ResourceDigests,
}

impl StagedFile {
    /// Sanitised original filename.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn digests(&self) -> &ResourceDigests {
        &self.digests
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        // Already gone once the content store took it over.
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A file moved into the content store, not yet referenced by a commit.
#[derive(Debug)]
pub struct IngestedResource {
    pub resource: NewResource,
    pub outcome: PutOutcome,
    /// Keeps the blob from being collected until the transaction is over.
    pub lease: BlobLease,
}

/// Outcome of a reference-checked collection pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub removed: usize,
    /// Still referenced by at least one resource.
    pub retained: usize,
    /// Held by an in-flight upload.
    pub skipped: usize,
    pub failed: usize,
}

/// Registry of resource records and their blobs.
#[derive(Clone)]
pub struct ResourceRegistry {
    blobs: BlobStore,
    metadata: Arc<dyn MetadataStore>,
    staging_dir: PathBuf,
}

impl ResourceRegistry {
    /// Create a registry, creating the staging directory if needed.
    pub async fn new(
        blobs: BlobStore,
        metadata: Arc<dyn MetadataStore>,
        staging_dir: impl Into<PathBuf>,
    ) -> ApiResult<Self> {
        let staging_dir = staging_dir.into();
        tokio::fs::create_dir_all(&staging_dir)
            .await
            .map_err(StorageError::Io)?;
        Ok(Self {
            blobs,
            metadata,
            staging_dir,
        })
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Spool a byte stream to the staging directory, hashing it on the way.
    pub async fn stage<S, E>(&self, filename: String, stream: S) -> ApiResult<StagedFile>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let path = self.staging_dir.join(format!("{}.upload", Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(StorageError::Io)?;

        // From here on the spool file is cleaned up by drop, whatever happens.
        let mut staged = StagedFile {
            filename,
            path,
            digests: ResourceDigests::compute(&[]),
        };

        let mut hasher = DigestHasher::new();
        let mut stream = std::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("upload interrupted: {e}")))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(StorageError::Io)?;
        }
        file.sync_all().await.map_err(StorageError::Io)?;
        drop(file);

        staged.digests = hasher.finalize();
        tracing::debug!(
            filename = %staged.filename,
            size = staged.digests.size,
            hash = %staged.digests.sha256,
            "upload staged"
        );
        Ok(staged)
    }

    /// Move a staged file into the content store.
    ///
    /// The lease is taken before the blob is looked up, so a concurrent
    /// collection of the same digest either finishes first (and the bytes are
    /// written fresh) or is skipped.
    pub async fn ingest(&self, staged: StagedFile) -> ApiResult<IngestedResource> {
        let digests = staged.digests;
        let lease = self.blobs.lease(&digests.sha256).await;
        let outcome = self.blobs.put_file(&digests.sha256, staged.path()).await?;

        match outcome {
            PutOutcome::Stored => metrics::BLOBS_STORED.inc(),
            PutOutcome::AlreadyPresent => metrics::BLOBS_DEDUPLICATED.inc(),
        }
        metrics::BYTES_INGESTED.inc_by(digests.size);

        Ok(IngestedResource {
            resource: NewResource {
                resource_id: ResourceId::new(),
                original_filename: staged.filename.clone(),
                size_bytes: digests.size,
                md5: digests.md5.to_hex(),
                sha256: digests.sha256,
            },
            outcome,
            lease,
        })
    }

    /// Detach a resource from its package: returns the digest to check once
    /// the deleting transaction has committed.
    pub fn release(&self, resource: &ResourceRow) -> ApiResult<ContentHash> {
        Ok(resource.content_hash()?)
    }

    /// Human-readable size of a resource.
    pub fn size_display(resource: &ResourceRow) -> String {
        format_size(resource.size())
    }

    /// Look up a resource and open its blob.
    pub async fn open(&self, resource_id: ResourceId) -> ApiResult<(ResourceRow, ByteStream)> {
        let resource = self
            .metadata
            .get_resource(resource_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("resource {resource_id}")))?;
        let hash = resource.content_hash()?;
        let stream = self.blobs.get(&hash).await.map_err(|e| match e {
            StorageError::NotFound(_) => {
                tracing::error!(%resource_id, %hash, "resource has no blob");
                ApiError::NotFound(format!("resource {resource_id}"))
            }
            other => other.into(),
        })?;
        Ok((resource, stream))
    }

    /// Remove every blob in `hashes` that no committed resource references.
    ///
    /// Best-effort: failures are logged and counted, never returned.
    pub async fn collect_unreferenced(&self, hashes: &[ContentHash]) -> CollectStats {
        let mut stats = CollectStats::default();

        for hash in hashes {
            let Some(guard) = self.blobs.try_lock_for_removal(hash) else {
                tracing::debug!(%hash, "blob in use by an upload, not collecting");
                metrics::BLOB_REMOVALS_SKIPPED.inc();
                stats.skipped += 1;
                continue;
            };

            match self.metadata.count_resources_with_hash(hash).await {
                Ok(0) => {
                    if self.blobs.remove(hash, &guard).await {
                        metrics::BLOBS_REMOVED.inc();
                        stats.removed += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
                Ok(_) => stats.retained += 1,
                Err(e) => {
                    tracing::warn!(%hash, error = %e, "reference count failed, keeping blob");
                    metrics::record_cleanup_failure("blob_refcount");
                    stats.failed += 1;
                }
            }
        }

        if stats.removed > 0 || stats.failed > 0 {
            tracing::info!(
                removed = stats.removed,
                retained = stats.retained,
                skipped = stats.skipped,
                failed = stats.failed,
                "blob collection finished"
            );
        }
        stats
    }
}
