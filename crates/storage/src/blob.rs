//! Content store: one physical blob per strong digest.
//!
//! Blobs live under `ab/cd/<hex>` keys of the wrapped [`ObjectStore`]. The
//! store itself keeps no reference counts; callers decide when a blob is
//! unreferenced and call [`BlobStore::remove`].
//!
//! Writers that are about to reference a hash hold a shared [`BlobLease`]
//! until their metadata transaction has finished. Removal only proceeds under
//! the exclusive side of the same lock, so a blob is never deleted underneath
//! an in-flight upload in this process.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore};
use futures::StreamExt;
use lorry_core::{ContentHash, DigestHasher};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::instrument;

/// Result of [`BlobStore::put`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The bytes were written as a new blob.
    Stored,
    /// A blob with this digest already existed; the new bytes were dropped.
    AlreadyPresent,
}

/// Shared hold on a digest. Blocks removal of that blob while alive.
#[derive(Debug)]
pub struct BlobLease {
    hash: ContentHash,
    _guard: OwnedRwLockReadGuard<()>,
}

impl BlobLease {
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }
}

/// Exclusive hold on a digest, taken while checking references and deleting.
#[derive(Debug)]
pub struct RemovalGuard {
    hash: ContentHash,
    _guard: OwnedRwLockWriteGuard<()>,
}

impl RemovalGuard {
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }
}

#[derive(Default)]
struct BlobLeases {
    locks: Mutex<HashMap<ContentHash, Arc<RwLock<()>>>>,
}

impl BlobLeases {
    fn lock_for(&self, hash: &ContentHash) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // Entries nobody holds a guard on are dead weight.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(*hash).or_default().clone()
    }
}

/// Content-addressed blob store with deduplication.
#[derive(Clone)]
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
    leases: Arc<BlobLeases>,
}

impl BlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            leases: Arc::new(BlobLeases::default()),
        }
    }

    /// Underlying object store.
    pub fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Take a shared lease on `hash`.
    ///
    /// Waits while a removal of the same blob is in progress, so once this
    /// returns the caller can rely on `put` either finding the blob or
    /// writing it fresh.
    pub async fn lease(&self, hash: &ContentHash) -> BlobLease {
        let lock = self.leases.lock_for(hash);
        BlobLease {
            hash: *hash,
            _guard: lock.read_owned().await,
        }
    }

    /// Try to take the exclusive removal lock on `hash`.
    ///
    /// Returns `None` while any lease on the hash is held.
    pub fn try_lock_for_removal(&self, hash: &ContentHash) -> Option<RemovalGuard> {
        let lock = self.leases.lock_for(hash);
        lock.try_write_owned().ok().map(|guard| RemovalGuard {
            hash: *hash,
            _guard: guard,
        })
    }

    pub async fn exists(&self, hash: &ContentHash) -> StorageResult<bool> {
        self.store.exists(&hash.to_object_key()).await
    }

    /// Store a stream of bytes under `hash`.
    ///
    /// The stream is drained either way. When the blob is new the bytes are
    /// hashed on the way in and the write is aborted on a digest mismatch.
    #[instrument(skip(self, data), fields(hash = %hash))]
    pub async fn put(&self, hash: &ContentHash, mut data: ByteStream) -> StorageResult<PutOutcome> {
        let key = hash.to_object_key();

        if self.store.exists(&key).await? {
            while let Some(chunk) = data.next().await {
                chunk?;
            }
            return Ok(PutOutcome::AlreadyPresent);
        }

        let mut upload = self.store.put_stream(&key).await?;
        let mut hasher = DigestHasher::new();

        while let Some(chunk) = data.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = upload.abort().await;
                    return Err(e);
                }
            };
            hasher.update(&chunk);
            if let Err(e) = upload.write(chunk).await {
                let _ = upload.abort().await;
                return Err(e);
            }
        }

        let actual = hasher.finalize().sha256;
        if actual != *hash {
            let _ = upload.abort().await;
            return Err(StorageError::HashMismatch {
                expected: hash.to_hex(),
                actual: actual.to_hex(),
            });
        }

        upload.finish().await?;
        Ok(PutOutcome::Stored)
    }

    /// Move an already hashed local file into the store under `hash`.
    ///
    /// The source is consumed in both outcomes.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn put_file(&self, hash: &ContentHash, source: &Path) -> StorageResult<PutOutcome> {
        let key = hash.to_object_key();

        if self.store.exists(&key).await? {
            if let Err(e) = tokio::fs::remove_file(source).await {
                tracing::debug!(error = %e, path = %source.display(), "failed to drop duplicate upload");
            }
            return Ok(PutOutcome::AlreadyPresent);
        }

        self.store.put_file(&key, source).await?;
        Ok(PutOutcome::Stored)
    }

    /// Open a blob for reading.
    pub async fn get(&self, hash: &ContentHash) -> StorageResult<ByteStream> {
        self.store.get_stream(&hash.to_object_key()).await
    }

    /// Delete a blob and prune empty shard directories.
    ///
    /// Best-effort: failures are logged and reported as `false`. Callers are
    /// expected to hold the [`RemovalGuard`] for `hash`.
    #[instrument(skip(self, _guard), fields(hash = %hash))]
    pub async fn remove(&self, hash: &ContentHash, _guard: &RemovalGuard) -> bool {
        match self.store.delete(&hash.to_object_key()).await {
            Ok(()) => true,
            Err(StorageError::NotFound(_)) => {
                tracing::debug!("blob already absent");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to remove blob");
                false
            }
        }
    }

    pub async fn health_check(&self) -> StorageResult<()> {
        self.store.health_check().await
    }
}
