//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads and writes.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Object store abstraction over a flat key space.
///
/// Keys are relative `/`-separated paths. Writes are atomic: a reader sees
/// either the previous object or the complete new one.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Start a streaming upload.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Move a local file into the store under `key`.
    ///
    /// The source file is consumed. Backends that cannot rename fall back to
    /// copying and deleting the source.
    async fn put_file(&self, key: &str, source: &Path) -> StorageResult<()>;

    /// Delete an object.
    ///
    /// Backends with a directory hierarchy also remove parent directories
    /// left empty by the deletion.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type. Used for
    /// logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
