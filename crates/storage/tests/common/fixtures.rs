use bytes::Bytes;
use lorry_storage::{BlobStore, ByteStream, FilesystemBackend, StorageResult};
use std::path::Path;
use std::sync::Arc;

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output (reproducible tests).
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }

    Bytes::from(data)
}

/// Split `data` into a stream of 1 KiB chunks.
pub fn stream_of(data: Bytes) -> ByteStream {
    let chunks: Vec<StorageResult<Bytes>> = (0..data.len())
        .step_by(1024)
        .map(|start| Ok(data.slice(start..(start + 1024).min(data.len()))))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

pub async fn blob_store(root: &Path) -> BlobStore {
    let backend = FilesystemBackend::new(root).await.unwrap();
    BlobStore::new(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(42, 1000), seeded_bytes(42, 1000));
        assert_ne!(seeded_bytes(42, 1000), seeded_bytes(43, 1000));
    }
}
