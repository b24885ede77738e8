//! Cryptographic digests for resource content.
//!
//! Every uploaded file carries two digests computed from the same byte
//! stream: a SHA-256 [`ContentHash`] which is the deduplication key and names
//! the physical blob, and an MD5 [`Md5Digest`] kept as a cheap integrity
//! fingerprint for clients.

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 content hash represented as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute SHA-256 hash of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        decode_hex::<32>(s).map(Self)
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }

    /// Object key of the blob holding this content.
    ///
    /// Blobs are sharded two levels deep by the first four hex characters so
    /// that no single directory grows unbounded: `ab/cd/abcd…`.
    pub fn to_object_key(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}/{}", &hex[..2], &hex[2..4], hex)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// An MD5 digest represented as 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Md5Digest([u8; 16]);

impl Md5Digest {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Compute the MD5 digest of data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn from_hex(s: &str) -> crate::Result<Self> {
        decode_hex::<16>(s).map(Self)
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }
}

impl fmt::Debug for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Md5Digest({})", self.to_hex())
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Both digests and the byte length of one resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceDigests {
    pub sha256: ContentHash,
    pub md5: Md5Digest,
    pub size: u64,
}

impl ResourceDigests {
    /// Digest an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = DigestHasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Incremental hasher feeding both digests from a single pass over the input.
pub struct DigestHasher {
    sha256: Sha256,
    md5: Md5,
    size: u64,
}

impl DigestHasher {
    pub fn new() -> Self {
        Self {
            sha256: Sha256::new(),
            md5: Md5::new(),
            size: 0,
        }
    }

    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.sha256.update(data);
        self.md5.update(data);
        self.size += data.len() as u64;
    }

    /// Bytes consumed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.size
    }

    /// Finalize and return both digests.
    pub fn finalize(self) -> ResourceDigests {
        ResourceDigests {
            sha256: ContentHash(self.sha256.finalize().into()),
            md5: Md5Digest(self.md5.finalize().into()),
            size: self.size,
        }
    }
}

impl Default for DigestHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex<const N: usize>(s: &str) -> crate::Result<[u8; N]> {
    if s.len() != N * 2 {
        return Err(crate::Error::InvalidHash(format!(
            "expected {} hex chars, got {}",
            N * 2,
            s.len()
        )));
    }
    let mut bytes = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hex_str =
            std::str::from_utf8(chunk).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        bytes[i] = u8::from_str_radix(hex_str, 16)
            .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let digests = ResourceDigests::compute(b"hello world");
        assert_eq!(
            digests.sha256.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(digests.md5.to_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(digests.size, 11);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = DigestHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.bytes_hashed(), 11);
        assert_eq!(hasher.finalize(), ResourceDigests::compute(b"hello world"));
    }

    #[test]
    fn test_object_key_is_sharded() {
        let hash = ContentHash::compute(b"hello world");
        assert_eq!(
            hash.to_object_key(),
            "b9/4d/b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(ContentHash::from_hex("abc").is_err());
        assert!(ContentHash::from_hex(&"zz".repeat(32)).is_err());
        assert!(Md5Digest::from_hex(&"0".repeat(31)).is_err());

        let hash = ContentHash::compute(b"x");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()).unwrap(), hash);
    }
}
