use sha3::{Digest, Sha3_256};
use std::fmt;

/// 32-byte digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// SHA3-256 of data.
pub fn sha3_256(data: &[u8]) -> Hash {
    let mut hasher = IncrementalHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// SHA3-256 of the concatenation of several slices.
pub fn sha3_256_multi(parts: &[&[u8]]) -> Hash {
    let mut hasher = IncrementalHasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// Incremental SHA3-256 hasher.
pub struct IncrementalHasher {
    hasher: Sha3_256,
}

impl IncrementalHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> Hash {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.hasher.finalize());
        Hash(out)
    }

    pub fn reset(&mut self) {
        Digest::reset(&mut self.hasher);
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Blake3 hash with a domain separator.
pub fn hash_with_domain(data: &[u8], domain: &str) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(data);
    Hash(*hasher.finalize().as_bytes())
}

/// Cache key for a loaded contract, derived from its code reference.
pub fn code_hash(code_ref: &str) -> Hash {
    hash_with_domain(code_ref.as_bytes(), "stepforge/code")
}
