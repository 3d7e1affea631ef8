//! Stepforge Crypto - hashing primitives used by the execution engine.
//!
//! This crate provides:
//! - SHA3-256 (physical storage keys, contract `sha3_256` host API)
//! - Blake3 content hashes (loaded contract cache keys)

pub mod hash;

pub use hash::{code_hash, hash_with_domain, sha3_256, sha3_256_multi, Hash, IncrementalHasher};
