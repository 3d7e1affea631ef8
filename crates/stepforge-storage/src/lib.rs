//! Stepforge Storage - layered key-value store for contract state.
//!
//! Logical container operations are mapped onto one flat key space:
//! every path component is length-prefixed, the composed byte string is
//! namespaced by the owning contract address and hashed with SHA3-256.
//!
//! [`ScoreDatabase`] only describes a key namespace. Physical access goes
//! through a [`KvBackend`], which lets the execution engine charge steps
//! for every byte touched.

pub mod backend;
pub mod container;
pub mod db;
pub mod key;

pub use backend::{DummyBackend, KvBackend, MemoryBackend};
pub use container::{ArrayDb, DictDb, VarDb};
pub use db::{array_element_key, ScoreDatabase};
pub use key::{decode_value, encode_key, encode_value, rlp_encode_bytes, ValueType};

/// Container kind tags.
pub const ARRAY_DB_ID: u8 = 0x00;
pub const DICT_DB_ID: u8 = 0x01;
pub const VAR_DB_ID: u8 = 0x02;
