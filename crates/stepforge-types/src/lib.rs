//! Stepforge Types - Core type definitions shared by the execution engine.
//!
//! This crate provides the fundamental types used on both sides of the
//! host/engine boundary:
//! - Addresses (21-byte, `hx`/`cx` text form)
//! - Dynamic values carried by "any" encoded payloads
//! - Signed big-endian integer byte codec
//! - Step kinds and the engine fault taxonomy

pub mod address;
pub mod error;
pub mod int;
pub mod revision;
pub mod step;
pub mod value;

pub use address::{Address, AddressPrefix};
pub use error::{ScoreError, ScoreResult, Status, TypesError};
pub use int::{bytes_to_int, int_to_bytes};
pub use revision::Revision;
pub use step::StepKind;
pub use value::Value;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Address, AddressPrefix, Revision, ScoreError, ScoreResult, StepKind, TypesError, Value,
    };
    pub use num_bigint::BigInt;
}
