//! Accessors for raw MessagePack payloads.

use crate::error::IpcError;
use rmpv::Value as Wire;

pub fn array<'a>(v: &'a Wire, min_len: usize, what: &'static str) -> Result<&'a [Wire], IpcError> {
    match v {
        Wire::Array(items) if items.len() >= min_len => Ok(items),
        Wire::Array(items) => Err(IpcError::Malformed(format!(
            "{what}: expected {min_len} fields, got {}",
            items.len()
        ))),
        _ => Err(IpcError::Malformed(format!("{what}: expected array"))),
    }
}

/// Raw bytes; text strings are accepted as their UTF-8 bytes.
pub fn bytes<'a>(v: &'a Wire, what: &'static str) -> Result<&'a [u8], IpcError> {
    match v {
        Wire::Binary(b) => Ok(b),
        Wire::String(s) => Ok(s.as_bytes()),
        _ => Err(IpcError::Malformed(format!("{what}: expected bytes"))),
    }
}

pub fn opt_bytes<'a>(v: &'a Wire, what: &'static str) -> Result<Option<&'a [u8]>, IpcError> {
    match v {
        Wire::Nil => Ok(None),
        other => bytes(other, what).map(Some),
    }
}

pub fn string(v: &Wire, what: &'static str) -> Result<String, IpcError> {
    let raw = bytes(v, what)?;
    String::from_utf8(raw.to_vec()).map_err(|e| IpcError::Malformed(format!("{what}: {e}")))
}

pub fn uint(v: &Wire, what: &'static str) -> Result<u64, IpcError> {
    v.as_u64()
        .ok_or_else(|| IpcError::Malformed(format!("{what}: expected unsigned integer")))
}

/// Booleans may arrive as MessagePack booleans or as 0/1 integers.
pub fn boolean(v: &Wire, what: &'static str) -> Result<bool, IpcError> {
    match v {
        Wire::Boolean(b) => Ok(*b),
        Wire::Integer(_) => Ok(uint(v, what)? != 0),
        _ => Err(IpcError::Malformed(format!("{what}: expected bool"))),
    }
}
