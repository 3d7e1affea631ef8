//! Type codec for scalar values and tagged "any" values.
//!
//! Scalars travel as raw bytes whose interpretation is fixed by context.
//! "Any" values travel as `[tag, payload]` pairs, nested for lists and dicts.
//! Types outside the primitive set (addresses, floats) are delegated to a
//! [`CustomCodec`] chosen per invoke by revision.

use crate::error::IpcError;
use crate::payload;
use rmpv::Value as Wire;
use std::collections::BTreeMap;
use std::fmt;
use stepforge_types::{bytes_to_int, int_to_bytes, Address, Revision, Value};

/// Type tags of "any" values.
pub struct TypeTag;

impl TypeTag {
    pub const NIL: u64 = 0;
    pub const DICT: u64 = 1;
    pub const LIST: u64 = 2;
    pub const BYTES: u64 = 3;
    pub const STRING: u64 = 4;
    pub const BOOL: u64 = 5;
    pub const CUSTOM: u64 = 10;
    pub const ADDRESS: u64 = Self::CUSTOM;
    pub const INT: u64 = Self::CUSTOM + 1;
    pub const FLOAT: u64 = Self::CUSTOM + 2;
}

/// Extension point for the domain-specific types.
pub trait CustomCodec: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn encode(&self, v: &Value) -> Result<(u64, Vec<u8>), IpcError>;
    fn decode(&self, tag: u64, bytes: &[u8]) -> Result<Value, IpcError>;
}

/// Addresses and floats, used before [`Revision::ICON2`].
#[derive(Debug)]
pub struct LegacyCodec;

/// Addresses only.
#[derive(Debug)]
pub struct CurrentCodec;

fn decode_address(bytes: &[u8]) -> Result<Value, IpcError> {
    Address::from_slice(bytes)
        .map(Value::Address)
        .map_err(|e| IpcError::Malformed(e.to_string()))
}

impl CustomCodec for LegacyCodec {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn encode(&self, v: &Value) -> Result<(u64, Vec<u8>), IpcError> {
        match v {
            Value::Address(a) => Ok((TypeTag::ADDRESS, a.to_canonical_bytes())),
            Value::Float(f) => Ok((TypeTag::FLOAT, format!("{f:?}").into_bytes())),
            other => Err(IpcError::Unencodable(other.type_name())),
        }
    }

    fn decode(&self, tag: u64, bytes: &[u8]) -> Result<Value, IpcError> {
        match tag {
            TypeTag::ADDRESS => decode_address(bytes),
            TypeTag::FLOAT => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .map(Value::Float)
                .ok_or_else(|| IpcError::malformed("invalid float")),
            other => Err(IpcError::UnknownTypeTag(other)),
        }
    }
}

impl CustomCodec for CurrentCodec {
    fn name(&self) -> &'static str {
        "current"
    }

    fn encode(&self, v: &Value) -> Result<(u64, Vec<u8>), IpcError> {
        match v {
            Value::Address(a) => Ok((TypeTag::ADDRESS, a.to_canonical_bytes())),
            other => Err(IpcError::Unencodable(other.type_name())),
        }
    }

    fn decode(&self, tag: u64, bytes: &[u8]) -> Result<Value, IpcError> {
        match tag {
            TypeTag::ADDRESS => decode_address(bytes),
            other => Err(IpcError::UnknownTypeTag(other)),
        }
    }
}

#[derive(Clone, Copy)]
pub struct Codec {
    custom: &'static dyn CustomCodec,
}

impl Codec {
    pub const LEGACY: Codec = Codec {
        custom: &LegacyCodec,
    };
    pub const CURRENT: Codec = Codec {
        custom: &CurrentCodec,
    };

    pub fn for_revision(revision: Revision) -> Self {
        if revision.is_legacy() {
            Self::LEGACY
        } else {
            Self::CURRENT
        }
    }

    pub fn name(&self) -> &'static str {
        self.custom.name()
    }

    /// Encode a scalar as raw bytes (`nil` for [`Value::Nil`]).
    pub fn encode(&self, v: &Value) -> Result<Wire, IpcError> {
        Ok(match v {
            Value::Nil => Wire::Nil,
            Value::Str(s) => Wire::Binary(s.as_bytes().to_vec()),
            Value::Bytes(b) => Wire::Binary(b.clone()),
            Value::Bool(b) => Wire::Binary(vec![u8::from(*b)]),
            Value::Int(i) => Wire::Binary(int_to_bytes(i)),
            Value::List(_) | Value::Dict(_) => return Err(IpcError::Unencodable(v.type_name())),
            other => Wire::Binary(self.custom.encode(other)?.1),
        })
    }

    /// Decode a scalar of a known tag.
    pub fn decode(&self, tag: u64, bytes: &[u8]) -> Result<Value, IpcError> {
        match tag {
            TypeTag::BYTES => Ok(Value::Bytes(bytes.to_vec())),
            TypeTag::STRING => String::from_utf8(bytes.to_vec())
                .map(Value::Str)
                .map_err(|e| IpcError::Malformed(e.to_string())),
            TypeTag::INT => Ok(Value::Int(bytes_to_int(bytes))),
            TypeTag::BOOL => match bytes {
                [0] => Ok(Value::Bool(false)),
                [1] => Ok(Value::Bool(true)),
                _ => Err(IpcError::Malformed(format!(
                    "illegal bool bytes {}",
                    hex::encode(bytes)
                ))),
            },
            other => self.custom.decode(other, bytes),
        }
    }

    pub fn encode_any(&self, v: &Value) -> Result<Wire, IpcError> {
        let (tag, body) = match v {
            Value::Nil => (TypeTag::NIL, Wire::Nil),
            Value::Dict(map) => {
                let mut entries = Vec::with_capacity(map.len());
                for (k, item) in map {
                    entries.push((Wire::from(k.as_str()), self.encode_any(item)?));
                }
                (TypeTag::DICT, Wire::Map(entries))
            }
            Value::List(items) => {
                let encoded = items
                    .iter()
                    .map(|item| self.encode_any(item))
                    .collect::<Result<Vec<_>, _>>()?;
                (TypeTag::LIST, Wire::Array(encoded))
            }
            Value::Bytes(b) => (TypeTag::BYTES, Wire::Binary(b.clone())),
            Value::Str(s) => (TypeTag::STRING, Wire::Binary(s.as_bytes().to_vec())),
            Value::Bool(b) => (TypeTag::BOOL, Wire::Binary(vec![u8::from(*b)])),
            Value::Int(i) => (TypeTag::INT, Wire::Binary(int_to_bytes(i))),
            other => {
                let (tag, bytes) = self.custom.encode(other)?;
                (tag, Wire::Binary(bytes))
            }
        };
        Ok(Wire::Array(vec![Wire::from(tag), body]))
    }

    pub fn decode_any(&self, v: &Wire) -> Result<Value, IpcError> {
        let pair = payload::array(v, 2, "any value")?;
        let tag = payload::uint(&pair[0], "type tag")?;
        match tag {
            TypeTag::NIL => Ok(Value::Nil),
            TypeTag::DICT => {
                let entries = pair[1]
                    .as_map()
                    .ok_or_else(|| IpcError::malformed("dict payload"))?;
                let mut map = BTreeMap::new();
                for (k, item) in entries {
                    map.insert(payload::string(k, "dict key")?, self.decode_any(item)?);
                }
                Ok(Value::Dict(map))
            }
            TypeTag::LIST => {
                let items = pair[1]
                    .as_array()
                    .ok_or_else(|| IpcError::malformed("list payload"))?;
                let decoded = items
                    .iter()
                    .map(|item| self.decode_any(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(decoded))
            }
            other => self.decode(other, payload::bytes(&pair[1], "any payload")?),
        }
    }
}

impl PartialEq for Codec {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Codec({})", self.name())
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::CURRENT
    }
}
