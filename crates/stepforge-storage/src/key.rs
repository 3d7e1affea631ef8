//! Key and value encoding.

use num_bigint::BigInt;
use num_traits::Zero;
use stepforge_types::{bytes_to_int, int_to_bytes, Address, ScoreError, ScoreResult, Value};

/// Length-prefixed frame of a single path component.
///
/// A single byte below `0x80` is its own encoding; up to 55 bytes get a
/// `0x80 + len` header; longer strings get `0xb7 + len(len)` followed by the
/// big-endian length. The encoding is prefix-free, so concatenations of
/// encoded components decode uniquely.
pub fn rlp_encode_bytes(b: &[u8]) -> Vec<u8> {
    let len = b.len();
    if len == 1 && b[0] < 0x80 {
        return b.to_vec();
    }
    let mut out = Vec::with_capacity(len + 9);
    if len <= 55 {
        out.push(0x80 + len as u8);
    } else {
        let len_bytes: Vec<u8> = len
            .to_be_bytes()
            .iter()
            .copied()
            .skip_while(|&x| x == 0)
            .collect();
        out.push(0xb7 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
    out.extend_from_slice(b);
    out
}

/// Encode a container key.
pub fn encode_key(key: &Value) -> ScoreResult<Vec<u8>> {
    match key {
        Value::Int(i) => Ok(int_to_bytes(i)),
        Value::Str(s) => Ok(s.as_bytes().to_vec()),
        Value::Address(a) => Ok(a.to_canonical_bytes()),
        Value::Bytes(b) => Ok(b.clone()),
        Value::Nil => Err(ScoreError::invalid_param("key is None")),
        other => Err(ScoreError::invalid_param(format!(
            "Unsupported key type: {}",
            other.type_name()
        ))),
    }
}

/// Encode a stored value. Addresses use their legacy storage form.
pub fn encode_value(value: &Value) -> ScoreResult<Vec<u8>> {
    match value {
        Value::Int(i) => Ok(int_to_bytes(i)),
        Value::Str(s) => Ok(s.as_bytes().to_vec()),
        Value::Address(a) => Ok(a.to_bytes()),
        Value::Bool(b) => Ok(int_to_bytes(&BigInt::from(u8::from(*b)))),
        Value::Bytes(b) => Ok(b.clone()),
        other => Err(ScoreError::invalid_param(format!(
            "Unsupported value type: {}",
            other.type_name()
        ))),
    }
}

/// Declared element type of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Str,
    Bytes,
    Bool,
    Address,
}

impl ValueType {
    pub fn matches(self, v: &Value) -> bool {
        matches!(
            (self, v),
            (ValueType::Int, Value::Int(_))
                | (ValueType::Str, Value::Str(_))
                | (ValueType::Bytes, Value::Bytes(_))
                | (ValueType::Bool, Value::Bool(_))
                | (ValueType::Address, Value::Address(_))
        )
    }

    /// Value read back for a missing key.
    pub fn default_value(self) -> Value {
        match self {
            ValueType::Int => Value::Int(BigInt::zero()),
            ValueType::Str => Value::Str(String::new()),
            ValueType::Bool => Value::Bool(false),
            ValueType::Bytes | ValueType::Address => Value::Nil,
        }
    }
}

pub fn decode_value(raw: Option<&[u8]>, ty: ValueType) -> ScoreResult<Value> {
    let Some(raw) = raw else {
        return Ok(ty.default_value());
    };
    Ok(match ty {
        ValueType::Int => Value::Int(bytes_to_int(raw)),
        ValueType::Str => Value::Str(
            String::from_utf8(raw.to_vec())
                .map_err(|e| ScoreError::IllegalFormat(e.to_string()))?,
        ),
        ValueType::Bytes => Value::Bytes(raw.to_vec()),
        ValueType::Bool => Value::Bool(!bytes_to_int(raw).is_zero()),
        ValueType::Address => Value::Address(Address::from_slice(raw)?),
    })
}
