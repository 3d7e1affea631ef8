//! Signed big-endian integer codec used for every integer on the wire and in storage.

use crate::error::TypesError;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

/// Minimal two's-complement big-endian encoding. Zero encodes as a single `0x00`.
pub fn int_to_bytes(v: &BigInt) -> Vec<u8> {
    v.to_signed_bytes_be()
}

/// Inverse of [`int_to_bytes`]. An empty slice decodes to zero.
pub fn bytes_to_int(bs: &[u8]) -> BigInt {
    if bs.is_empty() {
        return BigInt::zero();
    }
    BigInt::from_signed_bytes_be(bs)
}

/// Parse a textual integer: `0x`/`-0x` prefixed hex or plain decimal.
pub fn parse_int(s: &str) -> Result<BigInt, TypesError> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let parsed = if let Some(hex) = body.strip_prefix("0x") {
        BigInt::parse_bytes(hex.as_bytes(), 16)
    } else {
        BigInt::parse_bytes(body.as_bytes(), 10)
    };
    let v = parsed.ok_or_else(|| TypesError::InvalidInteger(s.to_string()))?;
    Ok(if negative { -v } else { v })
}

/// Format an integer as `0x`-prefixed hex, the form used in JSON-like parameters.
pub fn format_hex(v: &BigInt) -> String {
    if v.is_negative() {
        format!("-0x{}", (-v).to_str_radix(16))
    } else {
        format!("0x{}", v.to_str_radix(16))
    }
}

/// Convert to `u64`, failing for negatives or values that do not fit.
pub fn to_u64(v: &BigInt) -> Result<u64, TypesError> {
    v.to_u64()
        .ok_or_else(|| TypesError::InvalidInteger(v.to_string()))
}
