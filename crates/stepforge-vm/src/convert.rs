//! Conversion of host-supplied parameters to a method's declared types.
//!
//! Legacy hosts send every scalar as a string (`"0x10"`, `"0x1"`,
//! `"hx..."`); newer ones send native values. Both forms are accepted.

use num_bigint::BigInt;
use num_traits::Zero;
use std::collections::BTreeMap;
use stepforge_ipc::{DataType, MethodDescriptor, Param};
use stepforge_types::{int::parse_int, Address, Revision, ScoreError, ScoreResult, Value};

/// Key holding positional arguments inside a named-parameter dict.
pub const POSITIONAL_KEY: &str = ".";

/// Arrange `params` in declaration order, converting each to its declared
/// type and filling defaults for missing optional parameters.
pub fn convert_params(method: &MethodDescriptor, params: &Value, revision: Revision) -> ScoreResult<Vec<Value>> {
    let (positional, mut named): (Vec<Value>, BTreeMap<String, Value>) = match params {
        Value::Nil => (Vec::new(), BTreeMap::new()),
        Value::List(items) => (items.clone(), BTreeMap::new()),
        Value::Dict(map) => {
            let mut named = map.clone();
            let positional = match named.remove(POSITIONAL_KEY) {
                Some(Value::List(items)) => items,
                Some(Value::Nil) | None => Vec::new(),
                Some(other) => {
                    return Err(ScoreError::invalid_param(format!(
                        "positional parameters must be a list, got {}",
                        other.type_name()
                    )))
                }
            };
            (positional, named)
        }
        other => {
            return Err(ScoreError::invalid_param(format!(
                "parameters must be a list or dict, got {}",
                other.type_name()
            )))
        }
    };

    if positional.len() > method.inputs.len() {
        return Err(ScoreError::invalid_param(format!(
            "{}: too many arguments ({} > {})",
            method.name,
            positional.len(),
            method.inputs.len()
        )));
    }

    let mut args = Vec::with_capacity(method.inputs.len());
    for (i, param) in method.inputs.iter().enumerate() {
        let supplied = if i < positional.len() {
            if named.contains_key(&param.name) {
                return Err(ScoreError::invalid_param(format!(
                    "{}: multiple values for {}",
                    method.name, param.name
                )));
            }
            Some(positional[i].clone())
        } else {
            named.remove(&param.name)
        };
        args.push(resolve_param(method, param, supplied, revision)?);
    }

    if let Some(unknown) = named.keys().next() {
        return Err(ScoreError::invalid_param(format!(
            "{}: unexpected parameter {unknown}",
            method.name
        )));
    }
    Ok(args)
}

fn resolve_param(method: &MethodDescriptor, param: &Param, supplied: Option<Value>, revision: Revision) -> ScoreResult<Value> {
    match (supplied, &param.default) {
        (Some(Value::Nil), Some(default)) | (None, Some(default)) => Ok(default.clone()),
        (Some(Value::Nil), None) | (None, None) => Err(ScoreError::invalid_param(format!(
            "{}: missing argument {}",
            method.name, param.name
        ))),
        (Some(v), _) => convert_value(&param.ty, v, revision)
            .map_err(|e| ScoreError::invalid_param(format!("{}.{}: {}", method.name, param.name, e.message()))),
    }
}

/// Convert one value to `ty`.
pub fn convert_value(ty: &DataType, value: Value, revision: Revision) -> ScoreResult<Value> {
    match (ty, value) {
        (DataType::Integer, v @ Value::Int(_)) => Ok(v),
        (DataType::Integer, Value::Str(s)) => Ok(Value::Int(parse_int(&s)?)),

        (DataType::String, v @ Value::Str(_)) => Ok(v),

        (DataType::Bytes, v @ Value::Bytes(_)) => Ok(v),
        (DataType::Bytes, Value::Str(s)) => {
            let hex_body = s.strip_prefix("0x").unwrap_or(&s);
            hex::decode(hex_body)
                .map(Value::Bytes)
                .map_err(|e| ScoreError::invalid_param(format!("invalid bytes {s}: {e}")))
        }

        (DataType::Bool, v @ Value::Bool(_)) => Ok(v),
        (DataType::Bool, Value::Str(s)) => Ok(Value::Bool(!parse_int(&s)?.is_zero())),
        (DataType::Bool, Value::Int(i)) if i == BigInt::from(0) || i == BigInt::from(1) => {
            Ok(Value::Bool(!i.is_zero()))
        }

        (DataType::Address, v @ Value::Address(_)) => Ok(v),
        (DataType::Address, Value::Str(s)) => match s.parse::<Address>() {
            Ok(a) => Ok(Value::Address(a)),
            Err(_) if revision.is_legacy() && s.starts_with("hx") => {
                Ok(Value::Address(Address::malformed_from_str(&s)?))
            }
            Err(e) => Err(e.into()),
        },

        (DataType::List, v @ Value::List(_)) => Ok(v),
        (DataType::Dict, v @ Value::Dict(_)) => Ok(v),

        (DataType::Array(inner), Value::List(items)) => items
            .into_iter()
            .map(|item| convert_value(inner, item, revision))
            .collect::<ScoreResult<Vec<_>>>()
            .map(Value::List),

        (DataType::Struct(fields), Value::Dict(mut map)) => {
            let mut out = BTreeMap::new();
            for field in fields {
                let v = map
                    .remove(&field.name)
                    .ok_or_else(|| ScoreError::invalid_param(format!("missing field {}", field.name)))?;
                out.insert(field.name.clone(), convert_value(&field.ty, v, revision)?);
            }
            if let Some(extra) = map.keys().next() {
                return Err(ScoreError::invalid_param(format!("unknown field {extra}")));
            }
            Ok(Value::Dict(out))
        }

        (ty, v) => Err(ScoreError::invalid_param(format!(
            "cannot convert {} to type {}",
            v.type_name(),
            ty.code()
        ))),
    }
}
