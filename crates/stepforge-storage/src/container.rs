//! Typed containers over a [`ScoreDatabase`].
//!
//! Containers only hold key namespaces; every operation takes the backend
//! explicitly, so charging and permission checks stay with the caller.

use crate::backend::KvBackend;
use crate::db::ScoreDatabase;
use crate::key::{decode_value, encode_key, encode_value, ValueType};
use crate::{ARRAY_DB_ID, DICT_DB_ID, VAR_DB_ID};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use stepforge_types::{int_to_bytes, ScoreError, ScoreResult, Value};

/// Single value stored under a named cell.
#[derive(Debug, Clone)]
pub struct VarDb {
    db: ScoreDatabase,
    ty: ValueType,
}

impl VarDb {
    pub fn new(key: impl Into<Value>, parent: &ScoreDatabase, ty: ValueType) -> ScoreResult<Self> {
        let db = parent.sub_db(&encode_key(&key.into())?, Some(VAR_DB_ID));
        Ok(Self { db, ty })
    }

    pub fn get(&self, backend: &mut dyn KvBackend) -> ScoreResult<Value> {
        let raw = self.db.get(backend, None)?;
        decode_value(raw.as_deref(), self.ty)
    }

    pub fn set(&self, backend: &mut dyn KvBackend, value: &Value) -> ScoreResult<()> {
        self.db.put(backend, None, &encode_value(value)?)
    }

    pub fn remove(&self, backend: &mut dyn KvBackend) -> ScoreResult<()> {
        self.db.delete(backend, None)
    }
}

/// Keyed map, optionally nested `depth` levels deep.
///
/// Only the innermost level stores values; outer levels hand out narrower
/// maps through [`DictDb::sub`]. Iteration is not supported.
#[derive(Debug, Clone)]
pub struct DictDb {
    db: ScoreDatabase,
    ty: ValueType,
    depth: usize,
}

impl DictDb {
    pub fn new(key: impl Into<Value>, parent: &ScoreDatabase, ty: ValueType, depth: usize) -> ScoreResult<Self> {
        if depth == 0 {
            return Err(ScoreError::invalid_param("DictDB depth must be positive"));
        }
        let db = parent.sub_db(&encode_key(&key.into())?, Some(DICT_DB_ID));
        Ok(Self { db, ty, depth })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn leaf(&self) -> ScoreResult<()> {
        if self.depth != 1 {
            return Err(ScoreError::ContainerAccess("DictDB depth mismatch".into()));
        }
        Ok(())
    }

    /// Map one level down, scoped to `key`.
    pub fn sub(&self, key: &Value) -> ScoreResult<DictDb> {
        if self.depth <= 1 {
            return Err(ScoreError::ContainerAccess("DictDB depth mismatch".into()));
        }
        Ok(DictDb {
            db: self.db.sub_db(&encode_key(key)?, Some(DICT_DB_ID)),
            ty: self.ty,
            depth: self.depth - 1,
        })
    }

    pub fn get(&self, backend: &mut dyn KvBackend, key: &Value) -> ScoreResult<Value> {
        self.leaf()?;
        let raw = self.db.get(backend, Some(&encode_key(key)?))?;
        decode_value(raw.as_deref(), self.ty)
    }

    pub fn set(&self, backend: &mut dyn KvBackend, key: &Value, value: &Value) -> ScoreResult<()> {
        self.leaf()?;
        let value = encode_value(value)?;
        self.db.put(backend, Some(&encode_key(key)?), &value)
    }

    pub fn remove(&self, backend: &mut dyn KvBackend, key: &Value) -> ScoreResult<()> {
        self.leaf()?;
        self.db.delete(backend, Some(&encode_key(key)?))
    }

    pub fn contains(&self, backend: &mut dyn KvBackend, key: &Value) -> ScoreResult<bool> {
        Ok(self.db.get(backend, Some(&encode_key(key)?))?.is_some())
    }
}

/// Append-ordered list with its length kept in a dedicated cell.
#[derive(Debug, Clone)]
pub struct ArrayDb {
    db: ScoreDatabase,
    ty: ValueType,
}

impl ArrayDb {
    pub fn new(key: impl Into<Value>, parent: &ScoreDatabase, ty: ValueType) -> ScoreResult<Self> {
        let db = parent.sub_db(&encode_key(&key.into())?, Some(ARRAY_DB_ID));
        Ok(Self { db, ty })
    }

    pub fn len(&self, backend: &mut dyn KvBackend) -> ScoreResult<BigInt> {
        let raw = self.db.get(backend, None)?;
        match decode_value(raw.as_deref(), ValueType::Int)? {
            Value::Int(size) => Ok(size),
            _ => Ok(BigInt::zero()),
        }
    }

    pub fn is_empty(&self, backend: &mut dyn KvBackend) -> ScoreResult<bool> {
        Ok(self.len(backend)?.is_zero())
    }

    fn set_len(&self, backend: &mut dyn KvBackend, size: &BigInt) -> ScoreResult<()> {
        self.db.put(backend, None, &int_to_bytes(size))
    }

    fn slot(index: &BigInt) -> Vec<u8> {
        int_to_bytes(index)
    }

    fn resolve(index: &BigInt, size: &BigInt) -> ScoreResult<BigInt> {
        let idx = if index.is_negative() { index + size } else { index.clone() };
        if idx.is_negative() || &idx >= size {
            return Err(ScoreError::OutOfRange {
                index: index.clone(),
                size: size.clone(),
            });
        }
        Ok(idx)
    }

    pub fn put(&self, backend: &mut dyn KvBackend, value: &Value) -> ScoreResult<()> {
        let size = self.len(backend)?;
        let encoded = encode_value(value)?;
        self.db.put(backend, Some(&Self::slot(&size)), &encoded)?;
        self.set_len(backend, &(size + 1))
    }

    /// Remove and return the last element, or `Nil` when empty.
    pub fn pop(&self, backend: &mut dyn KvBackend) -> ScoreResult<Value> {
        let size = self.len(backend)?;
        if size.is_zero() {
            return Ok(Value::Nil);
        }
        let last = size - 1;
        let raw = self.db.get(backend, Some(&Self::slot(&last)))?;
        let value = decode_value(raw.as_deref(), self.ty)?;
        self.db.delete(backend, Some(&Self::slot(&last)))?;
        self.set_len(backend, &last)?;
        Ok(value)
    }

    pub fn get(&self, backend: &mut dyn KvBackend, index: &BigInt) -> ScoreResult<Value> {
        let size = self.len(backend)?;
        self.get_sized(backend, index, &size)
    }

    fn get_sized(&self, backend: &mut dyn KvBackend, index: &BigInt, size: &BigInt) -> ScoreResult<Value> {
        let idx = Self::resolve(index, size)?;
        let raw = self.db.get(backend, Some(&Self::slot(&idx)))?;
        decode_value(raw.as_deref(), self.ty)
    }

    pub fn set(&self, backend: &mut dyn KvBackend, index: &BigInt, value: &Value) -> ScoreResult<()> {
        let size = self.len(backend)?;
        let idx = Self::resolve(index, &size)?;
        let encoded = encode_value(value)?;
        self.db.put(backend, Some(&Self::slot(&idx)), &encoded)
    }

    /// Read every element in order.
    pub fn to_vec(&self, backend: &mut dyn KvBackend) -> ScoreResult<Vec<Value>> {
        let size = self.len(backend)?;
        let count = size.to_u64().unwrap_or(0);
        let mut out = Vec::with_capacity(count.min(1024) as usize);
        for i in 0..count {
            out.push(self.get_sized(backend, &BigInt::from(i), &size)?);
        }
        Ok(out)
    }

    /// Membership test. Items of the declared type go through the backend's
    /// host-side scan when available; anything else is compared element-wise.
    pub fn contains(&self, backend: &mut dyn KvBackend, item: &Value) -> ScoreResult<bool> {
        if self.ty.matches(item) {
            let size = self.len(backend)?;
            if size.is_zero() {
                return Ok(false);
            }
            let limit = size.to_u64().unwrap_or(u64::MAX);
            if let Some(found) = self.db.contains(backend, &encode_value(item)?, limit)? {
                return Ok(found);
            }
            for i in 0..limit {
                if &self.get_sized(backend, &BigInt::from(i), &size)? == item {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
        Ok(self.to_vec(backend)?.iter().any(|e| e == item))
    }
}
