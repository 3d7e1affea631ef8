use crate::db::array_element_key;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use stepforge_types::{ScoreError, ScoreResult};

/// Physical key-value access for one contract execution.
///
/// Keys handed to a backend are already hashed.
pub trait KvBackend {
    fn get(&mut self, key: &[u8]) -> ScoreResult<Option<Vec<u8>>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> ScoreResult<()>;

    fn delete(&mut self, key: &[u8]) -> ScoreResult<()>;

    /// Membership scan over the first `limit` elements of the array whose
    /// unhashed key prefix is `prefix`. `Ok(None)` means the backend cannot
    /// scan and the caller has to fall back to element-wise reads.
    fn contains(&mut self, prefix: &[u8], value: &[u8], limit: u64) -> ScoreResult<Option<bool>> {
        let _ = (prefix, value, limit);
        Ok(None)
    }
}

/// Store of the API introspection sentinel. Every access is rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyBackend;

impl KvBackend for DummyBackend {
    fn get(&mut self, _key: &[u8]) -> ScoreResult<Option<Vec<u8>>> {
        Err(ScoreError::access_denied("No permission"))
    }

    fn put(&mut self, _key: &[u8], _value: &[u8]) -> ScoreResult<()> {
        Err(ScoreError::access_denied("No permission"))
    }

    fn delete(&mut self, _key: &[u8]) -> ScoreResult<()> {
        Err(ScoreError::access_denied("No permission"))
    }

    fn contains(&mut self, _prefix: &[u8], _value: &[u8], _limit: u64) -> ScoreResult<Option<bool>> {
        Err(ScoreError::access_denied("No permission"))
    }
}

/// Shared in-memory store used by tools and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn raw_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Apply a write and report the previous value's size, as the host does
    /// when acknowledging a tracked SETVALUE.
    pub fn apply(&self, key: &[u8], value: Option<&[u8]>) -> Option<usize> {
        let mut data = self.data.write();
        let old = match value {
            Some(v) => data.insert(key.to_vec(), v.to_vec()),
            None => data.remove(key),
        };
        old.map(|v| v.len())
    }

    /// Scan helper shared with simulated hosts: `(found, entries, bytes)`.
    pub fn scan(&self, prefix: &[u8], value: &[u8], limit: u64) -> (bool, u64, u64) {
        let data = self.data.read();
        let mut size = 0u64;
        for i in 0..limit {
            if let Some(v) = data.get(&array_element_key(prefix, i)) {
                size += v.len() as u64;
                if v.as_slice() == value {
                    return (true, i + 1, size);
                }
            }
        }
        (false, limit, size)
    }
}

impl KvBackend for MemoryBackend {
    fn get(&mut self, key: &[u8]) -> ScoreResult<Option<Vec<u8>>> {
        Ok(self.raw_get(key))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> ScoreResult<()> {
        self.apply(key, Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> ScoreResult<()> {
        self.apply(key, None);
        Ok(())
    }

    fn contains(&mut self, prefix: &[u8], value: &[u8], limit: u64) -> ScoreResult<Option<bool>> {
        Ok(Some(self.scan(prefix, value, limit).0))
    }
}
