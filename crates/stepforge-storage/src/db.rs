use crate::backend::KvBackend;
use crate::key::rlp_encode_bytes;
use num_bigint::BigInt;
use stepforge_crypto::sha3_256;
use stepforge_types::{int_to_bytes, Address, ScoreResult};
use tracing::trace;

/// Key namespace of one contract, optionally narrowed by a container tag
/// and an accumulated prefix of nested sub-store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreDatabase {
    address: Address,
    namespace: Vec<u8>,
    tag: Option<Vec<u8>>,
    prefix: Option<Vec<u8>>,
}

impl ScoreDatabase {
    pub fn new(address: &Address) -> Self {
        Self {
            address: address.clone(),
            namespace: rlp_encode_bytes(&address.to_canonical_bytes()),
            tag: None,
            prefix: None,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Narrow the namespace by `prefix`. The first tagged sub-store fixes the
    /// tag (tag byte followed by the encoded prefix); later sub-stores inherit
    /// it and extend the prefix.
    pub fn sub_db(&self, prefix: &[u8], tag: Option<u8>) -> Self {
        let encoded = rlp_encode_bytes(prefix);
        let (tag, prefix) = match (tag, &self.tag) {
            (Some(t), None) => {
                let mut composed = vec![t];
                composed.extend_from_slice(&encoded);
                (Some(composed), self.prefix.clone())
            }
            _ => {
                let mut composed = self.prefix.clone().unwrap_or_default();
                composed.extend_from_slice(&encoded);
                (self.tag.clone(), Some(composed))
            }
        };
        Self {
            address: self.address.clone(),
            namespace: self.namespace.clone(),
            tag,
            prefix,
        }
    }

    /// Unhashed physical key: namespace, tag, prefix and the encoded leaf key.
    pub fn composed_key(&self, key: Option<&[u8]>) -> Vec<u8> {
        let mut out = self.namespace.clone();
        if let Some(tag) = &self.tag {
            out.extend_from_slice(tag);
        }
        if let Some(prefix) = &self.prefix {
            out.extend_from_slice(prefix);
        }
        if let Some(key) = key {
            out.extend_from_slice(&rlp_encode_bytes(key));
        }
        out
    }

    pub fn hash_key(&self, key: Option<&[u8]>) -> Vec<u8> {
        sha3_256(&self.composed_key(key)).to_vec()
    }

    pub fn get(&self, backend: &mut dyn KvBackend, key: Option<&[u8]>) -> ScoreResult<Option<Vec<u8>>> {
        backend.get(&self.hash_key(key))
    }

    pub fn put(&self, backend: &mut dyn KvBackend, key: Option<&[u8]>, value: &[u8]) -> ScoreResult<()> {
        trace!(score = %self.address, size = value.len(), "put");
        backend.put(&self.hash_key(key), value)
    }

    pub fn delete(&self, backend: &mut dyn KvBackend, key: Option<&[u8]>) -> ScoreResult<()> {
        trace!(score = %self.address, "delete");
        backend.delete(&self.hash_key(key))
    }

    /// Host-side membership scan over this namespace's first `limit` array slots.
    pub fn contains(&self, backend: &mut dyn KvBackend, value: &[u8], limit: u64) -> ScoreResult<Option<bool>> {
        backend.contains(&self.composed_key(None), value, limit)
    }
}

/// Physical key of array slot `index` under an unhashed `prefix`.
pub fn array_element_key(prefix: &[u8], index: u64) -> Vec<u8> {
    let mut composed = prefix.to_vec();
    composed.extend_from_slice(&rlp_encode_bytes(&int_to_bytes(&BigInt::from(index))));
    sha3_256(&composed).to_vec()
}
