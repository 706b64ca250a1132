//! In-memory store backend.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{StateError, StateResult};
use crate::store::batch::{WriteBatch, WriteKind};
use crate::store::traits::KvStore;

type Buckets = HashMap<String, HashMap<Vec<u8>, Vec<u8>>>;

/// A [`KvStore`] backed by nested hash maps, one per namespace.
///
/// Commit atomicity comes from replaying the batch onto a copy of the
/// buckets and swapping the copy in only when every op succeeded, so a
/// failure mid-replay leaves the visible store unchanged.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<Buckets>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(buckets: &mut Buckets, batch: &WriteBatch) -> StateResult<()> {
        for op in batch.iter() {
            let bucket = buckets.entry(op.namespace().to_string()).or_default();
            match op.kind() {
                WriteKind::Put => {
                    bucket.insert(op.key().to_vec(), op.value().to_vec());
                }
                WriteKind::PutIfAbsent => {
                    if bucket.contains_key(op.key()) {
                        return Err(StateError::already_exists(op.context().to_string()));
                    }
                    bucket.insert(op.key().to_vec(), op.value().to_vec());
                }
                WriteKind::Delete => {
                    bucket.remove(op.key());
                }
            }
        }
        Ok(())
    }
}

impl KvStore for MemoryStore {
    fn start(&self) -> StateResult<()> {
        Ok(())
    }

    fn stop(&self) -> StateResult<()> {
        Ok(())
    }

    fn put(&self, namespace: &str, key: &[u8], value: &[u8]) -> StateResult<()> {
        self.buckets
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_if_absent(&self, namespace: &str, key: &[u8], value: &[u8]) -> StateResult<()> {
        let mut buckets = self.buckets.write();
        let bucket = buckets.entry(namespace.to_string()).or_default();
        if bucket.contains_key(key) {
            return Err(StateError::already_exists(format!(
                "{namespace}/{}",
                hex::encode(key)
            )));
        }
        bucket.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, namespace: &str, key: &[u8]) -> StateResult<Vec<u8>> {
        self.buckets
            .read()
            .get(namespace)
            .and_then(|bucket| bucket.get(key))
            .cloned()
            .ok_or_else(|| StateError::not_found(format!("{namespace}/{}", hex::encode(key))))
    }

    fn delete(&self, namespace: &str, key: &[u8]) -> StateResult<()> {
        if let Some(bucket) = self.buckets.write().get_mut(namespace) {
            bucket.remove(key);
        }
        Ok(())
    }

    fn commit(&self, batch: &WriteBatch) -> StateResult<()> {
        let mut buckets = self.buckets.write();
        let mut staged = buckets.clone();
        Self::apply(&mut staged, batch)?;
        *buckets = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put("ns1", b"key", b"value").unwrap();
        assert_eq!(store.get("ns1", b"key").unwrap(), b"value");

        assert!(store.get("ns_missing", b"key").unwrap_err().is_not_found());
        assert!(store.get("ns1", b"missing").unwrap_err().is_not_found());

        store.delete("ns1", b"key").unwrap();
        assert!(store.get("ns1", b"key").unwrap_err().is_not_found());
        // deleting again is fine
        store.delete("ns1", b"key").unwrap();
    }

    #[test]
    fn test_put_if_absent() {
        let store = MemoryStore::new();
        store.put_if_absent("ns1", b"k", b"v1").unwrap();
        let err = store.put_if_absent("ns1", b"k", b"v2").unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.get("ns1", b"k").unwrap(), b"v1");
    }

    #[test]
    fn test_commit_applies_in_order() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put("ns1", b"k", b"v1", "");
        batch.delete("ns1", b"k", "");
        batch.put_if_absent("ns1", b"k", b"v2", "");
        store.commit(&batch).unwrap();
        assert_eq!(store.get("ns1", b"k").unwrap(), b"v2");
    }

    #[test]
    fn test_failed_commit_leaves_store_unchanged() {
        let store = MemoryStore::new();
        store.put("ns1", b"k1", b"old1").unwrap();
        store.put("ns1", b"k3", b"old3").unwrap();

        let mut batch = WriteBatch::new();
        batch.put("ns1", b"k1", b"new1", "");
        batch.put("ns1", b"k2", b"new2", "");
        batch.put_if_absent("ns1", b"k3", b"new3", "k3 collision");
        let err = store.commit(&batch).unwrap_err();
        assert!(err.is_already_exists());
        assert!(err.to_string().contains("k3 collision"));

        // nothing from the batch landed
        assert_eq!(store.get("ns1", b"k1").unwrap(), b"old1");
        assert!(store.get("ns1", b"k2").unwrap_err().is_not_found());
        assert_eq!(store.get("ns1", b"k3").unwrap(), b"old3");
    }
}
