//! Write batch with a read-your-writes overlay.
//!
//! [`CachedBatch`] pairs the ordered op log with an in-memory overlay keyed
//! by `(namespace, key)`. The overlay always reflects the cumulative effect
//! of the log: a `get` returns the value of the last op touching the key, or
//! the not-found sentinel when the last op was a delete (tombstone) or no op
//! exists. The overlay never consults the backing store; a `put_if_absent`
//! that only collides with durable data is detected at commit time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{StateError, StateResult};
use crate::store::batch::{WriteBatch, WriteOp};

/// Overlay key: namespace plus raw key bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    namespace: String,
    key: Vec<u8>,
}

impl CacheKey {
    fn new(namespace: &str, key: &[u8]) -> Self {
        Self {
            namespace: namespace.to_string(),
            key: key.to_vec(),
        }
    }
}

/// Ordered write log plus overlay cache.
#[derive(Debug, Default)]
pub struct CachedBatch {
    batch: WriteBatch,
    // None is a tombstone left by a delete.
    overlay: HashMap<CacheKey, Option<Vec<u8>>>,
}

/// Shared handle to one [`CachedBatch`].
///
/// Every trie in a working set writes through the same batch; the working
/// set is the single logical writer, the lock only makes the aliased handle
/// safe to hold from several owners.
pub type SharedBatch = Arc<RwLock<CachedBatch>>;

impl CachedBatch {
    /// Creates an empty cached batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps this batch in a shared handle.
    pub fn into_shared(self) -> SharedBatch {
        Arc::new(RwLock::new(self))
    }

    /// Appends an unconditional put and updates the overlay.
    pub fn put(
        &mut self,
        namespace: &str,
        key: &[u8],
        value: &[u8],
        context: impl Into<String>,
    ) {
        self.batch.put(namespace, key, value, context);
        self.overlay
            .insert(CacheKey::new(namespace, key), Some(value.to_vec()));
    }

    /// Appends an atomic create.
    ///
    /// Fails immediately with the already-exists sentinel when the overlay
    /// holds a live value for the key. A key that is absent here but present
    /// in the backing store is accepted; that collision surfaces from
    /// `KvStore::commit`.
    pub fn put_if_absent(
        &mut self,
        namespace: &str,
        key: &[u8],
        value: &[u8],
        context: impl Into<String>,
    ) -> StateResult<()> {
        let cache_key = CacheKey::new(namespace, key);
        if let Some(Some(_)) = self.overlay.get(&cache_key) {
            return Err(StateError::already_exists(format!(
                "{namespace}/{}",
                hex::encode(key)
            )));
        }
        self.batch.put_if_absent(namespace, key, value, context);
        self.overlay.insert(cache_key, Some(value.to_vec()));
        Ok(())
    }

    /// Appends a delete and installs a tombstone.
    pub fn delete(&mut self, namespace: &str, key: &[u8], context: impl Into<String>) {
        self.batch.delete(namespace, key, context);
        self.overlay.insert(CacheKey::new(namespace, key), None);
    }

    /// Reads the key's value from the overlay only.
    pub fn get(&self, namespace: &str, key: &[u8]) -> StateResult<Vec<u8>> {
        match self.overlay.get(&CacheKey::new(namespace, key)) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) | None => Err(StateError::not_found(format!(
                "{namespace}/{}",
                hex::encode(key)
            ))),
        }
    }

    /// Empties both the op log and the overlay.
    pub fn clear(&mut self) {
        self.batch.clear();
        self.overlay.clear();
    }

    /// Number of pending ops.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// True when no ops are pending.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// The op at `index`, in append order.
    pub fn entry(&self, index: usize) -> StateResult<&WriteOp> {
        self.batch.entry(index)
    }

    /// The underlying ordered op log, for committing.
    pub fn batch(&self) -> &WriteBatch {
        &self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::batch::WriteKind;

    #[test]
    fn test_get_reflects_last_write() {
        let mut cb = CachedBatch::new();
        cb.put("ns1", b"k1", b"v1", "");
        assert_eq!(cb.get("ns1", b"k1").unwrap(), b"v1");

        cb.put("ns1", b"k1", b"v2", "");
        assert_eq!(cb.get("ns1", b"k1").unwrap(), b"v2");
        // log keeps both writes in order
        assert_eq!(cb.len(), 2);
    }

    #[test]
    fn test_delete_installs_tombstone() {
        let mut cb = CachedBatch::new();
        cb.put("ns1", b"k1", b"v1", "");
        cb.delete("ns1", b"k1", "");
        let err = cb.get("ns1", b"k1").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_put_if_absent_rejects_live_entry_only() {
        let mut cb = CachedBatch::new();
        cb.put("ns1", b"k1", b"v1", "");
        let err = cb.put_if_absent("ns1", b"k1", b"v2", "").unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(cb.get("ns1", b"k1").unwrap(), b"v1");

        // same key under another namespace is a different entry
        cb.put_if_absent("ns2", b"k1", b"v1", "").unwrap();

        // a tombstoned key is free again
        cb.delete("ns1", b"k1", "");
        cb.put_if_absent("ns1", b"k1", b"v3", "").unwrap();
        assert_eq!(cb.get("ns1", b"k1").unwrap(), b"v3");
    }

    #[test]
    fn test_entry_inspection() {
        let mut cb = CachedBatch::new();
        cb.put("b1", b"k1", b"v1", "");
        cb.delete("b1", b"k2", "");
        cb.delete("b1", b"k1", "");
        cb.put_if_absent("b1", b"k1", b"v1", "").unwrap();

        let op = cb.entry(1).unwrap();
        assert_eq!(op.namespace(), "b1");
        assert_eq!(op.key(), b"k2");
        assert_eq!(op.value(), b"");
        assert_eq!(op.kind(), WriteKind::Delete);

        let op = cb.entry(3).unwrap();
        assert_eq!(op.key(), b"k1");
        assert_eq!(op.value(), b"v1");
        assert_eq!(op.kind(), WriteKind::PutIfAbsent);
    }

    #[test]
    fn test_clear_empties_log_and_overlay() {
        let mut cb = CachedBatch::new();
        cb.put("ns1", b"k1", b"v1", "");
        cb.clear();
        assert!(cb.is_empty());
        assert!(cb.get("ns1", b"k1").unwrap_err().is_not_found());
        // after clear the key is free for an atomic create again
        cb.put_if_absent("ns1", b"k1", b"v1", "").unwrap();
    }
}
