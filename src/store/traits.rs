//! Storage trait for the namespaced key-value backends.

use crate::error::StateResult;
use crate::store::batch::WriteBatch;

/// Namespaced durable key-value store.
///
/// Implementations take `&self` and guard their interior so a store can be
/// shared as `Arc<dyn KvStore>` across a working set and its tries. A
/// [`commit`](KvStore::commit) applies the whole batch or none of it; after
/// a failed commit the caller must clear the batch before reusing it.
pub trait KvStore: Send + Sync {
    /// Acquires backing resources. Not required to be idempotent.
    fn start(&self) -> StateResult<()>;

    /// Releases backing resources, flushing pending writes.
    fn stop(&self) -> StateResult<()>;

    /// Unconditional write; creates the namespace if absent.
    fn put(&self, namespace: &str, key: &[u8], value: &[u8]) -> StateResult<()>;

    /// Atomic create; fails with the already-exists sentinel on collision.
    fn put_if_absent(&self, namespace: &str, key: &[u8], value: &[u8]) -> StateResult<()>;

    /// Reads a key; a missing namespace or key is the not-found sentinel.
    fn get(&self, namespace: &str, key: &[u8]) -> StateResult<Vec<u8>>;

    /// Removes a key; removing a missing key is not an error.
    fn delete(&self, namespace: &str, key: &[u8]) -> StateResult<()>;

    /// Applies every op of `batch` in append order under one transaction.
    ///
    /// Any failure (including a `put_if_absent` collision) rolls the whole
    /// transaction back and surfaces the failing op's error with its context
    /// string. The batch itself is left untouched either way.
    fn commit(&self, batch: &WriteBatch) -> StateResult<()>;
}
