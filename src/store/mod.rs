//! Layered transactional key-value storage.
//!
//! The layers, bottom up:
//!
//! - [`KvStore`]: namespaced durable store with atomic batch commit, backed
//!   by memory ([`MemoryStore`]) or an embedded B+-tree ([`RedbStore`]).
//! - [`WriteBatch`]: ordered write-ahead log of pending ops.
//! - [`CachedBatch`]: the log plus a read-your-writes overlay, shared by
//!   every trie of a working set through [`SharedBatch`].

mod batch;
mod cached_batch;
mod file;
mod memory;
mod traits;

pub use batch::{WriteBatch, WriteKind, WriteOp};
pub use cached_batch::{CachedBatch, SharedBatch};
pub use file::RedbStore;
pub use memory::MemoryStore;
pub use traits::KvStore;
