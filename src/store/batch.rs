//! Ordered write-ahead batch.
//!
//! A [`WriteBatch`] is an append-only log of pending writes. Ordering is
//! preserved so replaying the batch against a store is deterministic; the
//! only way to shrink it is [`WriteBatch::clear`].

use crate::error::{StateError, StateResult};

/// The kind of a pending write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Unconditional write.
    Put,
    /// Atomic create; collides with a live entry.
    PutIfAbsent,
    /// Removal; deleting a missing key is not an error.
    Delete,
}

/// A single pending write against a namespaced store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    namespace: String,
    key: Vec<u8>,
    value: Vec<u8>,
    kind: WriteKind,
    context: String,
}

impl WriteOp {
    /// The target namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The target key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The value to write; empty for deletes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The write kind.
    pub fn kind(&self) -> WriteKind {
        self.kind
    }

    /// Human-readable context reported when this op fails to commit.
    pub fn context(&self) -> &str {
        &self.context
    }
}

/// Ordered sequence of [`WriteOp`]s.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an unconditional put.
    pub fn put(
        &mut self,
        namespace: &str,
        key: &[u8],
        value: &[u8],
        context: impl Into<String>,
    ) {
        self.ops.push(WriteOp {
            namespace: namespace.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
            kind: WriteKind::Put,
            context: context.into(),
        });
    }

    /// Appends an atomic create.
    pub fn put_if_absent(
        &mut self,
        namespace: &str,
        key: &[u8],
        value: &[u8],
        context: impl Into<String>,
    ) {
        self.ops.push(WriteOp {
            namespace: namespace.to_string(),
            key: key.to_vec(),
            value: value.to_vec(),
            kind: WriteKind::PutIfAbsent,
            context: context.into(),
        });
    }

    /// Appends a delete.
    pub fn delete(&mut self, namespace: &str, key: &[u8], context: impl Into<String>) {
        self.ops.push(WriteOp {
            namespace: namespace.to_string(),
            key: key.to_vec(),
            value: Vec::new(),
            kind: WriteKind::Delete,
            context: context.into(),
        });
    }

    /// Drops every pending op.
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Number of pending ops.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when no ops are pending.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The op at `index`, in append order.
    pub fn entry(&self, index: usize) -> StateResult<&WriteOp> {
        self.ops.get(index).ok_or_else(|| {
            StateError::invalid_operation(format!(
                "batch entry {index} out of range ({} ops)",
                self.ops.len()
            ))
        })
    }

    /// Iterates ops in append order.
    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }
}
