//! Trie node model and path helpers.
//!
//! Nodes are content-addressed: each serialized node is stored in the
//! key-value backend under its own hash, and parents reference children by
//! hash. Paths are nibble sequences (two nibbles per key byte).

use serde::{Deserialize, Serialize};

use crate::error::StateResult;
use crate::types::{hash256, Hash256};

/// A node of the Merkle Patricia trie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// Terminal node holding a value under the remaining path.
    Leaf {
        /// Remaining nibble path below the parent.
        path: Vec<u8>,
        /// The stored value.
        value: Vec<u8>,
    },
    /// Path compression: a shared nibble prefix pointing at one child.
    Extension {
        /// The shared nibble prefix.
        path: Vec<u8>,
        /// Hash of the child node.
        next: Hash256,
    },
    /// Sixteen-way fan-out, one slot per nibble.
    Branch {
        /// Child hashes indexed by nibble.
        children: [Option<Hash256>; 16],
        /// Value terminating exactly at this node, if any.
        value: Option<Vec<u8>>,
    },
}

impl Node {
    /// Serializes the node to its storage encoding.
    pub fn to_bytes(&self) -> StateResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a node from its storage encoding.
    pub fn from_bytes(bytes: &[u8]) -> StateResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// The node's content hash, its key in the backing store.
    pub fn hash(&self) -> StateResult<Hash256> {
        Ok(hash256(&self.to_bytes()?))
    }
}

/// Expands key bytes into nibbles, high nibble first.
pub fn to_nibbles(key: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(key.len() * 2);
    for byte in key {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    nibbles
}

/// Length of the common nibble prefix of `a` and `b`.
pub fn common_prefix_length(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
