//! Merkle Patricia trie over a namespaced key-value store.
//!
//! The trie reads through the shared batch's overlay first and the durable
//! store second, and stages every node it writes into that same batch, so a
//! working set's account trie and all of its contract tries commit together
//! in one transaction. [`Trie::root_hash`] always reflects the staged state.

mod node;

use std::sync::Arc;

use crate::error::{StateError, StateResult};
use crate::store::{KvStore, SharedBatch};
use crate::types::Hash256;

pub use node::{common_prefix_length, to_nibbles, Node};

/// Root hash of an empty trie: sha256 of the empty byte string.
pub const EMPTY_ROOT: Hash256 = Hash256::new([
    0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f, 0xb9,
    0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b, 0x78, 0x52,
    0xb8, 0x55,
]);

/// A Merkle Patricia trie bound to one namespace of a [`KvStore`], writing
/// through a [`SharedBatch`].
pub struct Trie {
    store: Arc<dyn KvStore>,
    batch: SharedBatch,
    namespace: String,
    root: Hash256,
}

impl Trie {
    /// Creates a trie over `(store, batch, namespace)` rooted at `root`.
    ///
    /// A zero root is normalized to [`EMPTY_ROOT`]. The root node is not
    /// resolved until [`start`](Self::start).
    pub fn new_shared(
        store: Arc<dyn KvStore>,
        batch: SharedBatch,
        namespace: &str,
        root: Hash256,
    ) -> Self {
        let root = if root.is_zero() { EMPTY_ROOT } else { root };
        Self {
            store,
            batch,
            namespace: namespace.to_string(),
            root,
        }
    }

    /// Resolves the root node, failing if a non-empty root is missing from
    /// both the overlay and the store.
    pub fn start(&self) -> StateResult<()> {
        if self.root == EMPTY_ROOT {
            return Ok(());
        }
        self.load_node(&self.root).map_err(|e| {
            StateError::not_found(format!(
                "failed to load trie root {} in {}: {e}",
                self.root, self.namespace
            ))
        })?;
        Ok(())
    }

    /// The current root hash; [`EMPTY_ROOT`] for an empty trie.
    pub fn root_hash(&self) -> Hash256 {
        self.root
    }

    /// Reads the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> StateResult<Vec<u8>> {
        let not_found =
            || StateError::not_found(format!("{}/{}", self.namespace, hex::encode(key)));
        if self.root == EMPTY_ROOT {
            return Err(not_found());
        }
        let nibbles = to_nibbles(key);
        let mut path: &[u8] = &nibbles;
        let mut hash = self.root;
        loop {
            match self.load_node(&hash)? {
                Node::Leaf {
                    path: leaf_path,
                    value,
                } => {
                    return if leaf_path == path {
                        Ok(value)
                    } else {
                        Err(not_found())
                    };
                }
                Node::Extension {
                    path: ext_path,
                    next,
                } => {
                    if path.starts_with(&ext_path) {
                        path = &path[ext_path.len()..];
                        hash = next;
                    } else {
                        return Err(not_found());
                    }
                }
                Node::Branch { children, value } => {
                    if path.is_empty() {
                        return value.ok_or_else(&not_found);
                    }
                    match children[path[0] as usize] {
                        Some(child) => {
                            hash = child;
                            path = &path[1..];
                        }
                        None => return Err(not_found()),
                    }
                }
            }
        }
    }

    /// Inserts or replaces the value under `key`, staging every new node
    /// into the shared batch and updating the root hash.
    pub fn upsert(&mut self, key: &[u8], value: &[u8]) -> StateResult<()> {
        let nibbles = to_nibbles(key);
        let current = if self.root == EMPTY_ROOT {
            None
        } else {
            Some(self.root)
        };
        self.root = self.insert_at(current, &nibbles, value)?;
        Ok(())
    }

    fn insert_at(
        &self,
        node_hash: Option<Hash256>,
        path: &[u8],
        value: &[u8],
    ) -> StateResult<Hash256> {
        let hash = match node_hash {
            None => {
                return self.store_node(&Node::Leaf {
                    path: path.to_vec(),
                    value: value.to_vec(),
                });
            }
            Some(hash) => hash,
        };
        match self.load_node(&hash)? {
            Node::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path == path {
                    return self.store_node(&Node::Leaf {
                        path: path.to_vec(),
                        value: value.to_vec(),
                    });
                }
                let common = common_prefix_length(&leaf_path, path);
                let mut children: [Option<Hash256>; 16] = Default::default();
                let mut branch_value = None;
                if common < leaf_path.len() {
                    let child = self.store_node(&Node::Leaf {
                        path: leaf_path[common + 1..].to_vec(),
                        value: leaf_value,
                    })?;
                    children[leaf_path[common] as usize] = Some(child);
                } else {
                    branch_value = Some(leaf_value);
                }
                if common < path.len() {
                    let child = self.store_node(&Node::Leaf {
                        path: path[common + 1..].to_vec(),
                        value: value.to_vec(),
                    })?;
                    children[path[common] as usize] = Some(child);
                } else {
                    branch_value = Some(value.to_vec());
                }
                let branch = self.store_node(&Node::Branch {
                    children,
                    value: branch_value,
                })?;
                self.wrap_extension(&path[..common], branch)
            }
            Node::Extension {
                path: ext_path,
                next,
            } => {
                let common = common_prefix_length(&ext_path, path);
                if common == ext_path.len() {
                    let new_next = self.insert_at(Some(next), &path[common..], value)?;
                    return self.store_node(&Node::Extension {
                        path: ext_path,
                        next: new_next,
                    });
                }
                let mut children: [Option<Hash256>; 16] = Default::default();
                let mut branch_value = None;
                let existing = if common + 1 < ext_path.len() {
                    self.store_node(&Node::Extension {
                        path: ext_path[common + 1..].to_vec(),
                        next,
                    })?
                } else {
                    next
                };
                children[ext_path[common] as usize] = Some(existing);
                if common < path.len() {
                    let child = self.store_node(&Node::Leaf {
                        path: path[common + 1..].to_vec(),
                        value: value.to_vec(),
                    })?;
                    children[path[common] as usize] = Some(child);
                } else {
                    branch_value = Some(value.to_vec());
                }
                let branch = self.store_node(&Node::Branch {
                    children,
                    value: branch_value,
                })?;
                self.wrap_extension(&path[..common], branch)
            }
            Node::Branch {
                mut children,
                value: branch_value,
            } => {
                if path.is_empty() {
                    return self.store_node(&Node::Branch {
                        children,
                        value: Some(value.to_vec()),
                    });
                }
                let index = path[0] as usize;
                let new_child = self.insert_at(children[index], &path[1..], value)?;
                children[index] = Some(new_child);
                self.store_node(&Node::Branch {
                    children,
                    value: branch_value,
                })
            }
        }
    }

    fn wrap_extension(&self, prefix: &[u8], child: Hash256) -> StateResult<Hash256> {
        if prefix.is_empty() {
            return Ok(child);
        }
        self.store_node(&Node::Extension {
            path: prefix.to_vec(),
            next: child,
        })
    }

    fn store_node(&self, node: &Node) -> StateResult<Hash256> {
        let bytes = node.to_bytes()?;
        let hash = node.hash()?;
        self.batch.write().put(
            &self.namespace,
            hash.as_bytes(),
            &bytes,
            "failed to store trie node",
        );
        Ok(hash)
    }

    fn load_node(&self, hash: &Hash256) -> StateResult<Node> {
        let staged = self.batch.read().get(&self.namespace, hash.as_bytes());
        let bytes = match staged {
            Ok(bytes) => bytes,
            Err(_) => self.store.get(&self.namespace, hash.as_bytes())?,
        };
        Node::from_bytes(&bytes)
    }
}
