//! # chainstate
//!
//! A transactional account-state engine for blockchain nodes.
//!
//! ## Crate purpose
//!
//! This crate is the single source of truth for applying a block's actions
//! to a Merkle-authenticated account store and committing the result
//! atomically. It provides:
//!
//! - **Storage**: a namespaced [`KvStore`] trait with in-memory
//!   ([`MemoryStore`]) and embedded B+-tree ([`RedbStore`]) backends
//! - **Batching**: an ordered [`WriteBatch`] and the read-your-writes
//!   [`CachedBatch`] overlay shared by every trie of a working set
//! - **Authentication**: a Merkle Patricia [`Trie`] whose writes ride the
//!   shared batch
//! - **State**: [`Account`] records, the [`Candidate`] pool, and their
//!   stable byte encodings
//! - **Execution**: the block-scoped [`WorkingSet`] with its deterministic
//!   transfer/vote/execution pipeline and the [`ActionHandler`] seam
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chainstate::{MemoryStore, RunContext, WorkingSet};
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut ws = WorkingSet::new(1, store, chainstate::Hash256::zero(), vec![])?;
//! let mut ctx = RunContext {
//!     producer_addr: producer.clone(),
//!     gas_limit: 1_000_000,
//!     enable_gas_charge: true,
//! };
//! let (root, receipts) = ws.run_actions(&mut ctx, height, &actions)?;
//! ws.commit()?;
//! ```

pub mod action;
pub mod address;
pub mod contract;
pub mod error;
pub mod state;
pub mod store;
pub mod trie;
pub mod types;
pub mod working_set;

// Re-exports
pub use action::{
    classify_actions, Action, ActionHandler, Execution, Receipt, Transfer, Vote,
    TRANSFER_BASE_GAS, TRANSFER_PAYLOAD_GAS, VOTE_GAS,
};
pub use address::{address_to_pkhash, pkhash_to_address};
pub use contract::Contract;
pub use error::{StateError, StateResult};
pub use state::{Account, Candidate, CandidateList};
pub use store::{CachedBatch, KvStore, MemoryStore, RedbStore, SharedBatch, WriteBatch, WriteKind, WriteOp};
pub use trie::{Trie, EMPTY_ROOT};
pub use types::{hash256, pkhash_of, u64_to_bytes, Hash256, PKHash};
pub use working_set::{
    RunContext, WorkingSet, ACCOUNT_TRIE_ROOT_KEY, CURRENT_HEIGHT_KEY, NS_ACCOUNT, NS_CANDIDATE,
    NS_CODE, NS_CONTRACT,
};
