//! Candidate pool records and their snapshot encoding.

use std::collections::HashMap;

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::address::address_to_pkhash;
use crate::error::StateResult;
use crate::state::{deserialize_state, serialize_state};
use crate::types::PKHash;

/// A self-nominated account eligible for consensus selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// The candidate's address.
    pub address: String,
    /// The candidate's public key bytes.
    pub public_key: Vec<u8>,
    /// Current vote total: voting weight plus own balance when self-voted.
    pub votes: BigInt,
    /// Block height of the self-nomination.
    pub creation_height: u64,
    /// Block height of the last vote-total update.
    pub last_update_height: u64,
}

/// An ordered candidate snapshot.
///
/// Snapshots are sorted by `(votes DESC, address ASC)` before serialization
/// so the persisted bytes are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateList(pub Vec<Candidate>);

impl CandidateList {
    /// Sorts entries into snapshot order.
    pub fn sort(&mut self) {
        self.0
            .sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.address.cmp(&b.address)));
    }

    /// Serializes the list; callers sort first.
    pub fn serialize(&self) -> StateResult<Vec<u8>> {
        serialize_state(self)
    }

    /// Decodes a snapshot.
    pub fn deserialize(bytes: &[u8]) -> StateResult<Self> {
        deserialize_state(bytes)
    }

    /// Builds a sorted list from the working set's candidate map.
    pub fn from_map(map: &HashMap<PKHash, Candidate>) -> Self {
        let mut list = Self(map.values().cloned().collect());
        list.sort();
        list
    }

    /// Converts the list into a map keyed by each candidate's key hash.
    pub fn into_map(self) -> StateResult<HashMap<PKHash, Candidate>> {
        let mut map = HashMap::with_capacity(self.0.len());
        for candidate in self.0 {
            let pk_hash = address_to_pkhash(&candidate.address)?;
            map.insert(pk_hash, candidate);
        }
        Ok(map)
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no candidates are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
