//! State records and their stable byte encoding.

mod account;
mod candidate;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StateResult;

pub use account::Account;
pub use candidate::{Candidate, CandidateList};

/// Encodes a state record to its fixed storage format.
pub fn serialize_state<T: Serialize>(state: &T) -> StateResult<Vec<u8>> {
    Ok(bincode::serialize(state)?)
}

/// Decodes a state record from its storage format.
pub fn deserialize_state<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    Ok(bincode::deserialize(bytes)?)
}
