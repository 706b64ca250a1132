//! Block actions, receipts, and the action-handler seam.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::state::serialize_state;
use crate::types::{hash256, Hash256};
use crate::working_set::{RunContext, WorkingSet};

/// Base intrinsic gas of a transfer.
pub const TRANSFER_BASE_GAS: u64 = 10_000;
/// Intrinsic gas per byte of transfer payload.
pub const TRANSFER_PAYLOAD_GAS: u64 = 100;
/// Intrinsic gas of a vote.
pub const VOTE_GAS: u64 = 10_000;

/// A value transfer between two accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Sender address; empty for coinbase transfers.
    pub sender: String,
    /// Recipient address.
    pub recipient: String,
    /// Amount moved.
    pub amount: BigInt,
    /// Sender nonce.
    pub nonce: u64,
    /// Price per unit of gas.
    pub gas_price: BigInt,
    /// Attached payload bytes.
    pub payload: Vec<u8>,
    /// Block-producer reward transfer; carries no sender debit.
    pub coinbase: bool,
    /// Whether the recipient is a contract.
    pub to_contract: bool,
}

impl Transfer {
    /// True for block-producer reward transfers.
    pub fn is_coinbase(&self) -> bool {
        self.coinbase
    }

    /// True when the transfer targets a contract and is left to the
    /// execution layer.
    pub fn is_contract(&self) -> bool {
        self.to_contract
    }

    /// Fixed gas charge for the transfer's shape.
    pub fn intrinsic_gas(&self) -> StateResult<u64> {
        let payload_gas = TRANSFER_PAYLOAD_GAS
            .checked_mul(self.payload.len() as u64)
            .and_then(|gas| gas.checked_add(TRANSFER_BASE_GAS));
        payload_gas.ok_or_else(|| {
            StateError::out_of_gas(format!(
                "transfer payload of {} bytes overflows intrinsic gas",
                self.payload.len()
            ))
        })
    }
}

/// A vote delegating the voter's full balance to a votee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Voter address.
    pub voter: String,
    /// Votee address; empty revokes the current vote.
    pub votee: String,
    /// Voter nonce.
    pub nonce: u64,
    /// Price per unit of gas.
    pub gas_price: BigInt,
    /// Voter public key, carried into the candidate record on
    /// self-nomination.
    pub voter_public_key: Vec<u8>,
}

impl Vote {
    /// Fixed gas charge for a vote.
    pub fn intrinsic_gas(&self) -> StateResult<u64> {
        Ok(VOTE_GAS)
    }
}

/// A contract execution request; interpreted outside this crate, the
/// working set only tracks the executor's nonce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Executor address.
    pub executor: String,
    /// Target contract address; empty deploys a new contract.
    pub contract: String,
    /// Amount transferred along with the call.
    pub amount: BigInt,
    /// Executor nonce.
    pub nonce: u64,
    /// Price per unit of gas.
    pub gas_price: BigInt,
    /// Call data.
    pub data: Vec<u8>,
}

/// One action of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Value transfer.
    Transfer(Transfer),
    /// Vote delegation.
    Vote(Vote),
    /// Contract execution.
    Execution(Execution),
}

impl Action {
    /// Content hash identifying the action.
    pub fn hash(&self) -> Hash256 {
        // serialization of the enum is infallible for these field types
        let bytes = serialize_state(self).unwrap_or_default();
        hash256(&bytes)
    }

    /// The action's nonce.
    pub fn nonce(&self) -> u64 {
        match self {
            Action::Transfer(t) => t.nonce,
            Action::Vote(v) => v.nonce,
            Action::Execution(e) => e.nonce,
        }
    }

    /// The originating address.
    pub fn src_addr(&self) -> &str {
        match self {
            Action::Transfer(t) => &t.sender,
            Action::Vote(v) => &v.voter,
            Action::Execution(e) => &e.executor,
        }
    }
}

/// Splits actions by kind, preserving input order within each kind.
pub fn classify_actions(actions: &[Action]) -> (Vec<&Transfer>, Vec<&Vote>, Vec<&Execution>) {
    let mut transfers = Vec::new();
    let mut votes = Vec::new();
    let mut executions = Vec::new();
    for action in actions {
        match action {
            Action::Transfer(t) => transfers.push(t),
            Action::Vote(v) => votes.push(v),
            Action::Execution(e) => executions.push(e),
        }
    }
    (transfers, votes, executions)
}

/// The outcome a handler reports for an action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Hash of the handled action.
    pub action_hash: Hash256,
    /// Execution status code.
    pub status: u64,
    /// Raw return value.
    pub return_value: Vec<u8>,
    /// Gas consumed by the handler.
    pub gas_consumed: u64,
    /// Address of a deployed contract, when applicable.
    pub contract_address: String,
}

/// Protocol extension point invoked for every action of a block.
///
/// Handlers may mutate the working set through its public API. Returning
/// `Ok(None)` means the handler does not care about the action.
pub trait ActionHandler: Send + Sync {
    /// Handles one action against the working set.
    fn handle(
        &self,
        ctx: &RunContext,
        action: &Action,
        ws: &mut WorkingSet,
    ) -> StateResult<Option<Receipt>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_preserves_order() {
        let actions = vec![
            Action::Vote(Vote {
                voter: "v1".into(),
                ..Vote::default()
            }),
            Action::Transfer(Transfer {
                sender: "t1".into(),
                ..Transfer::default()
            }),
            Action::Vote(Vote {
                voter: "v2".into(),
                ..Vote::default()
            }),
            Action::Execution(Execution {
                executor: "e1".into(),
                ..Execution::default()
            }),
        ];
        let (transfers, votes, executions) = classify_actions(&actions);
        assert_eq!(transfers.len(), 1);
        assert_eq!(votes.iter().map(|v| v.voter.as_str()).collect::<Vec<_>>(), ["v1", "v2"]);
        assert_eq!(executions.len(), 1);
    }

    #[test]
    fn test_transfer_intrinsic_gas() {
        let mut transfer = Transfer::default();
        assert_eq!(transfer.intrinsic_gas().unwrap(), TRANSFER_BASE_GAS);
        transfer.payload = vec![0u8; 10];
        assert_eq!(
            transfer.intrinsic_gas().unwrap(),
            TRANSFER_BASE_GAS + 10 * TRANSFER_PAYLOAD_GAS
        );
    }

    #[test]
    fn test_action_hash_distinguishes_actions() {
        let a = Action::Transfer(Transfer {
            nonce: 1,
            ..Transfer::default()
        });
        let b = Action::Transfer(Transfer {
            nonce: 2,
            ..Transfer::default()
        });
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }
}
