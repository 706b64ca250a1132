//! Account state.

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};
use crate::types::Hash256;

/// The per-address state record kept in the account trie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Highest nonce observed for the address; monotonically non-decreasing.
    pub nonce: u64,
    /// Spendable balance; never negative.
    pub balance: BigInt,
    /// Vote weight delegated to this address by others.
    pub voting_weight: BigInt,
    /// Address this account has delegated its weight to; empty when unset,
    /// equal to the account's own address for candidates.
    pub votee: String,
    /// Whether the account has self-nominated.
    pub is_candidate: bool,
    /// Hash of the contract bytecode, zero for plain accounts.
    pub code_hash: Hash256,
    /// Root of the contract storage trie, zero for plain accounts.
    pub storage_root: Hash256,
}

impl Account {
    /// Creates an account with the given starting balance.
    pub fn with_balance(balance: BigInt) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Credits `amount` to the balance.
    pub fn add_balance(&mut self, amount: &BigInt) {
        self.balance += amount;
    }

    /// Debits `amount`, failing without mutation when it would drive the
    /// balance negative.
    pub fn sub_balance(&mut self, amount: &BigInt) -> StateResult<()> {
        if *amount > self.balance {
            return Err(StateError::not_enough_balance(format!(
                "balance {} cannot cover {}",
                self.balance, amount
            )));
        }
        self.balance -= amount;
        Ok(())
    }

    /// Raises the nonce to `nonce` when it is higher.
    pub fn bump_nonce(&mut self, nonce: u64) {
        if nonce > self.nonce {
            self.nonce = nonce;
        }
    }

    /// True when the account has never been credited.
    pub fn is_empty_balance(&self) -> bool {
        self.balance.is_zero()
    }
}
