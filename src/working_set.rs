//! Block-scoped working set over the account trie.
//!
//! A working set stages every state change a block produces: account
//! mutations in `cached_states`, contract storage in `cached_contracts`,
//! the candidate pool in `cached_candidates`, and all trie writes in one
//! shared [`CachedBatch`]. [`WorkingSet::run_actions`] applies a block's
//! actions through the deterministic pipeline; [`WorkingSet::commit`] hands
//! the combined batch to the store in a single transaction.

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::Zero;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::action::{classify_actions, Action, ActionHandler, Receipt, Transfer, Vote};
use crate::address::address_to_pkhash;
use crate::contract::Contract;
use crate::error::{StateError, StateResult};
use crate::state::{deserialize_state, serialize_state, Account, Candidate, CandidateList};
use crate::store::{CachedBatch, KvStore, SharedBatch};
use crate::trie::{Trie, EMPTY_ROOT};
use crate::types::{u64_to_bytes, Hash256, PKHash};

/// Namespace for account trie nodes and chain pointers.
pub const NS_ACCOUNT: &str = "Account";
/// Namespace for contract storage trie nodes.
pub const NS_CONTRACT: &str = "Contract";
/// Namespace for contract bytecode, keyed by code hash.
pub const NS_CODE: &str = "Code";
/// Namespace for candidate snapshots, keyed by big-endian height.
pub const NS_CANDIDATE: &str = "Candidate";

/// Key of the persisted account-trie root within [`NS_ACCOUNT`].
pub const ACCOUNT_TRIE_ROOT_KEY: &[u8] = b"accountTrieRoot";
/// Key of the persisted chain height within [`NS_ACCOUNT`].
pub const CURRENT_HEIGHT_KEY: &[u8] = b"currentHeight";

/// Per-block parameters for [`WorkingSet::run_actions`].
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Address credited with gas fees.
    pub producer_addr: String,
    /// Remaining block gas; decremented as actions are charged.
    pub gas_limit: u64,
    /// Whether intrinsic gas is charged at all.
    pub enable_gas_charge: bool,
}

/// Block application phases of a working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Running,
    Finalized,
    Aborted,
}

/// Staging area for one block's state changes.
pub struct WorkingSet {
    version: u64,
    block_height: u64,
    phase: Phase,
    cached_states: HashMap<PKHash, Account>,
    cached_contracts: HashMap<PKHash, Contract>,
    cached_candidates: HashMap<PKHash, Candidate>,
    account_trie: Trie,
    batch: SharedBatch,
    store: Arc<dyn KvStore>,
    action_handlers: Vec<Arc<dyn ActionHandler>>,
}

impl WorkingSet {
    /// Creates a working set for the block after the one that produced
    /// `root`. Fails when the account trie cannot be materialized from the
    /// given root.
    pub fn new(
        version: u64,
        store: Arc<dyn KvStore>,
        root: Hash256,
        action_handlers: Vec<Arc<dyn ActionHandler>>,
    ) -> StateResult<Self> {
        let batch = CachedBatch::new().into_shared();
        let account_trie = Trie::new_shared(store.clone(), batch.clone(), NS_ACCOUNT, root);
        account_trie
            .start()
            .map_err(|e| e.wrap(format!("failed to load account trie from root {root}")))?;
        Ok(Self {
            version,
            block_height: 0,
            phase: Phase::Fresh,
            cached_states: HashMap::new(),
            cached_contracts: HashMap::new(),
            cached_candidates: HashMap::new(),
            account_trie,
            batch,
            store,
            action_handlers,
        })
    }

    /// The account trie's current root hash.
    pub fn root_hash(&self) -> Hash256 {
        self.account_trie.root_hash()
    }

    /// The working set's version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The height of the block being applied.
    pub fn height(&self) -> u64 {
        self.block_height
    }

    /// The staged candidate pool, keyed by address hash.
    pub fn candidates(&self) -> &HashMap<PKHash, Candidate> {
        &self.cached_candidates
    }

    // ------------------------------------------------------------------
    // account access
    // ------------------------------------------------------------------

    /// Reads a state record straight from the trie, bypassing the cache.
    pub fn state<T: DeserializeOwned>(&self, pk_hash: &PKHash) -> StateResult<T> {
        let bytes = self
            .account_trie
            .get(pk_hash.as_bytes())
            .map_err(|e| e.wrap(format!("no state under address hash {pk_hash}")))?;
        deserialize_state(&bytes)
    }

    /// Serializes a state record and upserts it into the trie; the write
    /// lands in the shared batch.
    pub fn put_state<T: Serialize>(&mut self, pk_hash: &PKHash, state: &T) -> StateResult<()> {
        let bytes = serialize_state(state)?;
        self.account_trie.upsert(pk_hash.as_bytes(), &bytes)
    }

    /// Returns the cached account for `pk_hash`, loading it from the trie
    /// on first access. Later mutations through the cache are visible to
    /// subsequent reads.
    pub fn cached_state(&mut self, pk_hash: &PKHash) -> StateResult<&Account> {
        self.ensure_cached(pk_hash)?;
        self.cached_states
            .get(pk_hash)
            .ok_or_else(|| StateError::not_found(format!("no cached state for {pk_hash}")))
    }

    /// Replaces the cached account for `pk_hash`.
    pub fn update_cached_state(&mut self, pk_hash: PKHash, account: Account) {
        self.cached_states.insert(pk_hash, account);
    }

    /// Loads an existing account or inserts a fresh one with `init`
    /// balance into the cache. The `init` value only applies on creation.
    pub fn load_or_create_account(&mut self, addr: &str, init: &BigInt) -> StateResult<PKHash> {
        let pk_hash = address_to_pkhash(addr)?;
        if !self.cached_states.contains_key(&pk_hash) {
            match self.state::<Account>(&pk_hash) {
                Ok(account) => {
                    self.cached_states.insert(pk_hash, account);
                }
                Err(e) if e.is_not_found() => {
                    self.cached_states
                        .insert(pk_hash, Account::with_balance(init.clone()));
                }
                Err(e) => {
                    return Err(e.wrap(format!("failed to load account of {addr}")));
                }
            }
        }
        Ok(pk_hash)
    }

    /// Nonce of the account as confirmed on chain.
    pub fn nonce(&self, addr: &str) -> StateResult<u64> {
        let pk_hash = address_to_pkhash(addr)?;
        let account: Account = self
            .state(&pk_hash)
            .map_err(|e| e.wrap(format!("failed to get account state of {addr}")))?;
        Ok(account.nonce)
    }

    /// The account as currently staged, whether it lives in the state
    /// cache or inside a materialized contract.
    pub fn cached_account(&mut self, addr: &str) -> StateResult<Account> {
        let pk_hash = address_to_pkhash(addr)?;
        if let Some(contract) = self.cached_contracts.get(&pk_hash) {
            return Ok(contract.self_state().clone());
        }
        Ok(self.cached_state(&pk_hash)?.clone())
    }

    fn ensure_cached(&mut self, pk_hash: &PKHash) -> StateResult<()> {
        if self.cached_states.contains_key(pk_hash) {
            return Ok(());
        }
        let account: Account = self.state(pk_hash)?;
        self.cached_states.insert(*pk_hash, account);
        Ok(())
    }

    fn account_mut(&mut self, pk_hash: &PKHash) -> StateResult<&mut Account> {
        self.cached_states
            .get_mut(pk_hash)
            .ok_or_else(|| StateError::not_found(format!("no cached state for {pk_hash}")))
    }

    // ------------------------------------------------------------------
    // contract access
    // ------------------------------------------------------------------

    /// Code hash of the contract at `pk_hash`.
    pub fn get_code_hash(&mut self, pk_hash: &PKHash) -> StateResult<Hash256> {
        if let Some(contract) = self.cached_contracts.get(pk_hash) {
            return Ok(contract.self_state().code_hash);
        }
        let code_hash = self
            .cached_state(pk_hash)
            .map_err(|e| e.wrap(format!("failed to get code hash of contract {pk_hash}")))?
            .code_hash;
        Ok(code_hash)
    }

    /// Bytecode of the contract at `pk_hash`.
    pub fn get_code(&mut self, pk_hash: &PKHash) -> StateResult<Vec<u8>> {
        if let Some(contract) = self.cached_contracts.get_mut(pk_hash) {
            return contract.get_code();
        }
        let code_hash = self
            .cached_state(pk_hash)
            .map_err(|e| e.wrap(format!("failed to get code of contract {pk_hash}")))?
            .code_hash;
        self.store.get(NS_CODE, code_hash.as_bytes())
    }

    /// Installs bytecode on the contract at `pk_hash`, materializing the
    /// contract if needed.
    pub fn set_code(&mut self, pk_hash: &PKHash, code: Vec<u8>) -> StateResult<()> {
        if let Some(contract) = self.cached_contracts.get_mut(pk_hash) {
            contract.set_code(code);
            return Ok(());
        }
        let contract = self
            .get_contract(pk_hash)
            .map_err(|e| e.wrap(format!("failed to set code of contract {pk_hash}")))?;
        contract.set_code(code);
        Ok(())
    }

    /// Reads a 32-byte storage slot of the contract at `pk_hash`.
    pub fn get_contract_state(
        &mut self,
        pk_hash: &PKHash,
        key: &Hash256,
    ) -> StateResult<Hash256> {
        if let Some(contract) = self.cached_contracts.get(pk_hash) {
            return Hash256::from_slice(&contract.get_state(key)?);
        }
        let value = self
            .get_contract(pk_hash)
            .map_err(|e| e.wrap(format!("failed to get storage of contract {pk_hash}")))?
            .get_state(key)?;
        Hash256::from_slice(&value)
    }

    /// Writes a 32-byte storage slot of the contract at `pk_hash`.
    pub fn set_contract_state(
        &mut self,
        pk_hash: &PKHash,
        key: &Hash256,
        value: &Hash256,
    ) -> StateResult<()> {
        if let Some(contract) = self.cached_contracts.get_mut(pk_hash) {
            return contract.set_state(key, value.as_bytes());
        }
        self.get_contract(pk_hash)
            .map_err(|e| e.wrap(format!("failed to set storage of contract {pk_hash}")))?
            .set_state(key, value.as_bytes())
    }

    /// Materializes the contract for `pk_hash`, transferring the account
    /// out of the state cache so a single owner holds it.
    fn get_contract(&mut self, pk_hash: &PKHash) -> StateResult<&mut Contract> {
        self.ensure_cached(pk_hash)?;
        let mut account = self
            .cached_states
            .remove(pk_hash)
            .ok_or_else(|| StateError::not_found(format!("no cached state for {pk_hash}")))?;
        if account.storage_root.is_zero() {
            account.storage_root = EMPTY_ROOT;
        }
        let trie = Trie::new_shared(
            self.store.clone(),
            self.batch.clone(),
            NS_CONTRACT,
            account.storage_root,
        );
        trie.start()
            .map_err(|e| e.wrap(format!("failed to open storage trie of contract {pk_hash}")))?;
        let contract = Contract::new(account, trie, self.store.clone(), self.batch.clone());
        Ok(self.cached_contracts.entry(*pk_hash).or_insert(contract))
    }

    // ------------------------------------------------------------------
    // block pipeline
    // ------------------------------------------------------------------

    /// Applies a block's actions and stages the finalization writes.
    ///
    /// Runs the phases strictly in order: transfers, votes, cached-state
    /// flush with candidate-pool maintenance, contract flush, execution
    /// nonce bumps, handler dispatch, then the three finalization writes
    /// (trie root, sorted candidate snapshot, current height). Any error
    /// aborts the working set; an aborted set cannot be committed.
    pub fn run_actions(
        &mut self,
        ctx: &mut RunContext,
        block_height: u64,
        actions: &[Action],
    ) -> StateResult<(Hash256, HashMap<Hash256, Receipt>)> {
        if self.phase != Phase::Fresh {
            return Err(StateError::invalid_operation(format!(
                "run_actions requires a fresh working set, found {:?}",
                self.phase
            )));
        }
        self.phase = Phase::Running;
        match self.run_actions_inner(ctx, block_height, actions) {
            Ok(out) => {
                self.phase = Phase::Finalized;
                Ok(out)
            }
            Err(e) => {
                self.phase = Phase::Aborted;
                Err(e)
            }
        }
    }

    fn run_actions_inner(
        &mut self,
        ctx: &mut RunContext,
        block_height: u64,
        actions: &[Action],
    ) -> StateResult<(Hash256, HashMap<Hash256, Receipt>)> {
        self.block_height = block_height;

        // recover the candidate pool from the previous block's snapshot
        if block_height > 0 && self.cached_candidates.is_empty() {
            match self.get_candidates(block_height - 1) {
                Ok(candidates) => {
                    self.cached_candidates = candidates.into_map()?;
                }
                Err(e) if e.is_not_found() => {
                    info!(height = block_height - 1, "no previous candidate snapshot");
                }
                Err(e) => return Err(e),
            }
        }

        if ctx.producer_addr.is_empty() {
            return Err(StateError::invalid_context(
                "missing block producer address",
            ));
        }
        let producer = self
            .load_or_create_account(&ctx.producer_addr, &BigInt::zero())
            .map_err(|e| {
                e.wrap(format!(
                    "failed to load account of block producer {}",
                    ctx.producer_addr
                ))
            })?;

        let (transfers, votes, executions) = classify_actions(actions);
        self.handle_transfers(producer, &transfers, ctx)
            .map_err(|e| e.wrap("failed to handle transfers"))?;
        self.handle_votes(producer, block_height, &votes, ctx)
            .map_err(|e| e.wrap("failed to handle votes"))?;

        // flush pending account changes to the trie and refresh the
        // candidate pool from the flushed states
        let mut state_addrs: Vec<PKHash> = self.cached_states.keys().copied().collect();
        state_addrs.sort();
        for pk_hash in state_addrs {
            let Some(account) = self.cached_states.get(&pk_hash).cloned() else {
                continue;
            };
            self.put_state(&pk_hash, &account)
                .map_err(|e| e.wrap("failed to flush account changes to trie"))?;
            if !account.is_candidate {
                self.cached_candidates.remove(&pk_hash);
                continue;
            }
            let mut total = account.voting_weight.clone();
            let votee_hash = address_to_pkhash(&account.votee)?;
            if votee_hash == pk_hash {
                total += &account.balance;
            }
            let candidate = self.cached_candidates.get_mut(&pk_hash).ok_or_else(|| {
                StateError::invalid_operation(format!(
                    "candidate pool has no entry for nominated account {pk_hash}"
                ))
            })?;
            candidate.votes = total;
            candidate.last_update_height = block_height;
        }

        // flush contracts: finalize each storage trie, then store the
        // account carrying the new storage root
        let mut contract_addrs: Vec<PKHash> = self.cached_contracts.keys().copied().collect();
        contract_addrs.sort();
        for pk_hash in contract_addrs {
            let account = {
                let contract = self.cached_contracts.get_mut(&pk_hash).ok_or_else(|| {
                    StateError::not_found(format!("no cached contract for {pk_hash}"))
                })?;
                contract
                    .commit()
                    .map_err(|e| e.wrap("failed to commit contract storage"))?;
                contract.self_state().clone()
            };
            self.put_state(&pk_hash, &account)
                .map_err(|e| e.wrap("failed to flush contract account to trie"))?;
        }

        // raise each executor's nonce for the executions in this block
        for execution in &executions {
            let pk_hash = address_to_pkhash(&execution.executor)?;
            self.ensure_cached(&pk_hash)
                .map_err(|e| e.wrap(format!("executor {} does not exist", execution.executor)))?;
            let account = {
                let account = self.account_mut(&pk_hash)?;
                account.bump_nonce(execution.nonce);
                account.clone()
            };
            self.put_state(&pk_hash, &account)
                .map_err(|e| e.wrap("failed to flush executor nonce to trie"))?;
        }

        // dispatch every action through the registered handlers
        let handlers = self.action_handlers.clone();
        let mut receipts = HashMap::new();
        for action in actions {
            for handler in &handlers {
                let receipt = handler.handle(ctx, action, self).map_err(|e| {
                    e.wrap(format!(
                        "action {} (nonce {}) from {} failed to mutate state",
                        action.hash(),
                        action.nonce(),
                        action.src_addr()
                    ))
                })?;
                if let Some(receipt) = receipt {
                    receipts.insert(action.hash(), receipt);
                }
            }
        }

        // stage the finalization writes: trie root, sorted candidate
        // snapshot, current height
        let root = self.account_trie.root_hash();
        let candidates = CandidateList::from_map(&self.cached_candidates);
        let snapshot = candidates.serialize()?;
        let height_key = u64_to_bytes(block_height);
        {
            let mut batch = self.batch.write();
            batch.put(
                NS_ACCOUNT,
                ACCOUNT_TRIE_ROOT_KEY,
                root.as_bytes(),
                "failed to store account trie root",
            );
            batch.put(
                NS_CANDIDATE,
                &height_key,
                &snapshot,
                format!("failed to store candidates at height {block_height}"),
            );
            batch.put(
                NS_ACCOUNT,
                CURRENT_HEIGHT_KEY,
                &height_key,
                "failed to store current height",
            );
        }

        Ok((root, receipts))
    }

    /// Commits the staged batch to the store, then resets every cache.
    ///
    /// On failure the error is surfaced verbatim and both the caches and
    /// the batch are left untouched.
    pub fn commit(&mut self) -> StateResult<()> {
        if self.phase != Phase::Finalized {
            return Err(StateError::invalid_operation(format!(
                "commit requires a finalized working set, found {:?}",
                self.phase
            )));
        }
        {
            let batch = self.batch.read();
            self.store
                .commit(batch.batch())
                .map_err(|e| e.wrap("failed to commit working set batch"))?;
        }
        self.batch.write().clear();
        self.clear_cache();
        self.phase = Phase::Fresh;
        Ok(())
    }

    fn clear_cache(&mut self) {
        self.cached_states = HashMap::new();
        self.cached_contracts = HashMap::new();
        self.cached_candidates = HashMap::new();
    }

    fn get_candidates(&self, height: u64) -> StateResult<CandidateList> {
        let bytes = self
            .store
            .get(NS_CANDIDATE, &u64_to_bytes(height))
            .map_err(|e| e.wrap(format!("failed to get candidates at height {height}")))?;
        CandidateList::deserialize(&bytes)
    }

    // ------------------------------------------------------------------
    // transfers and votes
    // ------------------------------------------------------------------

    fn handle_transfers(
        &mut self,
        producer: PKHash,
        transfers: &[&Transfer],
        ctx: &mut RunContext,
    ) -> StateResult<()> {
        for tx in transfers {
            if tx.is_contract() {
                // contract-targeted value moves are the execution layer's job
                continue;
            }
            if !tx.is_coinbase() {
                let sender = self.load_or_create_account(&tx.sender, &BigInt::zero())?;
                if ctx.enable_gas_charge {
                    let gas = tx.intrinsic_gas()?;
                    if ctx.gas_limit < gas {
                        return Err(StateError::out_of_gas(format!(
                            "transfer from {} needs {gas} gas, {} left in block",
                            tx.sender, ctx.gas_limit
                        )));
                    }
                    let gas_fee = &tx.gas_price * BigInt::from(gas);
                    {
                        let account = self.account_mut(&sender)?;
                        if &tx.amount + &gas_fee > account.balance {
                            return Err(StateError::not_enough_balance(format!(
                                "sender {} cannot cover amount {} plus gas fee {gas_fee}",
                                tx.sender, tx.amount
                            )));
                        }
                        account.sub_balance(&gas_fee)?;
                    }
                    self.account_mut(&producer)?.add_balance(&gas_fee);
                    ctx.gas_limit -= gas;
                }
                let sender_votee = {
                    let account = self.account_mut(&sender)?;
                    account
                        .sub_balance(&tx.amount)
                        .map_err(|e| e.wrap(format!("failed to debit sender {}", tx.sender)))?;
                    account.bump_nonce(tx.nonce);
                    account.votee.clone()
                };
                if !sender_votee.is_empty() && sender_votee != tx.sender {
                    // the sender's outgoing amount no longer backs its vote
                    let votee = self.load_or_create_account(&sender_votee, &BigInt::zero())?;
                    self.account_mut(&votee)?.voting_weight -= &tx.amount;
                }
            }
            let recipient = self.load_or_create_account(&tx.recipient, &BigInt::zero())?;
            self.account_mut(&recipient)?.add_balance(&tx.amount);
            if !tx.is_coinbase() {
                let recipient_votee = self.account_mut(&recipient)?.votee.clone();
                if !recipient_votee.is_empty() && recipient_votee != tx.recipient {
                    let votee =
                        self.load_or_create_account(&recipient_votee, &BigInt::zero())?;
                    self.account_mut(&votee)?.voting_weight += &tx.amount;
                }
            }
        }
        Ok(())
    }

    fn handle_votes(
        &mut self,
        producer: PKHash,
        block_height: u64,
        votes: &[&Vote],
        ctx: &mut RunContext,
    ) -> StateResult<()> {
        for vote in votes {
            let voter = self.load_or_create_account(&vote.voter, &BigInt::zero())?;
            if ctx.enable_gas_charge {
                let gas = vote.intrinsic_gas()?;
                if ctx.gas_limit < gas {
                    return Err(StateError::out_of_gas(format!(
                        "vote from {} needs {gas} gas, {} left in block",
                        vote.voter, ctx.gas_limit
                    )));
                }
                let gas_fee = &vote.gas_price * BigInt::from(gas);
                {
                    let account = self.account_mut(&voter)?;
                    if gas_fee > account.balance {
                        return Err(StateError::not_enough_balance(format!(
                            "voter {} cannot cover gas fee {gas_fee}",
                            vote.voter
                        )));
                    }
                    account.sub_balance(&gas_fee)?;
                }
                self.account_mut(&producer)?.add_balance(&gas_fee);
                ctx.gas_limit -= gas;
            }

            let (old_votee, voter_balance) = {
                let account = self.account_mut(&voter)?;
                account.bump_nonce(vote.nonce);
                (account.votee.clone(), account.balance.clone())
            };
            if !old_votee.is_empty() && old_votee != vote.voter {
                // retract the weight delegated to the previous votee
                let old = self.load_or_create_account(&old_votee, &BigInt::zero())?;
                self.account_mut(&old)?.voting_weight -= &voter_balance;
                self.account_mut(&voter)?.votee.clear();
            }

            if vote.votee.is_empty() {
                // unvote
                self.account_mut(&voter)?.is_candidate = false;
                continue;
            }

            let votee = self.load_or_create_account(&vote.votee, &BigInt::zero())?;
            if vote.voter != vote.votee {
                let balance = self.account_mut(&voter)?.balance.clone();
                self.account_mut(&votee)?.voting_weight += &balance;
                self.account_mut(&voter)?.votee = vote.votee.clone();
            } else {
                // self-nomination
                {
                    let account = self.account_mut(&voter)?;
                    account.votee = vote.voter.clone();
                    account.is_candidate = true;
                }
                self.cached_candidates.entry(voter).or_insert_with(|| Candidate {
                    address: vote.voter.clone(),
                    public_key: vote.voter_public_key.clone(),
                    votes: BigInt::zero(),
                    creation_height: block_height,
                    last_update_height: block_height,
                });
            }
        }
        Ok(())
    }
}
