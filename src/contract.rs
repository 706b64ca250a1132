//! Contract wrapper: an account plus its storage trie.

use std::sync::Arc;

use crate::error::StateResult;
use crate::state::Account;
use crate::store::{KvStore, SharedBatch};
use crate::trie::Trie;
use crate::types::{hash256, Hash256};
use crate::working_set::NS_CODE;

/// An account being used as a contract within a working set.
///
/// The storage trie shares the working set's batch, so contract storage
/// writes ride the same atomic commit as account writes. [`commit`]
/// finalizes only the trie root on the wrapped account; flushing the batch
/// stays the working set's job.
///
/// [`commit`]: Contract::commit
pub struct Contract {
    account: Account,
    trie: Trie,
    store: Arc<dyn KvStore>,
    batch: SharedBatch,
    code: Option<Vec<u8>>,
}

impl Contract {
    /// Wraps `account` with its storage trie.
    pub fn new(
        account: Account,
        trie: Trie,
        store: Arc<dyn KvStore>,
        batch: SharedBatch,
    ) -> Self {
        Self {
            account,
            trie,
            store,
            batch,
            code: None,
        }
    }

    /// Returns the contract bytecode, reading through the local cache.
    pub fn get_code(&mut self) -> StateResult<Vec<u8>> {
        if let Some(code) = &self.code {
            return Ok(code.clone());
        }
        let code = self
            .store
            .get(NS_CODE, self.account.code_hash.as_bytes())?;
        self.code = Some(code.clone());
        Ok(code)
    }

    /// Installs bytecode: updates the account's code hash and stages the
    /// code into the `Code` namespace.
    pub fn set_code(&mut self, code: Vec<u8>) {
        let code_hash = hash256(&code);
        self.account.code_hash = code_hash;
        self.batch.write().put(
            NS_CODE,
            code_hash.as_bytes(),
            &code,
            "failed to store contract code",
        );
        self.code = Some(code);
    }

    /// Reads a storage slot from the contract's trie.
    pub fn get_state(&self, key: &Hash256) -> StateResult<Vec<u8>> {
        self.trie.get(key.as_bytes())
    }

    /// Writes a storage slot into the contract's trie.
    pub fn set_state(&mut self, key: &Hash256, value: &[u8]) -> StateResult<()> {
        self.trie.upsert(key.as_bytes(), value)
    }

    /// Folds the storage trie's current root back onto the account.
    pub fn commit(&mut self) -> StateResult<()> {
        self.account.storage_root = self.trie.root_hash();
        Ok(())
    }

    /// The wrapped account as it currently stands.
    pub fn self_state(&self) -> &Account {
        &self.account
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CachedBatch, MemoryStore};
    use crate::trie::EMPTY_ROOT;
    use crate::working_set::NS_CONTRACT;

    fn new_contract() -> Contract {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let batch = CachedBatch::new().into_shared();
        let trie = Trie::new_shared(store.clone(), batch.clone(), NS_CONTRACT, EMPTY_ROOT);
        Contract::new(Account::default(), trie, store, batch)
    }

    #[test]
    fn test_storage_roundtrip_and_root_fold() {
        let mut contract = new_contract();
        let key = hash256(b"slot");
        assert!(contract.get_state(&key).unwrap_err().is_not_found());

        contract.set_state(&key, b"value").unwrap();
        assert_eq!(contract.get_state(&key).unwrap(), b"value");

        assert_eq!(contract.self_state().storage_root, Hash256::zero());
        contract.commit().unwrap();
        let root = contract.self_state().storage_root;
        assert_ne!(root, Hash256::zero());
        assert_ne!(root, EMPTY_ROOT);
    }

    #[test]
    fn test_set_code_updates_hash_and_stages_bytes() {
        let mut contract = new_contract();
        let code = b"contract bytecode".to_vec();
        contract.set_code(code.clone());

        let expected_hash = hash256(&code);
        assert_eq!(contract.self_state().code_hash, expected_hash);
        assert_eq!(contract.get_code().unwrap(), code);

        // the code write is staged in the shared batch under its hash
        let staged = contract
            .batch
            .read()
            .get(NS_CODE, expected_hash.as_bytes())
            .unwrap();
        assert_eq!(staged, code);
    }
}
