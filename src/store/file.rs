//! File-backed store over an embedded B+-tree database.
//!
//! Each namespace maps to one `redb` table. Single-key operations run in
//! their own transaction; [`KvStore::commit`] replays the whole batch inside
//! a single read-write transaction so the batch lands atomically or not at
//! all.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition, TableError, WriteTransaction};
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::store::batch::{WriteBatch, WriteKind};
use crate::store::traits::KvStore;

fn table_def(namespace: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(namespace)
}

fn backend_err(err: impl std::fmt::Display) -> StateError {
    StateError::backend(err.to_string())
}

/// A [`KvStore`] persisted in a single database file.
pub struct RedbStore {
    path: PathBuf,
    db: RwLock<Option<Database>>,
}

impl RedbStore {
    /// Creates a handle for the database at `path`; nothing is opened until
    /// [`KvStore::start`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            db: RwLock::new(None),
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> StateResult<T>) -> StateResult<T> {
        let guard = self.db.read();
        let db = guard
            .as_ref()
            .ok_or_else(|| StateError::invalid_operation("store is not started"))?;
        f(db)
    }

    fn replay(txn: &WriteTransaction, batch: &WriteBatch) -> StateResult<()> {
        for op in batch.iter() {
            let mut table = txn.open_table(table_def(op.namespace())).map_err(|e| {
                StateError::backend(format!("{}: {e}", op.context()))
            })?;
            match op.kind() {
                WriteKind::Put => {
                    table
                        .insert(op.key(), op.value())
                        .map_err(|e| StateError::backend(format!("{}: {e}", op.context())))?;
                }
                WriteKind::PutIfAbsent => {
                    let exists = table
                        .get(op.key())
                        .map_err(|e| StateError::backend(format!("{}: {e}", op.context())))?
                        .is_some();
                    if exists {
                        return Err(StateError::already_exists(op.context().to_string()));
                    }
                    table
                        .insert(op.key(), op.value())
                        .map_err(|e| StateError::backend(format!("{}: {e}", op.context())))?;
                }
                WriteKind::Delete => {
                    table
                        .remove(op.key())
                        .map_err(|e| StateError::backend(format!("{}: {e}", op.context())))?;
                }
            }
        }
        Ok(())
    }
}

impl KvStore for RedbStore {
    fn start(&self) -> StateResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(backend_err)?;
        }
        let db = Database::create(&self.path).map_err(backend_err)?;
        info!(path = %self.path.display(), "opened state database");
        *self.db.write() = Some(db);
        Ok(())
    }

    fn stop(&self) -> StateResult<()> {
        // dropping the database flushes and releases the file lock
        if self.db.write().take().is_some() {
            info!(path = %self.path.display(), "closed state database");
        }
        Ok(())
    }

    fn put(&self, namespace: &str, key: &[u8], value: &[u8]) -> StateResult<()> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(backend_err)?;
            {
                let mut table = txn.open_table(table_def(namespace)).map_err(backend_err)?;
                table.insert(key, value).map_err(backend_err)?;
            }
            txn.commit().map_err(backend_err)
        })
    }

    fn put_if_absent(&self, namespace: &str, key: &[u8], value: &[u8]) -> StateResult<()> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(backend_err)?;
            let result = {
                let mut table = txn.open_table(table_def(namespace)).map_err(backend_err)?;
                if table.get(key).map_err(backend_err)?.is_some() {
                    Err(StateError::already_exists(format!(
                        "{namespace}/{}",
                        hex::encode(key)
                    )))
                } else {
                    table.insert(key, value).map_err(backend_err)?;
                    Ok(())
                }
            };
            match result {
                Ok(()) => txn.commit().map_err(backend_err),
                Err(err) => {
                    txn.abort().map_err(backend_err)?;
                    Err(err)
                }
            }
        })
    }

    fn get(&self, namespace: &str, key: &[u8]) -> StateResult<Vec<u8>> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(backend_err)?;
            let table = match txn.open_table(table_def(namespace)) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => {
                    return Err(StateError::not_found(format!(
                        "{namespace}/{}",
                        hex::encode(key)
                    )));
                }
                Err(e) => return Err(backend_err(e)),
            };
            table
                .get(key)
                .map_err(backend_err)?
                .map(|guard| guard.value().to_vec())
                .ok_or_else(|| StateError::not_found(format!("{namespace}/{}", hex::encode(key))))
        })
    }

    fn delete(&self, namespace: &str, key: &[u8]) -> StateResult<()> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(backend_err)?;
            {
                let mut table = txn.open_table(table_def(namespace)).map_err(backend_err)?;
                table.remove(key).map_err(backend_err)?;
            }
            txn.commit().map_err(backend_err)
        })
    }

    fn commit(&self, batch: &WriteBatch) -> StateResult<()> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(backend_err)?;
            match Self::replay(&txn, batch) {
                Ok(()) => {
                    txn.commit().map_err(backend_err)?;
                    debug!(ops = batch.len(), "committed batch");
                    Ok(())
                }
                Err(err) => {
                    txn.abort().map_err(backend_err)?;
                    Err(err)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> RedbStore {
        let store = RedbStore::new(dir.path().join("state.db"));
        store.start().unwrap();
        store
    }

    #[test]
    fn test_requires_start() {
        let dir = TempDir::new().unwrap();
        let store = RedbStore::new(dir.path().join("state.db"));
        assert!(store.get("ns1", b"k").is_err());
    }

    #[test]
    fn test_put_get_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put("ns1", b"key", b"value").unwrap();
        store.stop().unwrap();

        store.start().unwrap();
        assert_eq!(store.get("ns1", b"key").unwrap(), b"value");
        store.stop().unwrap();
    }

    #[test]
    fn test_missing_namespace_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.get("ns_missing", b"k").unwrap_err().is_not_found());
        store.stop().unwrap();
    }

    #[test]
    fn test_put_if_absent_rolls_back() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put_if_absent("ns1", b"k", b"v1").unwrap();
        assert!(store
            .put_if_absent("ns1", b"k", b"v2")
            .unwrap_err()
            .is_already_exists());
        assert_eq!(store.get("ns1", b"k").unwrap(), b"v1");
        store.stop().unwrap();
    }

    #[test]
    fn test_commit_is_atomic() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put("ns1", b"k3", b"old").unwrap();

        let mut batch = WriteBatch::new();
        batch.put("ns1", b"k1", b"v1", "");
        batch.put("ns2", b"k2", b"v2", "");
        batch.put_if_absent("ns1", b"k3", b"v3", "k3 exists");
        let err = store.commit(&batch).unwrap_err();
        assert!(err.is_already_exists());

        assert!(store.get("ns1", b"k1").unwrap_err().is_not_found());
        assert!(store.get("ns2", b"k2").unwrap_err().is_not_found());
        assert_eq!(store.get("ns1", b"k3").unwrap(), b"old");

        batch.clear();
        batch.put("ns1", b"k1", b"v1", "");
        batch.delete("ns1", b"k3", "");
        store.commit(&batch).unwrap();
        assert_eq!(store.get("ns1", b"k1").unwrap(), b"v1");
        assert!(store.get("ns1", b"k3").unwrap_err().is_not_found());
        store.stop().unwrap();
    }
}
