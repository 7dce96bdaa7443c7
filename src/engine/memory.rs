//! # In-Memory Engine
//!
//! Ordered stores over `BTreeMap`, mainly for tests and ephemeral databases.
//!
//! ## Transaction model
//!
//! Writes apply in place; a writable transaction snapshots the whole store
//! map when it begins and restores it on rollback (or drop). Commit simply
//! discards the snapshot. This gives single-writer atomicity without a
//! journal. Read-only transactions read the live state, so readers running
//! beside a writer see uncommitted writes; the core never relies on
//! stronger isolation than the backend advertises, and this backend
//! advertises none.
//!
//! ## Locking
//!
//! Scans never hold the store lock across a callback: each step re-acquires
//! the lock and fetches the next entry after a remembered cursor. Callbacks
//! are therefore free to read or write the same store mid-scan, which the
//! executors use when replacing records during an index backfill.

use super::{Engine, Store, Transaction};
use crate::errors::Error;
use eyre::{bail, ensure, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Tree = BTreeMap<Vec<u8>, Vec<u8>>;
type StoreMap = BTreeMap<String, Tree>;

#[derive(Default)]
struct Shared {
    stores: RwLock<StoreMap>,
    writer_active: AtomicBool,
}

impl Shared {
    fn acquire_writer(&self) -> Result<()> {
        if self
            .writer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            bail!("a write transaction is already in progress");
        }
        Ok(())
    }

    fn release_writer(&self) {
        self.writer_active.store(false, Ordering::Release);
    }
}

/// An ordered KV engine backed by process memory.
#[derive(Default)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl MemoryEngine {
    pub fn new() -> MemoryEngine {
        MemoryEngine::default()
    }
}

impl Engine for MemoryEngine {
    fn begin(&self, writable: bool) -> Result<Box<dyn Transaction + '_>> {
        let snapshot = if writable {
            self.shared.acquire_writer()?;
            Some(self.shared.stores.read().clone())
        } else {
            None
        };
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            writable: Arc::new(AtomicBool::new(writable)),
            snapshot,
            finished: false,
        }))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    /// Shared with store handles so a promotion is visible through them.
    writable: Arc<AtomicBool>,
    snapshot: Option<StoreMap>,
    finished: bool,
}

impl MemoryTransaction {
    fn check_writable(&self) -> Result<()> {
        ensure!(
            self.writable.load(Ordering::Acquire),
            Error::TransactionReadOnly
        );
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    fn commit(&mut self) -> Result<()> {
        ensure!(!self.finished, Error::TransactionDiscarded);
        self.check_writable()?;
        self.finished = true;
        self.snapshot = None;
        self.shared.release_writer();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Some(snapshot) = self.snapshot.take() {
            *self.shared.stores.write() = snapshot;
            self.shared.release_writer();
        }
        Ok(())
    }

    fn promote(&mut self) -> Result<()> {
        ensure!(!self.finished, Error::TransactionDiscarded);
        if self.writable() {
            return Ok(());
        }
        self.shared.acquire_writer()?;
        self.snapshot = Some(self.shared.stores.read().clone());
        self.writable.store(true, Ordering::Release);
        Ok(())
    }

    fn store(&self, name: &str) -> Result<Box<dyn Store + '_>> {
        ensure!(
            self.shared.stores.read().contains_key(name),
            Error::StoreNotFound
        );
        Ok(Box::new(MemoryStore {
            shared: Arc::clone(&self.shared),
            writable: Arc::clone(&self.writable),
            name: name.to_string(),
        }))
    }

    fn create_store(&mut self, name: &str) -> Result<()> {
        self.check_writable()?;
        let mut stores = self.shared.stores.write();
        ensure!(!stores.contains_key(name), Error::StoreAlreadyExists);
        stores.insert(name.to_string(), Tree::new());
        Ok(())
    }

    fn drop_store(&mut self, name: &str) -> Result<()> {
        self.check_writable()?;
        let mut stores = self.shared.stores.write();
        ensure!(stores.remove(name).is_some(), Error::StoreNotFound);
        Ok(())
    }

    fn list_stores(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .shared
            .stores
            .read()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        let _ = self.rollback();
    }
}

struct MemoryStore {
    shared: Arc<Shared>,
    writable: Arc<AtomicBool>,
    name: String,
}

impl MemoryStore {
    fn check_writable(&self) -> Result<()> {
        ensure!(self.writable.load(Ordering::Acquire), Error::TransactionReadOnly);
        Ok(())
    }

    fn with_tree<T>(&self, f: impl FnOnce(&Tree) -> T) -> Result<T> {
        let stores = self.shared.stores.read();
        let tree = stores.get(&self.name).ok_or(Error::StoreNotFound)?;
        Ok(f(tree))
    }

    fn with_tree_mut<T>(&self, f: impl FnOnce(&mut Tree) -> T) -> Result<T> {
        let mut stores = self.shared.stores.write();
        let tree = stores.get_mut(&self.name).ok_or(Error::StoreNotFound)?;
        Ok(f(tree))
    }
}

impl Store for MemoryStore {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;
        ensure!(!key.is_empty(), "key cannot be empty");
        self.with_tree_mut(|tree| {
            tree.insert(key.to_vec(), value.to_vec());
        })
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.with_tree(|tree| tree.get(key).cloned())?
            .ok_or_else(|| eyre::Report::new(Error::KeyNotFound))
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.check_writable()?;
        let removed = self.with_tree_mut(|tree| tree.remove(key).is_some())?;
        ensure!(removed, Error::KeyNotFound);
        Ok(())
    }

    fn truncate(&mut self) -> Result<()> {
        self.check_writable()?;
        self.with_tree_mut(|tree| tree.clear())
    }

    fn ascend_greater_or_equal(
        &self,
        pivot: Option<&[u8]>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let next = self.with_tree(|tree| {
                let lower = match (&cursor, pivot) {
                    (Some(c), _) => Bound::Excluded(c.clone()),
                    (None, Some(p)) => Bound::Included(p.to_vec()),
                    (None, None) => Bound::Unbounded,
                };
                tree.range((lower, Bound::Unbounded))
                    .next()
                    .map(|(k, v)| (k.clone(), v.clone()))
            })?;
            let Some((key, value)) = next else {
                return Ok(());
            };
            cursor = Some(key.clone());
            f(&key, &value)?;
        }
    }

    fn descend_less_or_equal(
        &self,
        pivot: Option<&[u8]>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let next = self.with_tree(|tree| {
                let upper = match (&cursor, pivot) {
                    (Some(c), _) => Bound::Excluded(c.clone()),
                    (None, Some(p)) => Bound::Included(p.to_vec()),
                    (None, None) => Bound::Unbounded,
                };
                tree.range((Bound::Unbounded, upper))
                    .next_back()
                    .map(|(k, v)| (k.clone(), v.clone()))
            })?;
            let Some((key, value)) = next else {
                return Ok(());
            };
            cursor = Some(key.clone());
            f(&key, &value)?;
        }
    }
}
