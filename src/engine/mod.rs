//! # Ordered Key-Value Engine Interface
//!
//! The storage backend is pluggable: everything above this module talks to
//! an [`Engine`] through object-safe traits and never assumes a concrete
//! implementation. An engine exposes named, ordered byte-to-byte stores
//! inside atomic transactions.
//!
//! ## Contract
//!
//! - `begin(writable)` starts a transaction. At most one writable
//!   transaction runs at a time; whether readers may coexist with a writer
//!   is backend-defined and the core never relies on it.
//! - A transaction ends in `commit` (writable only) or `rollback`
//!   (idempotent, always legal). Dropping an unfinished transaction rolls
//!   back. `commit` after `rollback` fails `TransactionDiscarded`; any
//!   write through a read-only transaction fails `TransactionReadOnly`.
//!   Store handles borrow their transaction, so using one after the
//!   transaction ended is rejected at compile time rather than at run time.
//! - `promote` upgrades a read-only transaction in place. Backends that
//!   cannot do this return `PromotionUnsupported`, which is the default.
//! - Scans visit entries in key order starting at the pivot (`None` means
//!   the relevant end of the store). A callback error stops the scan and is
//!   returned verbatim; early exit is a callback returning a marker error
//!   that the initiating caller unwraps.

pub mod memory;

pub use memory::MemoryEngine;

use crate::errors::Error;
use eyre::Result;

/// A storage backend holding named ordered stores.
pub trait Engine {
    /// Begins a transaction. `writable` requests write access.
    fn begin(&self, writable: bool) -> Result<Box<dyn Transaction + '_>>;

    /// Releases backend resources. Called once, by the owning database.
    fn close(&mut self) -> Result<()>;
}

/// An atomic view over the engine's stores.
pub trait Transaction {
    fn writable(&self) -> bool;

    /// Makes the changes visible to later transactions. Writable only.
    fn commit(&mut self) -> Result<()>;

    /// Discards all changes. Idempotent.
    fn rollback(&mut self) -> Result<()>;

    /// Upgrades a read-only transaction to writable, if the backend can.
    fn promote(&mut self) -> Result<()> {
        Err(eyre::Report::new(Error::PromotionUnsupported))
    }

    /// Opens an existing store. Fails `StoreNotFound`.
    fn store(&self, name: &str) -> Result<Box<dyn Store + '_>>;

    /// Creates a store. Writable only; fails `StoreAlreadyExists`.
    fn create_store(&mut self, name: &str) -> Result<()>;

    /// Drops a store and its content. Writable only; fails `StoreNotFound`.
    fn drop_store(&mut self, name: &str) -> Result<()>;

    /// Lists store names with the given prefix, in lexicographic order.
    fn list_stores(&self, prefix: &str) -> Result<Vec<String>>;
}

/// A named, ordered byte-to-byte map. Keys are unique within a store.
pub trait Store {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Fails `KeyNotFound` for absent keys.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Fails `KeyNotFound` for absent keys.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Removes every entry.
    fn truncate(&mut self) -> Result<()>;

    /// Visits entries with `key >= pivot` in ascending key order.
    /// A `None` pivot starts at the first entry.
    fn ascend_greater_or_equal(
        &self,
        pivot: Option<&[u8]>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()>;

    /// Visits entries with `key <= pivot` in descending key order.
    /// A `None` pivot starts at the last entry.
    fn descend_less_or_equal(
        &self,
        pivot: Option<&[u8]>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()>;
}
