//! # Secondary Indexes
//!
//! An index maps ordered value keys (see [`crate::encoding::key`]) back to
//! record keys, in one KV store per index. Two flavors share the same
//! interface:
//!
//! - **unique**: the value key is the store key, the record key is the
//!   entry's payload. A second `set` for the same value fails
//!   `DuplicateIndexValue`.
//! - **list**: value and record key are packed into the store key so that
//!   an ordered scan by value interleaves duplicate values:
//!
//! ```text
//! value || 0x1E || record_key || u8(len(record_key))
//! ```
//!
//! The trailing length byte makes the split exact even when the value
//! bytes contain the separator (user strings can), at the cost of capping
//! record keys at 255 bytes. Descending scans with a pivot append `0x1F`
//! (separator + 1) so entries equal to the pivot are not skipped.

use crate::engine::Store;
use crate::errors::Error;
use eyre::{bail, ensure, Result};

/// Separator between value and record key in list-index entries.
pub const SEPARATOR: u8 = 0x1E;

/// Descriptor of an index, as persisted in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    pub index_name: String,
    pub table_name: String,
    pub field_name: String,
    pub unique: bool,
}

/// An open index inside a transaction.
pub struct Index<'a> {
    store: Box<dyn Store + 'a>,
    unique: bool,
}

impl<'a> Index<'a> {
    pub fn new(store: Box<dyn Store + 'a>, unique: bool) -> Index<'a> {
        Index { store, unique }
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Associates a value with a record key.
    pub fn set(&mut self, value: &[u8], key: &[u8]) -> Result<()> {
        ensure!(!value.is_empty(), "index value cannot be empty");
        if self.unique {
            match self.store.get(value) {
                Ok(_) => bail!(Error::DuplicateIndexValue),
                Err(e) if Error::KeyNotFound.is(&e) => {}
                Err(e) => return Err(e),
            }
            self.store.put(value, key)
        } else {
            self.store.put(&compose(value, key)?, &[])
        }
    }

    /// Removes the association between a value and a record key.
    pub fn delete(&mut self, value: &[u8], key: &[u8]) -> Result<()> {
        if self.unique {
            // the value alone identifies the entry
            self.store.delete(value)
        } else {
            self.store.delete(&compose(value, key)?)
        }
    }

    /// Visits `(value, record_key)` pairs with `value >= pivot`, in
    /// ascending value order. `None` starts at the smallest value.
    pub fn ascend_greater_or_equal(
        &self,
        pivot: Option<&[u8]>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        if self.unique {
            self.store.ascend_greater_or_equal(pivot, f)
        } else {
            self.store
                .ascend_greater_or_equal(pivot, &mut |composite, _| {
                    let (value, key) = split(composite)?;
                    f(value, key)
                })
        }
    }

    /// Visits `(value, record_key)` pairs with `value <= pivot`, in
    /// descending value order. `None` starts at the largest value.
    pub fn descend_less_or_equal(
        &self,
        pivot: Option<&[u8]>,
        f: &mut dyn FnMut(&[u8], &[u8]) -> Result<()>,
    ) -> Result<()> {
        if self.unique {
            self.store.descend_less_or_equal(pivot, f)
        } else {
            // bump the pivot past every composite carrying this exact value
            let bumped = pivot.map(|p| {
                let mut b = Vec::with_capacity(p.len() + 1);
                b.extend_from_slice(p);
                b.push(SEPARATOR + 1);
                b
            });
            self.store
                .descend_less_or_equal(bumped.as_deref(), &mut |composite, _| {
                    let (value, key) = split(composite)?;
                    f(value, key)
                })
        }
    }

    /// Removes every entry.
    pub fn truncate(&mut self) -> Result<()> {
        self.store.truncate()
    }
}

fn compose(value: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    ensure!(
        key.len() <= u8::MAX as usize,
        "record key exceeds 255 bytes and cannot be indexed"
    );
    let mut buf = Vec::with_capacity(value.len() + key.len() + 2);
    buf.extend_from_slice(value);
    buf.push(SEPARATOR);
    buf.extend_from_slice(key);
    buf.push(key.len() as u8);
    Ok(buf)
}

fn split(composite: &[u8]) -> Result<(&[u8], &[u8])> {
    let len = composite.len();
    ensure!(len >= 2, Error::InvalidEncoding("index entry too short"));
    let key_len = composite[len - 1] as usize;
    ensure!(
        len >= key_len + 2,
        Error::InvalidEncoding("index entry shorter than its key length")
    );
    let key = &composite[len - 1 - key_len..len - 1];
    let sep = len - 2 - key_len;
    ensure!(
        composite[sep] == SEPARATOR,
        Error::InvalidEncoding("index entry separator missing")
    );
    Ok((&composite[..sep], key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::key::ordered_key;
    use crate::engine::{Engine, MemoryEngine};
    use crate::value::Value;

    fn with_index(unique: bool, f: impl FnOnce(&mut Index<'_>)) {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(true).unwrap();
        tx.create_store("idx").unwrap();
        {
            let store = tx.store("idx").unwrap();
            let mut index = Index::new(store, unique);
            f(&mut index);
        }
        tx.rollback().unwrap();
    }

    fn entries(index: &Index<'_>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out = Vec::new();
        index
            .ascend_greater_or_equal(None, &mut |v, k| {
                out.push((v.to_vec(), k.to_vec()));
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn unique_index_rejects_second_key_for_same_value() {
        with_index(true, |index| {
            index.set(b"v", b"k1").unwrap();
            let err = index.set(b"v", b"k2").unwrap_err();
            assert!(Error::DuplicateIndexValue.is(&err));
            assert_eq!(entries(index), [(b"v".to_vec(), b"k1".to_vec())]);
        });
    }

    #[test]
    fn list_index_interleaves_duplicates_in_value_order() {
        with_index(false, |index| {
            index.set(b"b", b"k1").unwrap();
            index.set(b"a", b"k2").unwrap();
            index.set(b"b", b"k3").unwrap();
            let got = entries(index);
            assert_eq!(
                got,
                [
                    (b"a".to_vec(), b"k2".to_vec()),
                    (b"b".to_vec(), b"k1".to_vec()),
                    (b"b".to_vec(), b"k3".to_vec()),
                ]
            );
        });
    }

    #[test]
    fn list_index_delete_removes_one_association() {
        with_index(false, |index| {
            index.set(b"v", b"k1").unwrap();
            index.set(b"v", b"k2").unwrap();
            index.delete(b"v", b"k1").unwrap();
            assert_eq!(entries(index), [(b"v".to_vec(), b"k2".to_vec())]);
            assert!(Error::KeyNotFound.is(&index.delete(b"v", b"k1").unwrap_err()));
        });
    }

    #[test]
    fn values_containing_the_separator_split_exactly() {
        with_index(false, |index| {
            let tricky = ordered_key(&Value::string("a\u{1e}b")).unwrap().unwrap();
            index.set(&tricky, b"k1").unwrap();
            // a key that itself contains the separator byte
            index.set(&tricky, &[0x10, SEPARATOR, 0x20]).unwrap();
            let got = entries(index);
            assert_eq!(got.len(), 2);
            assert!(got.iter().all(|(v, _)| v == &tricky));
            assert!(got.iter().any(|(_, k)| k == &[0x10, SEPARATOR, 0x20]));
        });
    }

    #[test]
    fn descending_scan_includes_entries_equal_to_the_pivot() {
        with_index(false, |index| {
            index.set(b"a", b"k1").unwrap();
            index.set(b"b", b"k2").unwrap();
            index.set(b"c", b"k3").unwrap();
            let mut seen = Vec::new();
            index
                .descend_less_or_equal(Some(b"b"), &mut |v, _| {
                    seen.push(v.to_vec());
                    Ok(())
                })
                .unwrap();
            assert_eq!(seen, [b"b".to_vec(), b"a".to_vec()]);
        });
    }

    #[test]
    fn empty_values_are_rejected() {
        with_index(false, |index| {
            assert!(index.set(b"", b"k").is_err());
        });
        with_index(true, |index| {
            assert!(index.set(b"", b"k").is_err());
        });
    }

    #[test]
    fn oversized_record_keys_are_rejected() {
        with_index(false, |index| {
            let key = vec![0u8; 256];
            assert!(index.set(b"v", &key).is_err());
        });
    }
}
