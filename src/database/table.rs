//! # Table Layer
//!
//! A table is one KV store plus its configuration. The store holds one
//! entry per record: the key is the record's byte key, the value is the
//! encoded field list.
//!
//! ## Record keys
//!
//! Tables with a declared primary key require the field on every insert,
//! convert it to the declared type and use its canonical encoding as the
//! store key. Tables without one allocate a monotonically increasing
//! counter, persisted in the table descriptor so it survives transactions,
//! and encode it as `Int64`. Either way the key decodes back to a typed
//! value, which is what the SQL `key()` selector returns.
//!
//! ## Index maintenance
//!
//! Every write keeps the table's indexes pointwise in sync: insert adds an
//! entry per indexed field present on the record, replace diffs the old and
//! new ordered keys, delete removes them. An index error aborts the
//! statement and the enclosing transaction rollback undoes the partial
//! write, which is what keeps the index invariant atomic.

use super::index::{Index, IndexConfig};
use super::Transaction;
use crate::encoding::key::ordered_key;
use crate::engine::Store;
use crate::errors::Error;
use crate::record::{decode_record, encode_record, EncodedRecord, Record};
use crate::value::{Type, Value};
use eyre::{bail, ensure, Result, WrapErr};

/// Table configuration, persisted in the catalog descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableConfig {
    pub primary_key: Option<PrimaryKey>,
    /// Last allocated auto-key; only meaningful without a primary key.
    pub(crate) last_key: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKey {
    pub field: String,
    pub ty: Type,
}

impl TableConfig {
    pub fn with_primary_key(field: impl Into<String>, ty: Type) -> TableConfig {
        TableConfig {
            primary_key: Some(PrimaryKey {
                field: field.into(),
                ty,
            }),
            last_key: 0,
        }
    }
}

/// An open table inside a transaction.
pub struct Table<'a> {
    pub(crate) name: String,
    pub(crate) store: Box<dyn Store + 'a>,
    pub(crate) cfg: TableConfig,
    pub(crate) tx: &'a Transaction<'a>,
}

impl<'a> Table<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TableConfig {
        &self.cfg
    }

    /// The table's indexes, opened and ready for use. The handles borrow
    /// the transaction, not this table.
    pub fn indexes(&self) -> Result<Vec<(IndexConfig, Index<'a>)>> {
        self.tx.open_table_indexes(&self.name)
    }

    /// Inserts a record and returns its key.
    pub fn insert(&mut self, rec: &dyn Record) -> Result<Vec<u8>> {
        let key = self.record_key(rec)?;

        if self.cfg.primary_key.is_some() {
            match self.store.get(&key) {
                Ok(_) => bail!(Error::DuplicateRecord),
                Err(e) if Error::KeyNotFound.is(&e) => {}
                Err(e) => return Err(e),
            }
        }

        let body = encode_record(rec)?;
        self.store.put(&key, &body)?;

        for (cfg, mut index) in self.indexes()? {
            if let Some(value_key) = indexed_key(rec, &cfg.field_name)? {
                index.set(&value_key, &key)?;
            }
        }

        Ok(key)
    }

    /// Replaces the record stored under `key`, maintaining indexes by
    /// diffing the old and new indexed field values.
    pub fn replace(&mut self, key: &[u8], rec: &dyn Record) -> Result<()> {
        let old_body = self
            .store
            .get(key)
            .wrap_err("replacing a record that is not in the table")?;
        let old = decode_record(&old_body)?;

        for (cfg, mut index) in self.indexes()? {
            let old_key = indexed_key(&old, &cfg.field_name)?;
            let new_key = indexed_key(rec, &cfg.field_name)?;
            if old_key == new_key {
                continue;
            }
            if let Some(ref value_key) = old_key {
                index.delete(value_key, key)?;
            }
            if let Some(ref value_key) = new_key {
                index.set(value_key, key)?;
            }
        }

        let body = encode_record(rec)?;
        self.store.put(key, &body)
    }

    /// Deletes the record stored under `key` and its index entries.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let body = self.store.get(key)?;
        let old = decode_record(&body)?;

        for (cfg, mut index) in self.indexes()? {
            if let Some(value_key) = indexed_key(&old, &cfg.field_name)? {
                index.delete(&value_key, key)?;
            }
        }

        self.store.delete(key)
    }

    /// Fetches one record by key. Returns `None` when absent.
    pub fn get(&self, key: &[u8]) -> Result<Option<EncodedRecord>> {
        match self.store.get(key) {
            Ok(body) => Ok(Some(EncodedRecord::new(self.key_value(key)?, body))),
            Err(e) if Error::KeyNotFound.is(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Visits every record in ascending key order. The records passed to
    /// `f` know their key, so executors can address them afterwards.
    pub fn iterate(&self, f: &mut dyn FnMut(&dyn Record) -> Result<()>) -> Result<()> {
        self.store.ascend_greater_or_equal(None, &mut |k, body| {
            let rec = EncodedRecord::new(self.key_value(k)?, body.to_vec());
            f(&rec)
        })
    }

    /// Rebuilds the typed key value from raw key bytes.
    pub(crate) fn key_value(&self, raw: &[u8]) -> Result<Value> {
        let ty = match &self.cfg.primary_key {
            Some(pk) => pk.ty,
            None => Type::Int64,
        };
        Value::from_raw(ty, raw.to_vec())
    }

    fn record_key(&mut self, rec: &dyn Record) -> Result<Vec<u8>> {
        if let Some(pk) = self.cfg.primary_key.clone() {
            let field = rec
                .field(&pk.field)
                .wrap_err_with(|| format!("record is missing primary key field {}", pk.field))?;
            let value = field.value.convert_to(pk.ty).wrap_err_with(|| {
                format!("primary key field {} has an incompatible type", pk.field)
            })?;
            ensure!(!value.data.is_empty(), "primary key cannot be empty");
            return Ok(value.data);
        }

        // auto key: allocate and persist the counter in the same transaction
        self.cfg.last_key += 1;
        self.tx.save_table_config(&self.name, &self.cfg)?;
        Ok(Value::int64(self.cfg.last_key as i64).data)
    }
}

/// Ordered index key for a record's field, or `None` when the field is
/// absent or Null.
pub(crate) fn indexed_key(rec: &dyn Record, field_name: &str) -> Result<Option<Vec<u8>>> {
    match rec.field(field_name) {
        Ok(field) => ordered_key(&field.value),
        Err(e) if Error::FieldNotFound.is(&e) => Ok(None),
        Err(e) => Err(e),
    }
}
