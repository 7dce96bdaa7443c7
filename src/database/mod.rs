//! # Database and Catalog
//!
//! A [`Database`] owns one KV engine. All access goes through a
//! [`Transaction`], which layers the catalog (table and index descriptors)
//! on top of the engine's stores and hands out [`Table`] and
//! [`index::Index`] handles.
//!
//! ## Persisted layout
//!
//! A reserved store, `__strata.meta`, holds every descriptor:
//!
//! ```text
//! table <0x1F> table_name   ->  table descriptor
//! index <0x1F> index_name   ->  index descriptor
//! ```
//!
//! Descriptors are encoded with the record body codec itself. Each table
//! gets a store named after it; each index gets `__strata.index.<name>`.
//! User-visible names must not contain `0x1F` or use the reserved prefix.
//!
//! ## Lifecycles
//!
//! Transactions begin writable or read-only and end in exactly one of
//! commit or rollback; [`Database::view`] and [`Database::update`] are the
//! scoped forms that guarantee release. A write statement inside `view`
//! fails with `TransactionReadOnly` rather than attempting promotion.

pub mod index;
pub mod table;

use crate::engine::{self, Engine};
use crate::errors::Error;
use crate::record::{decode_record, encode_record, Field, FieldBuffer, Record};
use crate::value::{Type, Value};
use eyre::{ensure, Result};
use index::{Index, IndexConfig};
use table::{PrimaryKey, Table, TableConfig};
use tracing::debug;

/// Store holding every table and index descriptor.
const META_STORE: &str = "__strata.meta";
/// Prefix of the stores backing secondary indexes.
const INDEX_STORE_PREFIX: &str = "__strata.index.";
/// Names beginning with this prefix are reserved for internal stores.
const RESERVED_PREFIX: &str = "__strata";
/// Separator between the descriptor kind and the object name in meta keys.
const NAME_SEPARATOR: u8 = 0x1F;

fn table_descriptor_key(name: &str) -> Vec<u8> {
    let mut key = b"table".to_vec();
    key.push(NAME_SEPARATOR);
    key.extend_from_slice(name.as_bytes());
    key
}

fn index_descriptor_key(name: &str) -> Vec<u8> {
    let mut key = b"index".to_vec();
    key.push(NAME_SEPARATOR);
    key.extend_from_slice(name.as_bytes());
    key
}

fn index_store_name(index_name: &str) -> String {
    format!("{INDEX_STORE_PREFIX}{index_name}")
}

fn validate_name(name: &str) -> Result<()> {
    ensure!(!name.is_empty(), "name cannot be empty");
    ensure!(
        !name.as_bytes().contains(&NAME_SEPARATOR),
        "name contains the reserved separator byte"
    );
    ensure!(
        !name.starts_with(RESERVED_PREFIX),
        "name uses the reserved prefix {RESERVED_PREFIX}"
    );
    Ok(())
}

/// An embedded database over a pluggable ordered KV engine.
pub struct Database {
    engine: Box<dyn Engine>,
}

impl Database {
    /// Opens a database over the given engine, initializing the catalog
    /// store on first use.
    pub fn new(engine: impl Engine + 'static) -> Result<Database> {
        let db = Database {
            engine: Box::new(engine),
        };
        {
            let mut tx = db.engine.begin(true)?;
            let missing = matches!(
                tx.store(META_STORE),
                Err(ref e) if Error::StoreNotFound.is(e)
            );
            if missing {
                tx.create_store(META_STORE)?;
            }
            tx.commit()?;
        }
        Ok(db)
    }

    /// Begins a transaction. At most one writable transaction at a time;
    /// the engine enforces it.
    pub fn begin(&self, writable: bool) -> Result<Transaction<'_>> {
        Ok(Transaction {
            inner: self.engine.begin(writable)?,
            promotable: true,
        })
    }

    /// Runs `f` inside a read-only transaction, rolling back afterwards.
    /// Write statements inside `f` fail with `TransactionReadOnly`.
    pub fn view<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut tx = self.begin(false)?;
        tx.promotable = false;
        let res = f(&mut tx);
        tx.rollback()?;
        res
    }

    /// Runs `f` inside a writable transaction, committing on success and
    /// rolling back on error.
    pub fn update<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut tx = self.begin(true)?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback();
                Err(err)
            }
        }
    }

    /// Releases the engine.
    pub fn close(mut self) -> Result<()> {
        self.engine.close()
    }
}

/// A transaction over the engine plus the catalog operations.
pub struct Transaction<'a> {
    pub(crate) inner: Box<dyn engine::Transaction + 'a>,
    /// Whether a write statement may promote a read-only transaction.
    /// `Database::view` turns this off.
    pub(crate) promotable: bool,
}

impl<'a> Transaction<'a> {
    pub fn writable(&self) -> bool {
        self.inner.writable()
    }

    pub fn commit(mut self) -> Result<()> {
        self.inner.commit()
    }

    pub fn rollback(mut self) -> Result<()> {
        self.inner.rollback()
    }

    pub(crate) fn promote(&mut self) -> Result<()> {
        self.inner.promote()
    }

    /// Creates a table and its backing store. Fails `TableAlreadyExists`.
    pub fn create_table(&mut self, name: &str, cfg: Option<TableConfig>) -> Result<()> {
        validate_name(name)?;
        ensure!(
            self.meta_get(&table_descriptor_key(name))?.is_none(),
            Error::TableAlreadyExists
        );
        self.inner.create_store(name)?;
        self.save_table_config(name, &cfg.unwrap_or_default())?;
        debug!(table = name, "created table");
        Ok(())
    }

    /// Opens a table. Fails `TableNotFound`.
    pub fn get_table<'s>(&'s self, name: &str) -> Result<Table<'s>> {
        let cfg = self.table_config(name)?;
        let store = self.inner.store(name)?;
        Ok(Table {
            name: name.to_string(),
            store,
            cfg,
            tx: self,
        })
    }

    /// Drops a table, its backing store and all of its indexes.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        ensure!(
            self.meta_get(&table_descriptor_key(name))?.is_some(),
            Error::TableNotFound
        );
        let indexes: Vec<String> = self
            .list_indexes()?
            .into_iter()
            .filter(|cfg| cfg.table_name == name)
            .map(|cfg| cfg.index_name)
            .collect();
        for index_name in indexes {
            self.drop_index(&index_name)?;
        }
        self.meta_delete(&table_descriptor_key(name))?;
        self.inner.drop_store(name)?;
        debug!(table = name, "dropped table");
        Ok(())
    }

    /// Lists table names in lexicographic order.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.list_descriptors(b"table")
    }

    /// Renames a table, copying its store and retargeting its indexes.
    pub fn rename_table(&mut self, old: &str, new: &str) -> Result<()> {
        validate_name(new)?;
        let cfg = self.table_config(old)?;
        ensure!(
            self.meta_get(&table_descriptor_key(new))?.is_none(),
            Error::TableAlreadyExists
        );

        self.inner.create_store(new)?;
        {
            let src = self.inner.store(old)?;
            let mut dst = self.inner.store(new)?;
            src.ascend_greater_or_equal(None, &mut |k, v| dst.put(k, v))?;
        }
        self.inner.drop_store(old)?;

        self.meta_delete(&table_descriptor_key(old))?;
        self.save_table_config(new, &cfg)?;

        for mut index_cfg in self.list_indexes()? {
            if index_cfg.table_name == old {
                index_cfg.table_name = new.to_string();
                self.save_index_config(&index_cfg)?;
            }
        }
        debug!(from = old, to = new, "renamed table");
        Ok(())
    }

    /// Creates an index and backfills it from the table's current records.
    pub fn create_index(&mut self, cfg: IndexConfig) -> Result<()> {
        validate_name(&cfg.index_name)?;
        ensure!(
            self.meta_get(&table_descriptor_key(&cfg.table_name))?.is_some(),
            Error::TableNotFound
        );
        ensure!(
            self.meta_get(&index_descriptor_key(&cfg.index_name))?.is_none(),
            Error::IndexAlreadyExists
        );

        let store_name = index_store_name(&cfg.index_name);
        self.inner.create_store(&store_name)?;
        self.save_index_config(&cfg)?;

        // backfill from existing records
        let table = self.get_table(&cfg.table_name)?;
        let mut idx = Index::new(self.inner.store(&store_name)?, cfg.unique);
        table.iterate(&mut |rec| {
            if let Some(value_key) = table::indexed_key(rec, &cfg.field_name)? {
                let key = rec
                    .key()
                    .ok_or_else(|| eyre::eyre!("table records always carry a key"))?;
                idx.set(&value_key, &key.data)?;
            }
            Ok(())
        })?;

        debug!(index = cfg.index_name.as_str(), table = cfg.table_name.as_str(), "created index");
        Ok(())
    }

    /// Drops an index and its backing store. Fails `IndexNotFound`.
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        ensure!(
            self.meta_get(&index_descriptor_key(name))?.is_some(),
            Error::IndexNotFound
        );
        self.meta_delete(&index_descriptor_key(name))?;
        self.inner.drop_store(&index_store_name(name))?;
        debug!(index = name, "dropped index");
        Ok(())
    }

    /// Lists every index descriptor.
    pub fn list_indexes(&self) -> Result<Vec<IndexConfig>> {
        let names = self.list_descriptors(b"index")?;
        names
            .into_iter()
            .map(|name| self.index_config(&name))
            .collect()
    }

    /// Opens one index by name. Fails `IndexNotFound`.
    pub fn get_index<'s>(&'s self, name: &str) -> Result<(IndexConfig, Index<'s>)> {
        let cfg = self.index_config(name)?;
        let store = self.inner.store(&index_store_name(name))?;
        let unique = cfg.unique;
        Ok((cfg, Index::new(store, unique)))
    }

    pub(crate) fn open_table_indexes<'s>(
        &'s self,
        table_name: &str,
    ) -> Result<Vec<(IndexConfig, Index<'s>)>> {
        let mut out = Vec::new();
        for cfg in self.list_indexes()? {
            if cfg.table_name == table_name {
                let store = self.inner.store(&index_store_name(&cfg.index_name))?;
                let unique = cfg.unique;
                out.push((cfg, Index::new(store, unique)));
            }
        }
        Ok(out)
    }

    pub(crate) fn save_table_config(&self, name: &str, cfg: &TableConfig) -> Result<()> {
        self.meta_put(&table_descriptor_key(name), &encode_table_config(cfg)?)
    }

    fn save_index_config(&self, cfg: &IndexConfig) -> Result<()> {
        self.meta_put(
            &index_descriptor_key(&cfg.index_name),
            &encode_index_config(cfg)?,
        )
    }

    pub(crate) fn table_config(&self, name: &str) -> Result<TableConfig> {
        match self.meta_get(&table_descriptor_key(name))? {
            Some(body) => decode_table_config(&body),
            None => Err(eyre::Report::new(Error::TableNotFound)),
        }
    }

    fn index_config(&self, name: &str) -> Result<IndexConfig> {
        match self.meta_get(&index_descriptor_key(name))? {
            Some(body) => decode_index_config(name, &body),
            None => Err(eyre::Report::new(Error::IndexNotFound)),
        }
    }

    fn list_descriptors(&self, kind: &[u8]) -> Result<Vec<String>> {
        let mut prefix = kind.to_vec();
        prefix.push(NAME_SEPARATOR);
        let meta = self.inner.store(META_STORE)?;
        let mut names = Vec::new();
        let res = meta.ascend_greater_or_equal(Some(&prefix), &mut |k, _| {
            if !k.starts_with(&prefix) {
                return Err(crate::errors::stop_scan());
            }
            let name = std::str::from_utf8(&k[prefix.len()..]).map_err(|_| {
                eyre::Report::new(Error::InvalidEncoding("descriptor name is not UTF-8"))
            })?;
            names.push(name.to_string());
            Ok(())
        });
        crate::errors::absorb_stop(res)?;
        Ok(names)
    }

    fn meta_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let meta = self.inner.store(META_STORE)?;
        match meta.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if Error::KeyNotFound.is(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn meta_put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut meta = self.inner.store(META_STORE)?;
        meta.put(key, value)
    }

    fn meta_delete(&self, key: &[u8]) -> Result<()> {
        let mut meta = self.inner.store(META_STORE)?;
        meta.delete(key)
    }
}

fn encode_table_config(cfg: &TableConfig) -> Result<Vec<u8>> {
    let mut fb = FieldBuffer::new();
    if let Some(pk) = &cfg.primary_key {
        fb.add(Field::new("primary_key_name", Value::string(pk.field.clone())))
            .add(Field::new("primary_key_type", Value::uint8(pk.ty.tag())));
    }
    fb.add(Field::new("last_key", Value::uint64(cfg.last_key)));
    encode_record(&fb)
}

fn decode_table_config(body: &[u8]) -> Result<TableConfig> {
    let fb = decode_record(body)?;
    let primary_key = match fb.field("primary_key_name") {
        Ok(f) => {
            let field = f.value.decode_string()?.to_string();
            let tag = fb.field("primary_key_type")?.value.to_i128()? as u8;
            Some(PrimaryKey {
                field,
                ty: Type::from_tag(tag)?,
            })
        }
        Err(_) => None,
    };
    let last_key = fb.field("last_key")?.value.to_i128()? as u64;
    Ok(TableConfig {
        primary_key,
        last_key,
    })
}

fn encode_index_config(cfg: &IndexConfig) -> Result<Vec<u8>> {
    let mut fb = FieldBuffer::new();
    fb.add(Field::new("table_name", Value::string(cfg.table_name.clone())))
        .add(Field::new("field_name", Value::string(cfg.field_name.clone())))
        .add(Field::new("unique", Value::bool(cfg.unique)));
    encode_record(&fb)
}

fn decode_index_config(name: &str, body: &[u8]) -> Result<IndexConfig> {
    let fb = decode_record(body)?;
    Ok(IndexConfig {
        index_name: name.to_string(),
        table_name: fb.field("table_name")?.value.decode_string()?.to_string(),
        field_name: fb.field("field_name")?.value.decode_string()?.to_string(),
        unique: fb.field("unique")?.value.decode_bool()?,
    })
}
