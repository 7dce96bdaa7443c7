//! # Records and the Body Codec
//!
//! A record is an ordered sequence of named, typed fields. Records are
//! self-describing: the stored body carries every field's name and tag, so
//! no schema is needed to read one back.
//!
//! ## Record Binary Layout
//!
//! For each field, in the record's iteration order:
//!
//! ```text
//! varint(len(name)) || name || tag byte || varint(len(data)) || data
//! ```
//!
//! ## Carriers
//!
//! Three concrete carriers implement [`Record`]:
//!
//! - [`FieldBuffer`]: the universal mutable record, used wherever fields are
//!   assembled or rewritten (INSERT sources, UPDATE copies, projections)
//! - [`EncodedRecord`]: a record read back from a table store; decodes its
//!   body lazily and knows its own key
//! - user-supplied types that implement the trait directly
//!
//! The `key` method is the optional "keyer" capability: carriers that came
//! out of a table return the typed record key, everything else returns
//! `None` and cannot be addressed by UPDATE/DELETE or `key()`.

pub mod stream;

use crate::encoding::varint::{read_uvarint, write_uvarint};
use crate::errors::Error;
use crate::value::{Type, Value};
use eyre::{bail, ensure, Result};
use smallvec::SmallVec;
use std::io::Write;

/// A named, typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: Value) -> Field {
        Field {
            name: name.into(),
            value,
        }
    }
}

/// Capability set shared by every record carrier.
pub trait Record {
    /// Calls `f` for every field in the record's iteration order.
    fn iterate(&self, f: &mut dyn FnMut(&Field) -> Result<()>) -> Result<()>;

    /// Returns the named field, failing with `FieldNotFound` if absent.
    fn field(&self, name: &str) -> Result<Field>;

    /// The typed record key, for carriers that know it. The value's bytes
    /// are the raw store key; its tag is the key's decoded type.
    fn key(&self) -> Option<Value> {
        None
    }
}

/// In-memory record: an ordered field list with insertion-order iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldBuffer {
    fields: SmallVec<[Field; 8]>,
}

impl FieldBuffer {
    pub fn new() -> FieldBuffer {
        FieldBuffer::default()
    }

    pub fn add(&mut self, field: Field) -> &mut Self {
        self.fields.push(field);
        self
    }

    /// Replaces the value of an existing field, keeping its position.
    pub fn replace(&mut self, name: &str, value: Value) -> Result<()> {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                field.value = value;
                Ok(())
            }
            None => bail!(Error::FieldNotFound),
        }
    }

    /// Clears the buffer and copies every field of `r` into it. This is the
    /// "scanner" capability: any record can be materialized into a buffer.
    pub fn scan_record(&mut self, r: &dyn Record) -> Result<()> {
        self.fields.clear();
        r.iterate(&mut |field| {
            self.fields.push(field.clone());
            Ok(())
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }
}

impl Record for FieldBuffer {
    fn iterate(&self, f: &mut dyn FnMut(&Field) -> Result<()>) -> Result<()> {
        for field in &self.fields {
            f(field)?;
        }
        Ok(())
    }

    fn field(&self, name: &str) -> Result<Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| eyre::Report::new(Error::FieldNotFound))
    }
}

/// Encodes a record into the stored body format.
pub fn encode_record(rec: &dyn Record) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    rec.iterate(&mut |field| {
        write_uvarint(field.name.len() as u64, &mut buf);
        buf.extend_from_slice(field.name.as_bytes());
        buf.push(field.value.ty.tag());
        write_uvarint(field.value.data.len() as u64, &mut buf);
        buf.extend_from_slice(&field.value.data);
        Ok(())
    })?;
    Ok(buf)
}

/// Decodes a stored body into a fresh buffer.
pub fn decode_record(body: &[u8]) -> Result<FieldBuffer> {
    let mut fb = FieldBuffer::new();
    iterate_body(body, &mut |field| {
        fb.add(field);
        Ok(())
    })?;
    Ok(fb)
}

fn iterate_body(body: &[u8], f: &mut dyn FnMut(Field) -> Result<()>) -> Result<()> {
    let mut rest = body;
    while !rest.is_empty() {
        let (name_len, n) = read_uvarint(rest)?;
        rest = &rest[n..];
        ensure!(
            rest.len() >= name_len as usize,
            Error::InvalidEncoding("truncated field name")
        );
        let name = std::str::from_utf8(&rest[..name_len as usize])
            .map_err(|_| eyre::Report::new(Error::InvalidEncoding("field name is not UTF-8")))?
            .to_string();
        rest = &rest[name_len as usize..];

        ensure!(
            !rest.is_empty(),
            Error::InvalidEncoding("missing field type tag")
        );
        let ty = Type::from_tag(rest[0])?;
        rest = &rest[1..];

        let (data_len, n) = read_uvarint(rest)?;
        rest = &rest[n..];
        ensure!(
            rest.len() >= data_len as usize,
            Error::InvalidEncoding("truncated field data")
        );
        let value = Value::from_raw(ty, rest[..data_len as usize].to_vec())?;
        rest = &rest[data_len as usize..];

        f(Field { name, value })?;
    }
    Ok(())
}

/// A record read back from a table store. The body is decoded on demand;
/// the key is carried alongside so executors can address the record.
#[derive(Debug, Clone)]
pub struct EncodedRecord {
    key: Value,
    body: Vec<u8>,
}

impl EncodedRecord {
    pub fn new(key: Value, body: Vec<u8>) -> EncodedRecord {
        EncodedRecord { key, body }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl Record for EncodedRecord {
    fn iterate(&self, f: &mut dyn FnMut(&Field) -> Result<()>) -> Result<()> {
        iterate_body(&self.body, &mut |field| f(&field))
    }

    fn field(&self, name: &str) -> Result<Field> {
        let mut found = None;
        let res = iterate_body(&self.body, &mut |field| {
            if field.name == name {
                found = Some(field);
                return Err(crate::errors::stop_scan());
            }
            Ok(())
        });
        crate::errors::absorb_stop(res)?;
        found.ok_or_else(|| eyre::Report::new(Error::FieldNotFound))
    }

    fn key(&self) -> Option<Value> {
        Some(self.key.clone())
    }
}

/// Writes one record as a CSV row. Values containing separators or quotes
/// are double-quoted.
pub fn write_csv_row<W: Write>(w: &mut W, rec: &dyn Record) -> Result<()> {
    let mut first = true;
    rec.iterate(&mut |field| {
        if !first {
            w.write_all(b",")?;
        }
        first = false;
        let text = field.value.to_string();
        if text.contains([',', '"', '\n']) {
            write!(w, "\"{}\"", text.replace('"', "\"\""))?;
        } else {
            w.write_all(text.as_bytes())?;
        }
        Ok(())
    })?;
    w.write_all(b"\n")?;
    Ok(())
}
