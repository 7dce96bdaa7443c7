//! # Strata - Embedded Record Database
//!
//! Strata stores self-describing records in a pluggable ordered key-value
//! engine and exposes them through a small SQL dialect. Applications open
//! a database over an engine, issue SQL text, and iterate results as
//! streams of records with dynamically typed fields.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Public API (Database / Query)     │
//! ├─────────────────────────────────────┤
//! │ SQL Layer (Lexer/Parser/Executor)   │
//! ├─────────────────────────────────────┤
//! │    Catalog │ Tables │ Indexes       │
//! ├─────────────────────────────────────┤
//! │  Record Codec & Ordered Value Codec │
//! ├─────────────────────────────────────┤
//! │   Ordered KV Engine (pluggable)     │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use strata::{Database, MemoryEngine, Record};
//!
//! # fn main() -> eyre::Result<()> {
//! let db = Database::new(MemoryEngine::new())?;
//!
//! db.exec("CREATE TABLE users", &[])?;
//! db.exec("INSERT INTO users (name, age) VALUES ('Alice', 32)", &[])?;
//!
//! let mut rows = db.query("SELECT name, age FROM users WHERE age > 30", &[])?;
//! rows.iterate(|record| {
//!     let name = record.field("name")?;
//!     println!("{}", name.value);
//!     Ok(())
//! })?;
//! rows.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`engine`]: ordered KV engine interface and the in-memory engine
//! - [`value`]: typed values and the order-preserving codec
//! - [`record`]: records, field buffers and lazy streams
//! - [`database`]: catalog, tables and secondary indexes
//! - [`sql`]: lexer, parser, evaluator, executors and the query driver
//!
//! Each statement executes in its own transaction under
//! [`Database::exec`]/[`Database::query`]; explicit transactions are
//! available through [`Database::begin`], [`Database::view`] and
//! [`Database::update`].

pub mod database;
pub mod encoding;
pub mod engine;
pub mod errors;
pub mod record;
pub mod sql;
pub mod value;

pub use database::index::IndexConfig;
pub use database::table::TableConfig;
pub use database::{Database, Transaction};
pub use engine::{Engine, MemoryEngine, Store};
pub use errors::Error;
pub use record::{Field, FieldBuffer, Record};
pub use sql::{Param, ParseError, Query, QueryResult};
pub use value::{Type, Value};
