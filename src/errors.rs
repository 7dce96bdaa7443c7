//! # Error Taxonomy
//!
//! This module defines the typed errors surfaced by the public API. All
//! fallible operations return `eyre::Result`; errors that callers need to
//! match on (catalog guards, constraint violations, transaction misuse) are
//! raised as `Error` values so they can be recovered with
//! `Report::downcast_ref::<Error>()`.
//!
//! Everything else (corruption details, parse diagnostics, engine-specific
//! failures) is reported as a contextual `eyre` error and is not meant to be
//! matched programmatically. Parse failures carry a dedicated
//! [`crate::sql::ParseError`] with position information.

use thiserror::Error;

/// Errors that are part of the public contract and can be matched by kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("table not found")]
    TableNotFound,
    #[error("table already exists")]
    TableAlreadyExists,
    #[error("index not found")]
    IndexNotFound,
    #[error("index already exists")]
    IndexAlreadyExists,
    #[error("store not found")]
    StoreNotFound,
    #[error("store already exists")]
    StoreAlreadyExists,
    #[error("key not found")]
    KeyNotFound,
    #[error("field not found")]
    FieldNotFound,
    #[error("duplicate record")]
    DuplicateRecord,
    #[error("duplicate value for unique index")]
    DuplicateIndexValue,
    #[error("transaction is read-only")]
    TransactionReadOnly,
    #[error("transaction has been discarded")]
    TransactionDiscarded,
    #[error("transaction promotion is not supported by this engine")]
    PromotionUnsupported,
    #[error("result has already been closed")]
    ResultClosed,
    #[error("arity mismatch: {expected} fields but {found} values")]
    ArityMismatch { expected: usize, found: usize },
    #[error("invalid encoding: {0}")]
    InvalidEncoding(&'static str),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

impl Error {
    /// Returns true if `err` is this exact error kind.
    pub fn is(&self, err: &eyre::Report) -> bool {
        err.downcast_ref::<Error>() == Some(self)
    }
}

/// Marker returned by scan callbacks to end iteration early. The KV contract
/// returns callback errors verbatim, so the initiating caller absorbs this
/// marker with [`absorb_stop`] and treats the scan as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("scan stopped")]
pub(crate) struct ScanStopped;

pub(crate) fn stop_scan() -> eyre::Report {
    eyre::Report::new(ScanStopped)
}

pub(crate) fn absorb_stop(res: eyre::Result<()>) -> eyre::Result<()> {
    match res {
        Err(e) if e.downcast_ref::<ScanStopped>().is_some() => Ok(()),
        other => other,
    }
}
