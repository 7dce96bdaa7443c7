//! # Query Driver
//!
//! Splits query text into statements and manages the transaction around
//! each one. Under [`Database::query`] every statement runs in its own
//! transaction (writable exactly when the statement needs it); the last
//! statement's transaction is inherited by the returned [`QueryResult`] so
//! a SELECT stream can still be iterated, and closing the result finalizes
//! it. Under [`Transaction::exec`]/[`Transaction::query`] the statements
//! share the caller's transaction, promoting it if a write statement needs
//! to and the transaction allows it.

use super::ast::{SelectStmt, Statement};
use super::eval::Param;
use super::executor::{execute, run_select, StatementOutcome};
use super::parser::parse_query;
use crate::database::{Database, Transaction};
use crate::errors::Error;
use crate::record::{write_csv_row, Record};
use eyre::{bail, ensure, Result};
use std::io::Write;
use tracing::{debug, trace};

/// A parsed query: a list of statements.
#[derive(Debug, Clone)]
pub struct Query {
    pub statements: Vec<Statement>,
}

impl Query {
    pub fn parse(input: &str) -> Result<Query> {
        Ok(Query {
            statements: parse_query(input)?,
        })
    }
}

impl Database {
    /// Runs a query and discards its rows, committing each statement.
    pub fn exec(&self, sql: &str, params: &[Param]) -> Result<()> {
        let mut result = self.query(sql, params)?;
        result.close()
    }

    /// Runs a query; the result owns the final statement's transaction and
    /// must be closed.
    pub fn query(&self, sql: &str, params: &[Param]) -> Result<QueryResult<'_>> {
        let query = Query::parse(sql)?;
        let mut tx: Option<Transaction<'_>> = None;
        let mut outcome = StatementOutcome::default();

        for stmt in &query.statements {
            // one transaction per statement: finalize the previous one
            if let Some(prev) = tx.take() {
                if prev.writable() {
                    prev.commit()?;
                } else {
                    prev.rollback()?;
                }
            }

            let writable = !stmt.is_read_only();
            let mut current = self.begin(writable)?;
            trace!(writable, "running statement");
            match execute(stmt, &mut current, params) {
                Ok(o) => {
                    outcome = o;
                    tx = Some(current);
                }
                Err(err) => {
                    debug!("statement failed, rolling back");
                    let _ = current.rollback();
                    return Err(err);
                }
            }
        }

        Ok(QueryResult {
            tx: tx.map(ResultTx::Owned),
            plan: outcome.select,
            params: params.to_vec(),
            rows_affected: outcome.rows_affected,
            last_insert_key: outcome.last_insert_key,
            closed: false,
            consumed: false,
        })
    }
}

impl<'db> Transaction<'db> {
    /// Runs a query inside this transaction, discarding any rows.
    pub fn exec(&mut self, sql: &str, params: &[Param]) -> Result<()> {
        let query = Query::parse(sql)?;
        for stmt in &query.statements {
            self.prepare_write(stmt)?;
            execute(stmt, self, params)?;
        }
        Ok(())
    }

    /// Runs a query inside this transaction. The result borrows the
    /// transaction; closing it does not finalize the transaction.
    pub fn query<'s>(&'s mut self, sql: &str, params: &[Param]) -> Result<QueryResult<'s>> {
        let query = Query::parse(sql)?;
        let mut outcome = StatementOutcome::default();
        for stmt in &query.statements {
            self.prepare_write(stmt)?;
            outcome = execute(stmt, self, params)?;
        }
        Ok(QueryResult {
            tx: Some(ResultTx::Borrowed(&*self)),
            plan: outcome.select,
            params: params.to_vec(),
            rows_affected: outcome.rows_affected,
            last_insert_key: outcome.last_insert_key,
            closed: false,
            consumed: false,
        })
    }

    /// Write statements need a writable transaction: promote when allowed,
    /// fail with `TransactionReadOnly` inside a view.
    fn prepare_write(&mut self, stmt: &Statement) -> Result<()> {
        if !stmt.is_read_only() && !self.writable() {
            if self.promotable {
                self.promote()?;
            } else {
                bail!(Error::TransactionReadOnly);
            }
        }
        Ok(())
    }
}

enum ResultTx<'a> {
    Owned(Transaction<'a>),
    Borrowed(&'a Transaction<'a>),
}

/// Result of a query. Carries the effects of the last statement and, for
/// SELECT, a lazy stream over its rows.
///
/// A result produced by [`Database::query`] owns a transaction and must be
/// closed: closing commits (writable) or rolls back. Dropping an unclosed
/// result rolls back.
pub struct QueryResult<'a> {
    tx: Option<ResultTx<'a>>,
    plan: Option<SelectStmt>,
    params: Vec<Param>,
    rows_affected: usize,
    last_insert_key: Option<Vec<u8>>,
    closed: bool,
    consumed: bool,
}

impl QueryResult<'_> {
    /// Number of records written by the last statement.
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    /// Key of the last inserted record, if the last statement inserted.
    pub fn last_insert_key(&self) -> Option<&[u8]> {
        self.last_insert_key.as_deref()
    }

    /// Streams the rows of the final SELECT, if any. The stream is lazy
    /// and single-shot; iterating a second time is an error.
    pub fn iterate(&mut self, mut f: impl FnMut(&dyn Record) -> Result<()>) -> Result<()> {
        ensure!(!self.closed, Error::ResultClosed);
        let Some(plan) = self.plan.as_ref() else {
            return Ok(());
        };
        ensure!(!self.consumed, "result stream has already been iterated");
        self.consumed = true;

        let tx: &Transaction<'_> = match self.tx.as_ref() {
            Some(ResultTx::Owned(tx)) => tx,
            Some(ResultTx::Borrowed(tx)) => tx,
            None => bail!("result has no transaction to read from"),
        };
        run_select(tx, plan, &self.params, &mut f)
    }

    /// Writes the rows of the final SELECT as CSV.
    pub fn to_csv<W: Write>(&mut self, w: &mut W) -> Result<()> {
        self.iterate(|r| write_csv_row(w, r))
    }

    /// Finalizes the result. Commits an owned writable transaction, rolls
    /// back an owned read-only one, leaves a borrowed one untouched.
    /// Closing twice fails `ResultClosed`.
    pub fn close(&mut self) -> Result<()> {
        ensure!(!self.closed, Error::ResultClosed);
        self.closed = true;
        match self.tx.take() {
            Some(ResultTx::Owned(tx)) => {
                if tx.writable() {
                    tx.commit()
                } else {
                    tx.rollback()
                }
            }
            _ => Ok(()),
        }
    }
}

impl Drop for QueryResult<'_> {
    fn drop(&mut self) {
        // dropping an owned, unclosed transaction rolls it back
        self.tx.take();
        self.closed = true;
    }
}
