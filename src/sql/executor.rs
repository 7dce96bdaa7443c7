//! # Statement Execution
//!
//! Runs parsed statements against a transaction. DDL and writes execute
//! eagerly; SELECT only validates and returns its plan, which the query
//! result drives lazily through [`run_select`].
//!
//! ## Index selection
//!
//! A SELECT scans the whole table unless its WHERE clause is a conjunction
//! containing `field = const` or a range against a constant (literal or
//! parameter). Primary-key equality becomes a point lookup. Otherwise the
//! candidate indexes are ranked: unique before list, then smallest index
//! name, then equality before range. The full WHERE clause always stays on
//! the stream as a residual filter, so the scan only has to be complete,
//! never exact.

use super::ast::*;
use super::eval::{eval, resolve_param, EvalContext, Param, ParamValue};
use crate::database::table::{Table, TableConfig};
use crate::database::Transaction;
use crate::encoding::key::{ordered_key, same_group};
use crate::errors::{absorb_stop, stop_scan, Error};
use crate::record::stream::{RecordSource, Stream};
use crate::record::{Field, FieldBuffer, Record};
use crate::value::{Comparison, Value};
use eyre::{bail, ensure, Result};
use hashbrown::HashSet;
use std::cmp::Ordering;

/// What a statement produced. SELECT carries its plan; everything else
/// reports its effects.
#[derive(Debug, Default)]
pub(crate) struct StatementOutcome {
    pub rows_affected: usize,
    pub last_insert_key: Option<Vec<u8>>,
    pub select: Option<SelectStmt>,
}

pub(crate) fn execute(
    stmt: &Statement,
    tx: &mut Transaction<'_>,
    params: &[Param],
) -> Result<StatementOutcome> {
    match stmt {
        Statement::CreateTable(stmt) => execute_create_table(stmt, tx),
        Statement::CreateIndex(stmt) => execute_create_index(stmt, tx),
        Statement::DropTable(stmt) => execute_drop_table(stmt, tx),
        Statement::DropIndex(stmt) => execute_drop_index(stmt, tx),
        Statement::Insert(stmt) => execute_insert(stmt, tx, params),
        Statement::Select(stmt) => execute_select(stmt, tx),
        Statement::Update(stmt) => execute_update(stmt, tx, params),
        Statement::Delete(stmt) => execute_delete(stmt, tx, params),
    }
}

fn execute_create_table(stmt: &CreateTableStmt, tx: &mut Transaction<'_>) -> Result<StatementOutcome> {
    let cfg = stmt
        .primary_key
        .as_ref()
        .map(|(field, ty)| TableConfig::with_primary_key(field.clone(), *ty));
    match tx.create_table(&stmt.table_name, cfg) {
        Err(e) if stmt.if_not_exists && Error::TableAlreadyExists.is(&e) => {}
        other => other?,
    }
    Ok(StatementOutcome::default())
}

fn execute_create_index(stmt: &CreateIndexStmt, tx: &mut Transaction<'_>) -> Result<StatementOutcome> {
    let cfg = crate::database::index::IndexConfig {
        index_name: stmt.index_name.clone(),
        table_name: stmt.table_name.clone(),
        field_name: stmt.field_name.clone(),
        unique: stmt.unique,
    };
    match tx.create_index(cfg) {
        Err(e) if stmt.if_not_exists && Error::IndexAlreadyExists.is(&e) => {}
        other => other?,
    }
    Ok(StatementOutcome::default())
}

fn execute_drop_table(stmt: &DropStmt, tx: &mut Transaction<'_>) -> Result<StatementOutcome> {
    match tx.drop_table(&stmt.name) {
        Err(e) if stmt.if_exists && Error::TableNotFound.is(&e) => {}
        other => other?,
    }
    Ok(StatementOutcome::default())
}

fn execute_drop_index(stmt: &DropStmt, tx: &mut Transaction<'_>) -> Result<StatementOutcome> {
    match tx.drop_index(&stmt.name) {
        Err(e) if stmt.if_exists && Error::IndexNotFound.is(&e) => {}
        other => other?,
    }
    Ok(StatementOutcome::default())
}

fn execute_insert(
    stmt: &InsertStmt,
    tx: &mut Transaction<'_>,
    params: &[Param],
) -> Result<StatementOutcome> {
    let mut table = tx.get_table(&stmt.table_name)?;
    let mut outcome = StatementOutcome::default();
    let ctx = EvalContext::new(params);

    match &stmt.source {
        InsertSource::Values(rows) => {
            ensure!(
                !stmt.field_names.is_empty(),
                "INSERT with VALUES requires a field list"
            );
            for row in rows {
                if row.len() != stmt.field_names.len() {
                    bail!(Error::ArityMismatch {
                        expected: stmt.field_names.len(),
                        found: row.len(),
                    });
                }
                let mut fb = FieldBuffer::new();
                for (name, expr) in stmt.field_names.iter().zip(row) {
                    let value = eval(expr, &ctx)?.into_value()?;
                    fb.add(Field::new(name.clone(), value));
                }
                outcome.last_insert_key = Some(table.insert(&fb)?);
                outcome.rows_affected += 1;
            }
        }
        InsertSource::Records(specs) => {
            for spec in specs {
                let fb = match spec {
                    RecordSpec::Pairs(pairs) => {
                        let mut seen = HashSet::new();
                        let mut fb = FieldBuffer::new();
                        for (name, expr) in pairs {
                            ensure!(
                                seen.insert(name.as_str()),
                                "duplicate field {name} in record"
                            );
                            let value = eval(expr, &ctx)?.into_value()?;
                            fb.add(Field::new(name.clone(), value));
                        }
                        fb
                    }
                    RecordSpec::Param(r) => match resolve_param(params, r)? {
                        ParamValue::Record(fb) => fb.clone(),
                        ParamValue::Value(_) => bail!(Error::TypeMismatch(
                            "RECORDS parameter must be bound to a record".into()
                        )),
                    },
                };
                outcome.last_insert_key = Some(table.insert(&fb)?);
                outcome.rows_affected += 1;
            }
        }
    }

    Ok(outcome)
}

fn execute_select(stmt: &SelectStmt, tx: &mut Transaction<'_>) -> Result<StatementOutcome> {
    // validate eagerly so a bad table name fails the statement, not the
    // later stream iteration
    tx.get_table(&stmt.table_name)?;
    Ok(StatementOutcome {
        select: Some(stmt.clone()),
        ..StatementOutcome::default()
    })
}

fn execute_update(
    stmt: &UpdateStmt,
    tx: &mut Transaction<'_>,
    params: &[Param],
) -> Result<StatementOutcome> {
    ensure!(!stmt.assignments.is_empty(), "UPDATE requires a SET clause");
    let mut table = tx.get_table(&stmt.table_name)?;

    let mut updates: Vec<(Vec<u8>, FieldBuffer)> = Vec::new();
    {
        let stream = Stream::new(TableSource { table: &table })
            .filter(where_filter(stmt.where_expr.as_ref(), params));
        stream.iterate(&mut |r| {
            let key = r
                .key()
                .ok_or_else(|| eyre::eyre!("attempt to update a record without a key"))?;
            let mut fb = FieldBuffer::new();
            fb.scan_record(r)?;
            let ctx = EvalContext::with_record(params, r);
            for (name, expr) in &stmt.assignments {
                // a record that does not carry the field keeps its shape
                if fb.field(name).is_err() {
                    continue;
                }
                let value = eval(expr, &ctx)?.into_value()?;
                fb.replace(name, value)?;
            }
            updates.push((key.data, fb));
            Ok(())
        })?;
    }

    for (key, fb) in &updates {
        table.replace(key, fb)?;
    }

    Ok(StatementOutcome {
        rows_affected: updates.len(),
        ..StatementOutcome::default()
    })
}

fn execute_delete(
    stmt: &DeleteStmt,
    tx: &mut Transaction<'_>,
    params: &[Param],
) -> Result<StatementOutcome> {
    let mut table = tx.get_table(&stmt.table_name)?;

    // collect first: deleting while the scan runs is undefined
    let mut keys: Vec<Vec<u8>> = Vec::new();
    {
        let stream = Stream::new(TableSource { table: &table })
            .filter(where_filter(stmt.where_expr.as_ref(), params));
        stream.iterate(&mut |r| {
            let key = r
                .key()
                .ok_or_else(|| eyre::eyre!("attempt to delete a record without a key"))?;
            keys.push(key.data);
            Ok(())
        })?;
    }

    for key in &keys {
        table.delete(key)?;
    }

    Ok(StatementOutcome {
        rows_affected: keys.len(),
        ..StatementOutcome::default()
    })
}

/// Drives a SELECT plan, calling `f` with each projected row.
pub(crate) fn run_select(
    tx: &Transaction<'_>,
    stmt: &SelectStmt,
    params: &[Param],
    f: &mut dyn FnMut(&dyn Record) -> Result<()>,
) -> Result<()> {
    let table = tx.get_table(&stmt.table_name)?;
    let limit = eval_bound(stmt.limit.as_ref(), params, "LIMIT")?;
    let offset = eval_bound(stmt.offset.as_ref(), params, "OFFSET")?;

    let plan = pick_source(&table, stmt.where_expr.as_ref(), params)?;
    let base = match plan {
        SourcePlan::Full => Stream::new(TableSource { table: &table }),
        SourcePlan::PkLookup(key) => Stream::new(PkLookupSource { table: &table, key }),
        SourcePlan::IndexScan {
            index_name,
            op,
            probe,
        } => {
            let (_, index) = tx.get_index(&index_name)?;
            Stream::new(IndexScanSource {
                table: &table,
                index,
                op,
                probe,
            })
        }
    };
    let filtered = base.filter(where_filter(stmt.where_expr.as_ref(), params));

    match &stmt.order_by {
        None => {
            let mut stream = filtered;
            if let Some(n) = offset {
                stream = stream.offset(n);
            }
            if let Some(n) = limit {
                stream = stream.limit(n);
            }
            stream.iterate(&mut |r| {
                let row = project(r, &stmt.selectors)?;
                f(&row)
            })
        }
        Some(order) => {
            // ORDER BY materializes the filtered records, sorts, then
            // applies offset/limit before projecting
            let mut rows: Vec<(Option<Value>, KeyedRecord)> = Vec::new();
            filtered.iterate(&mut |r| {
                let sort_key = match r.field(&order.field) {
                    Ok(field) if !field.value.is_null() => Some(field.value),
                    _ => None,
                };
                let mut fields = FieldBuffer::new();
                fields.scan_record(r)?;
                rows.push((
                    sort_key,
                    KeyedRecord {
                        fields,
                        key: r.key(),
                    },
                ));
                Ok(())
            })?;

            rows.sort_by(|a, b| compare_sort_keys(&a.0, &b.0));
            if order.direction == Direction::Desc {
                rows.reverse();
            }

            let skip = offset.unwrap_or(0);
            let take = limit.unwrap_or(usize::MAX);
            for (_, rec) in rows.iter().skip(skip).take(take) {
                let row = project(rec, &stmt.selectors)?;
                f(&row)?;
            }
            Ok(())
        }
    }
}

/// Null (or absent) sorts before every value; unrelated kinds keep their
/// relative order.
fn compare_sort_keys(a: &Option<Value>, b: &Option<Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match x.compare(y) {
            Ok(Comparison::Ordered(ord)) => ord,
            _ => Ordering::Equal,
        },
    }
}

fn eval_bound(expr: Option<&Expr>, params: &[Param], clause: &str) -> Result<Option<usize>> {
    let Some(expr) = expr else { return Ok(None) };
    let value = eval(expr, &EvalContext::new(params))?.into_value()?;
    let n = value.to_i128()?;
    ensure!(n >= 0, "{clause} cannot be negative");
    Ok(Some(n as usize))
}

fn where_filter<'x>(
    expr: Option<&'x Expr>,
    params: &'x [Param],
) -> impl Fn(&dyn Record) -> Result<bool> + 'x {
    move |r| match expr {
        None => Ok(true),
        Some(e) => eval(e, &EvalContext::with_record(params, r))?.truthy(),
    }
}

/// Builds one projected row out of a record.
fn project(rec: &dyn Record, selectors: &[Selector]) -> Result<FieldBuffer> {
    let mut fb = FieldBuffer::new();
    for selector in selectors {
        match selector {
            Selector::Wildcard => {
                rec.iterate(&mut |field| {
                    fb.add(field.clone());
                    Ok(())
                })?;
            }
            Selector::Field(name) => match rec.field(name) {
                Ok(field) => {
                    fb.add(field);
                }
                Err(e) if Error::FieldNotFound.is(&e) => {
                    fb.add(Field::new(name.clone(), Value::null()));
                }
                Err(e) => return Err(e),
            },
            Selector::Key => {
                let key = rec
                    .key()
                    .ok_or_else(|| eyre::eyre!("key() on a record without a key"))?;
                fb.add(Field::new("key()", key));
            }
        }
    }
    Ok(fb)
}

/// A projected row that still knows its record key.
struct KeyedRecord {
    fields: FieldBuffer,
    key: Option<Value>,
}

impl Record for KeyedRecord {
    fn iterate(&self, f: &mut dyn FnMut(&Field) -> Result<()>) -> Result<()> {
        self.fields.iterate(f)
    }

    fn field(&self, name: &str) -> Result<Field> {
        self.fields.field(name)
    }

    fn key(&self) -> Option<Value> {
        self.key.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOp {
    fn flip(self) -> RangeOp {
        match self {
            RangeOp::Eq => RangeOp::Eq,
            RangeOp::Gt => RangeOp::Lt,
            RangeOp::Gte => RangeOp::Lte,
            RangeOp::Lt => RangeOp::Gt,
            RangeOp::Lte => RangeOp::Gte,
        }
    }
}

#[derive(Debug, PartialEq)]
enum SourcePlan {
    Full,
    /// Point lookup by primary key; `None` means the probe cannot be
    /// converted to the key type and matches nothing.
    PkLookup(Option<Vec<u8>>),
    IndexScan {
        index_name: String,
        op: RangeOp,
        probe: Vec<u8>,
    },
}

fn pick_source(
    table: &Table<'_>,
    where_expr: Option<&Expr>,
    params: &[Param],
) -> Result<SourcePlan> {
    let Some(where_expr) = where_expr else {
        return Ok(SourcePlan::Full);
    };

    let mut conjuncts = Vec::new();
    collect_conjuncts(where_expr, &mut conjuncts);
    let candidates: Vec<(String, RangeOp, Value)> = conjuncts
        .iter()
        .filter_map(|e| comparison_candidate(e, params))
        .collect();

    // primary-key equality beats any index
    if let Some(pk) = &table.config().primary_key {
        for (field, op, value) in &candidates {
            if *op == RangeOp::Eq && field == &pk.field {
                let key = value.convert_to(pk.ty).ok().map(|v| v.data);
                return Ok(SourcePlan::PkLookup(key));
            }
        }
    }

    let index_cfgs: Vec<_> = table.indexes()?.into_iter().map(|(cfg, _)| cfg).collect();
    // rank: unique first, then name, then equality before range
    let mut best: Option<((bool, String, bool), RangeOp, Value, String)> = None;
    for (field, op, value) in candidates {
        for cfg in index_cfgs.iter().filter(|c| c.field_name == field) {
            let rank = (!cfg.unique, cfg.index_name.clone(), op != RangeOp::Eq);
            let better = match &best {
                None => true,
                Some((current, ..)) => rank < *current,
            };
            if better {
                best = Some((rank, op, value.clone(), cfg.index_name.clone()));
            }
        }
    }

    if let Some((_, op, value, index_name)) = best {
        if let Some(probe) = ordered_key(&value)? {
            return Ok(SourcePlan::IndexScan {
                index_name,
                op,
                probe,
            });
        }
    }
    Ok(SourcePlan::Full)
}

fn collect_conjuncts<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    if let Expr::Binary {
        op: BinaryOp::And,
        lhs,
        rhs,
    } = expr
    {
        collect_conjuncts(lhs, out);
        collect_conjuncts(rhs, out);
    } else {
        out.push(expr);
    }
}

/// Recognizes `field <op> const` (or the flipped form) in a conjunct.
fn comparison_candidate(expr: &Expr, params: &[Param]) -> Option<(String, RangeOp, Value)> {
    let Expr::Binary { op, lhs, rhs } = expr else {
        return None;
    };
    let op = match op {
        BinaryOp::Eq => RangeOp::Eq,
        BinaryOp::Lt => RangeOp::Lt,
        BinaryOp::Lte => RangeOp::Lte,
        BinaryOp::Gt => RangeOp::Gt,
        BinaryOp::Gte => RangeOp::Gte,
        _ => return None,
    };
    if let Expr::Ident(field) = &**lhs {
        if let Some(value) = const_value(rhs, params) {
            return Some((field.clone(), op, value));
        }
    }
    if let Expr::Ident(field) = &**rhs {
        if let Some(value) = const_value(lhs, params) {
            return Some((field.clone(), op.flip(), value));
        }
    }
    None
}

fn const_value(expr: &Expr, params: &[Param]) -> Option<Value> {
    match expr {
        Expr::Literal(v) => Some(v.clone()),
        Expr::Param(r) => match resolve_param(params, r) {
            Ok(ParamValue::Value(v)) => Some(v.clone()),
            _ => None,
        },
        _ => None,
    }
}

struct TableSource<'t, 'a> {
    table: &'t Table<'a>,
}

impl RecordSource for TableSource<'_, '_> {
    fn iterate(&self, f: &mut dyn FnMut(&dyn Record) -> Result<()>) -> Result<()> {
        self.table.iterate(f)
    }
}

struct PkLookupSource<'t, 'a> {
    table: &'t Table<'a>,
    key: Option<Vec<u8>>,
}

impl RecordSource for PkLookupSource<'_, '_> {
    fn iterate(&self, f: &mut dyn FnMut(&dyn Record) -> Result<()>) -> Result<()> {
        let Some(key) = &self.key else { return Ok(()) };
        if let Some(rec) = self.table.get(key)? {
            f(&rec)?;
        }
        Ok(())
    }
}

struct IndexScanSource<'t, 'a> {
    table: &'t Table<'a>,
    index: crate::database::index::Index<'a>,
    op: RangeOp,
    probe: Vec<u8>,
}

impl RecordSource for IndexScanSource<'_, '_> {
    fn iterate(&self, f: &mut dyn FnMut(&dyn Record) -> Result<()>) -> Result<()> {
        let lookup = |record_key: &[u8], f: &mut dyn FnMut(&dyn Record) -> Result<()>| {
            match self.table.get(record_key)? {
                Some(rec) => f(&rec),
                None => bail!("index entry points at a missing record"),
            }
        };

        match self.op {
            RangeOp::Eq => absorb_stop(self.index.ascend_greater_or_equal(
                Some(&self.probe),
                &mut |value, key| {
                    if value != self.probe.as_slice() {
                        return Err(stop_scan());
                    }
                    lookup(key, f)
                },
            )),
            RangeOp::Gt | RangeOp::Gte => absorb_stop(self.index.ascend_greater_or_equal(
                Some(&self.probe),
                &mut |value, key| {
                    if !same_group(value, &self.probe) {
                        return Err(stop_scan());
                    }
                    if self.op == RangeOp::Gt && value == self.probe.as_slice() {
                        return Ok(());
                    }
                    lookup(key, f)
                },
            )),
            RangeOp::Lt | RangeOp::Lte => absorb_stop(self.index.descend_less_or_equal(
                Some(&self.probe),
                &mut |value, key| {
                    if !same_group(value, &self.probe) {
                        return Err(stop_scan());
                    }
                    if self.op == RangeOp::Lt && value == self.probe.as_slice() {
                        return Ok(());
                    }
                    lookup(key, f)
                },
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_eq(field: &str, value: Value) -> Expr {
        Expr::Binary {
            op: BinaryOp::Eq,
            lhs: Box::new(Expr::Ident(field.into())),
            rhs: Box::new(Expr::Literal(value)),
        }
    }

    #[test]
    fn conjuncts_flatten_nested_ands() {
        let expr = Expr::Binary {
            op: BinaryOp::And,
            lhs: Box::new(field_eq("a", Value::int8(1))),
            rhs: Box::new(Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(field_eq("b", Value::int8(2))),
                rhs: Box::new(field_eq("c", Value::int8(3))),
            }),
        };
        let mut out = Vec::new();
        collect_conjuncts(&expr, &mut out);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn candidates_recognize_both_orientations() {
        let expr = field_eq("a", Value::int8(1));
        let got = comparison_candidate(&expr, &[]).unwrap();
        assert_eq!(got.0, "a");
        assert_eq!(got.1, RangeOp::Eq);

        // 3 < a  means  a > 3
        let flipped = Expr::Binary {
            op: BinaryOp::Lt,
            lhs: Box::new(Expr::Literal(Value::int8(3))),
            rhs: Box::new(Expr::Ident("a".into())),
        };
        let got = comparison_candidate(&flipped, &[]).unwrap();
        assert_eq!(got.1, RangeOp::Gt);
    }

    #[test]
    fn params_are_constants_for_planning() {
        let expr = Expr::Binary {
            op: BinaryOp::Eq,
            lhs: Box::new(Expr::Ident("a".into())),
            rhs: Box::new(Expr::Param(ParamRef::Positional(1))),
        };
        let params = [Param::new(9i64)];
        let got = comparison_candidate(&expr, &params).unwrap();
        assert_eq!(got.2, Value::int64(9));
    }

    #[test]
    fn or_disjunctions_produce_no_candidates() {
        let expr = Expr::Binary {
            op: BinaryOp::Or,
            lhs: Box::new(field_eq("a", Value::int8(1))),
            rhs: Box::new(field_eq("b", Value::int8(2))),
        };
        let mut out = Vec::new();
        collect_conjuncts(&expr, &mut out);
        assert_eq!(out.len(), 1);
        assert!(comparison_candidate(out[0], &[]).is_none());
    }

    #[test]
    fn projection_handles_wildcard_fields_and_key() {
        let mut fields = FieldBuffer::new();
        fields
            .add(Field::new("a", Value::string("x")))
            .add(Field::new("b", Value::int8(2)));
        let rec = KeyedRecord {
            fields,
            key: Some(Value::int64(1)),
        };

        let row = project(
            &rec,
            &[
                Selector::Key,
                Selector::Wildcard,
                Selector::Field("missing".into()),
            ],
        )
        .unwrap();
        let names: Vec<_> = row.fields().map(|f| f.name.clone()).collect();
        assert_eq!(names, ["key()", "a", "b", "missing"]);
        assert_eq!(row.field("key()").unwrap().value, Value::int64(1));
        assert!(row.field("missing").unwrap().value.is_null());
    }

    #[test]
    fn sort_keys_put_null_first() {
        let mut keys = vec![
            Some(Value::int8(3)),
            None,
            Some(Value::int8(1)),
        ];
        keys.sort_by(compare_sort_keys);
        assert_eq!(keys[0], None);
        assert_eq!(keys[1], Some(Value::int8(1)));
    }
}
