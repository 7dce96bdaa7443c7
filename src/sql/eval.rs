//! # Expression Evaluation
//!
//! Evaluates expression trees against an optional current record and the
//! statement's bound arguments. Results are either a single value or a
//! list; lists only ever appear as the right-hand side of `IN`.
//!
//! ## Semantics
//!
//! - An identifier resolves against the current record; a missing field is
//!   Null. Without a record in scope (INSERT VALUES position) identifiers
//!   are an error.
//! - Comparisons involving Null are false, whatever the operator. `IS
//!   NULL` is the only way to observe Null. Values of unrelated kinds are
//!   unequal and unordered.
//! - AND/OR short-circuit on truthiness (non-zero, non-empty, true).
//! - Arithmetic stays exact in the i128 domain while both operands are
//!   integers and switches to f64 as soon as a float is involved.

use super::ast::{BinaryOp, Expr, ParamRef};
use crate::errors::Error;
use crate::record::{FieldBuffer, Record};
use crate::value::{Comparison, Value};
use eyre::{bail, Result};
use std::cmp::Ordering;

/// A bound statement argument: a plain value, a named value, or a whole
/// record for `RECORDS ?`.
#[derive(Debug, Clone)]
pub struct Param {
    pub(crate) name: Option<String>,
    pub(crate) value: ParamValue,
}

#[derive(Debug, Clone)]
pub enum ParamValue {
    Value(Value),
    Record(FieldBuffer),
}

impl Param {
    /// Positional argument; its ordinal is its position in the slice.
    pub fn new(value: impl Into<Value>) -> Param {
        Param {
            name: None,
            value: ParamValue::Value(value.into()),
        }
    }

    /// Named argument, addressed as `$name`.
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Param {
        Param {
            name: Some(name.into()),
            value: ParamValue::Value(value.into()),
        }
    }

    /// Whole-record argument for `INSERT INTO t RECORDS ?`.
    pub fn record(record: FieldBuffer) -> Param {
        Param {
            name: None,
            value: ParamValue::Record(record),
        }
    }

    /// Named whole-record argument.
    pub fn named_record(name: impl Into<String>, record: FieldBuffer) -> Param {
        Param {
            name: Some(name.into()),
            value: ParamValue::Record(record),
        }
    }
}

/// Everything an expression may look at during evaluation.
#[derive(Clone, Copy)]
pub(crate) struct EvalContext<'a> {
    pub record: Option<&'a dyn Record>,
    pub params: &'a [Param],
}

impl<'a> EvalContext<'a> {
    pub fn new(params: &'a [Param]) -> EvalContext<'a> {
        EvalContext {
            record: None,
            params,
        }
    }

    pub fn with_record(params: &'a [Param], record: &'a dyn Record) -> EvalContext<'a> {
        EvalContext {
            record: Some(record),
            params,
        }
    }
}

/// An evaluated expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EvalValue {
    Value(Value),
    List(Vec<Value>),
}

impl EvalValue {
    /// Unwraps a single value; lists are an error outside `IN`.
    pub fn into_value(self) -> Result<Value> {
        match self {
            EvalValue::Value(v) => Ok(v),
            EvalValue::List(_) => bail!(Error::TypeMismatch(
                "expected a single value, got a list".into()
            )),
        }
    }

    pub fn truthy(&self) -> Result<bool> {
        match self {
            EvalValue::Value(v) => v.truthy(),
            EvalValue::List(_) => bail!(Error::TypeMismatch(
                "a list has no truth value".into()
            )),
        }
    }
}

/// Looks up a bound argument. Positional ordinals index the argument
/// slice; an ordinal landing on a named argument is an error, names win.
pub(crate) fn resolve_param<'p>(params: &'p [Param], r: &ParamRef) -> Result<&'p ParamValue> {
    match r {
        ParamRef::Positional(ordinal) => {
            let param = params
                .get(ordinal - 1)
                .ok_or_else(|| eyre::eyre!("no argument bound for parameter ?{ordinal}"))?;
            if param.name.is_some() {
                bail!("parameter ?{ordinal} refers to a named argument");
            }
            Ok(&param.value)
        }
        ParamRef::Named(name) => params
            .iter()
            .find(|p| p.name.as_deref() == Some(name.as_str()))
            .map(|p| &p.value)
            .ok_or_else(|| eyre::eyre!("no argument bound for parameter ${name}")),
    }
}

pub(crate) fn eval(expr: &Expr, ctx: &EvalContext<'_>) -> Result<EvalValue> {
    match expr {
        Expr::Literal(v) => Ok(EvalValue::Value(v.clone())),
        Expr::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, ctx)?.into_value()?);
            }
            Ok(EvalValue::List(values))
        }
        Expr::Ident(name) => {
            let Some(record) = ctx.record else {
                bail!("field reference {name} outside of a record context");
            };
            match record.field(name) {
                Ok(field) => Ok(EvalValue::Value(field.value)),
                Err(e) if Error::FieldNotFound.is(&e) => Ok(EvalValue::Value(Value::null())),
                Err(e) => Err(e),
            }
        }
        Expr::Key => {
            let Some(record) = ctx.record else {
                bail!("key() outside of a record context");
            };
            match record.key() {
                Some(key) => Ok(EvalValue::Value(key)),
                None => bail!("record has no key"),
            }
        }
        Expr::Param(r) => match resolve_param(ctx.params, r)? {
            ParamValue::Value(v) => Ok(EvalValue::Value(v.clone())),
            ParamValue::Record(_) => bail!(Error::TypeMismatch(
                "record argument used as a scalar".into()
            )),
        },
        Expr::Neg(operand) => {
            let v = eval(operand, ctx)?.into_value()?;
            if v.is_null() {
                return Ok(EvalValue::Value(Value::null()));
            }
            if v.ty.is_integer() {
                let n = v.to_i128()?;
                let negated = i64::try_from(-n)
                    .map_err(|_| eyre::eyre!("integer overflow negating {n}"))?;
                return Ok(EvalValue::Value(Value::smallest_int(negated)));
            }
            if v.ty.is_float() {
                return Ok(EvalValue::Value(Value::float64(-v.to_f64()?)));
            }
            bail!(Error::TypeMismatch(format!(
                "cannot negate a {}",
                v.ty.name()
            )))
        }
        Expr::IsNull { expr, negated } => {
            let v = eval(expr, ctx)?.into_value()?;
            Ok(EvalValue::Value(Value::bool(v.is_null() != *negated)))
        }
        Expr::In { expr, list } => {
            let needle = eval(expr, ctx)?.into_value()?;
            if needle.is_null() {
                return Ok(EvalValue::Value(Value::bool(false)));
            }
            let haystack = match eval(list, ctx)? {
                EvalValue::List(values) => values,
                EvalValue::Value(v) => vec![v],
            };
            for candidate in &haystack {
                if compare_op(BinaryOp::Eq, &needle, candidate)? {
                    return Ok(EvalValue::Value(Value::bool(true)));
                }
            }
            Ok(EvalValue::Value(Value::bool(false)))
        }
        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &EvalContext<'_>) -> Result<EvalValue> {
    match op {
        BinaryOp::And => {
            if !eval(lhs, ctx)?.truthy()? {
                return Ok(EvalValue::Value(Value::bool(false)));
            }
            Ok(EvalValue::Value(Value::bool(eval(rhs, ctx)?.truthy()?)))
        }
        BinaryOp::Or => {
            if eval(lhs, ctx)?.truthy()? {
                return Ok(EvalValue::Value(Value::bool(true)));
            }
            Ok(EvalValue::Value(Value::bool(eval(rhs, ctx)?.truthy()?)))
        }
        op if op.is_comparison() => {
            let a = eval(lhs, ctx)?.into_value()?;
            let b = eval(rhs, ctx)?.into_value()?;
            Ok(EvalValue::Value(Value::bool(compare_op(op, &a, &b)?)))
        }
        _ => {
            let a = eval(lhs, ctx)?.into_value()?;
            let b = eval(rhs, ctx)?.into_value()?;
            arithmetic(op, &a, &b)
        }
    }
}

/// Applies a comparison operator under the coercion lattice. Null makes
/// every operator false; unrelated kinds are unequal.
pub(crate) fn compare_op(op: BinaryOp, a: &Value, b: &Value) -> Result<bool> {
    Ok(match a.compare(b)? {
        Comparison::NullInvolved => false,
        Comparison::Incomparable => op == BinaryOp::Neq,
        Comparison::Ordered(ord) => match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::Neq => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Lte => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::Gte => ord != Ordering::Less,
            _ => bail!("not a comparison operator: {op:?}"),
        },
    })
}

fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<EvalValue> {
    if a.is_null() || b.is_null() {
        return Ok(EvalValue::Value(Value::null()));
    }
    if !a.ty.is_numeric() || !b.ty.is_numeric() {
        bail!(Error::TypeMismatch(format!(
            "cannot apply {:?} to {} and {}",
            op,
            a.ty.name(),
            b.ty.name()
        )));
    }

    if a.ty.is_integer() && b.ty.is_integer() {
        let x = a.to_i128()?;
        let y = b.to_i128()?;
        let result = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => {
                if y == 0 {
                    bail!("division by zero");
                }
                x.checked_div(y)
            }
            _ => bail!("not an arithmetic operator: {op:?}"),
        };
        let result = result.ok_or_else(|| eyre::eyre!("integer overflow in {op:?}"))?;
        let result = i64::try_from(result)
            .map_err(|_| eyre::eyre!("integer overflow in {op:?}"))?;
        return Ok(EvalValue::Value(Value::smallest_int(result)));
    }

    let x = a.to_f64()?;
    let y = b.to_f64()?;
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        _ => bail!("not an arithmetic operator: {op:?}"),
    };
    Ok(EvalValue::Value(Value::float64(result)))
}
