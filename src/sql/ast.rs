//! # Statement and Expression Trees
//!
//! Owned AST produced by the parser. Statements survive the parse because
//! SELECT results are lazy: the plan is carried inside the result and only
//! runs when the stream is iterated.

use crate::value::{Type, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableStmt),
    CreateIndex(CreateIndexStmt),
    DropTable(DropStmt),
    DropIndex(DropStmt),
    Insert(InsertStmt),
    Select(SelectStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
}

impl Statement {
    /// Whether the statement can run inside a read-only transaction.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Statement::Select(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub table_name: String,
    pub if_not_exists: bool,
    pub primary_key: Option<(String, Type)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    pub index_name: String,
    pub table_name: String,
    pub field_name: String,
    pub if_not_exists: bool,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropStmt {
    pub name: String,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table_name: String,
    /// Field names of the `(a, b, …) VALUES` form; empty for `RECORDS`.
    pub field_names: Vec<String>,
    pub source: InsertSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// One expression row per record.
    Values(Vec<Vec<Expr>>),
    /// `RECORDS (k: v, …)` pairs or whole-record parameters.
    Records(Vec<RecordSpec>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordSpec {
    Pairs(Vec<(String, Expr)>),
    Param(ParamRef),
}

/// Reference to a bound argument. Positional ordinals are 1-based and
/// assigned in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamRef {
    Positional(usize),
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub table_name: String,
    pub selectors: Vec<Selector>,
    pub where_expr: Option<Expr>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// `*`: every field, in record order.
    Wildcard,
    /// A named field.
    Field(String),
    /// `key()`: the record's key.
    Key,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table_name: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_expr: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub table_name: String,
    pub where_expr: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Parenthesised expression list; only legal as the RHS of IN.
    List(Vec<Expr>),
    /// Field reference, resolved against the current record.
    Ident(String),
    /// `key()`.
    Key,
    Param(ParamRef),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    In {
        expr: Box<Expr>,
        list: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte
        )
    }
}
