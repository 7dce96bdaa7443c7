//! # SQL Parser
//!
//! Recursive descent over the token stream with a single token of
//! lookahead. Statement parsers mirror the grammar one function per
//! production; expressions use precedence climbing with the binding powers
//! listed below.
//!
//! | Precedence | Operators |
//! |------------|-----------|
//! | 1 (lowest) | OR |
//! | 2 | AND |
//! | 3 | =, !=, <, <=, >, >= |
//! | 4 | IN |
//! | 5 | IS |
//! | 6 | +, - (binary) |
//! | 7 | *, / |
//! | 8 (highest) | - (unary) |
//!
//! Failures produce a [`ParseError`] carrying what was expected, what was
//! found, and the position of the offending token.

use super::ast::*;
use super::lexer::Lexer;
use super::token::{Keyword, Pos, Token};
use crate::value::{Type, Value};
use eyre::Result;


/// Syntax error with position information.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at {pos}: expected {}, found {found}", .expected.join(" or "))]
pub struct ParseError {
    pub expected: Vec<String>,
    pub found: String,
    pub pos: Pos,
}

/// Parses a query text into its statements.
pub fn parse_query(input: &str) -> Result<Vec<Statement>> {
    let mut parser = Parser::new(input);
    let mut statements = Vec::new();
    loop {
        while matches!(parser.peek(), Token::Semicolon) {
            parser.advance();
        }
        if matches!(parser.peek(), Token::Eof) {
            return Ok(statements);
        }
        statements.push(parser.parse_statement()?);
        match parser.peek() {
            Token::Semicolon | Token::Eof => {}
            _ => return Err(parser.error(&[";"])),
        }
    }
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
    positional_count: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Parser<'a> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            positional_count: 0,
        }
    }

    fn peek(&self) -> &Token<'a> {
        &self.current
    }

    fn advance(&mut self) -> Token<'a> {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn error(&self, expected: &[&str]) -> eyre::Report {
        eyre::Report::new(ParseError {
            expected: expected.iter().map(|s| s.to_string()).collect(),
            found: self.current.to_string(),
            pos: self.lexer.pos(),
        })
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.current, Token::Keyword(k) if *k == keyword)
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, name: &'static str) -> Result<()> {
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(&[name]))
        }
    }

    fn consume_token(&mut self, expected: &Token<'a>) -> bool {
        if std::mem::discriminant(&self.current) == std::mem::discriminant(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, expected: &Token<'a>, name: &'static str) -> Result<()> {
        if self.consume_token(expected) {
            Ok(())
        } else {
            Err(self.error(&[name]))
        }
    }

    fn parse_ident(&mut self) -> Result<String> {
        match &self.current {
            Token::Ident(name) => {
                let name = name.to_string();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(&["identifier"])),
        }
    }

    pub fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek() {
            Token::Keyword(Keyword::Create) => {
                self.advance();
                self.parse_create()
            }
            Token::Keyword(Keyword::Drop) => {
                self.advance();
                self.parse_drop()
            }
            Token::Keyword(Keyword::Insert) => {
                self.advance();
                Ok(Statement::Insert(self.parse_insert()?))
            }
            Token::Keyword(Keyword::Select) => {
                self.advance();
                Ok(Statement::Select(self.parse_select()?))
            }
            Token::Keyword(Keyword::Update) => {
                self.advance();
                Ok(Statement::Update(self.parse_update()?))
            }
            Token::Keyword(Keyword::Delete) => {
                self.advance();
                Ok(Statement::Delete(self.parse_delete()?))
            }
            _ => Err(self.error(&["CREATE", "DROP", "INSERT", "SELECT", "UPDATE", "DELETE"])),
        }
    }

    fn parse_create(&mut self) -> Result<Statement> {
        if self.consume_keyword(Keyword::Table) {
            return Ok(Statement::CreateTable(self.parse_create_table()?));
        }
        if self.consume_keyword(Keyword::Unique) {
            self.expect_keyword(Keyword::Index, "INDEX")?;
            return Ok(Statement::CreateIndex(self.parse_create_index(true)?));
        }
        if self.consume_keyword(Keyword::Index) {
            return Ok(Statement::CreateIndex(self.parse_create_index(false)?));
        }
        Err(self.error(&["TABLE", "INDEX", "UNIQUE"]))
    }

    fn parse_if_not_exists(&mut self) -> Result<bool> {
        if !self.consume_keyword(Keyword::If) {
            return Ok(false);
        }
        self.expect_keyword(Keyword::Not, "NOT")?;
        self.expect_keyword(Keyword::Exists, "EXISTS")?;
        Ok(true)
    }

    fn parse_if_exists(&mut self) -> Result<bool> {
        if !self.consume_keyword(Keyword::If) {
            return Ok(false);
        }
        self.expect_keyword(Keyword::Exists, "EXISTS")?;
        Ok(true)
    }

    fn parse_create_table(&mut self) -> Result<CreateTableStmt> {
        let if_not_exists = self.parse_if_not_exists()?;
        let table_name = self.parse_ident()?;

        let primary_key = if self.consume_token(&Token::LParen) {
            let field = self.parse_ident()?;
            let type_name = self.parse_ident()?;
            let ty = Type::from_sql_name(&type_name)
                .ok_or_else(|| self.error(&["type name"]))?;
            self.expect_keyword(Keyword::Primary, "PRIMARY")?;
            self.expect_keyword(Keyword::Key, "KEY")?;
            self.expect_token(&Token::RParen, ")")?;
            Some((field, ty))
        } else {
            None
        };

        Ok(CreateTableStmt {
            table_name,
            if_not_exists,
            primary_key,
        })
    }

    fn parse_create_index(&mut self, unique: bool) -> Result<CreateIndexStmt> {
        let if_not_exists = self.parse_if_not_exists()?;
        let index_name = self.parse_ident()?;
        self.expect_keyword(Keyword::On, "ON")?;
        let table_name = self.parse_ident()?;
        self.expect_token(&Token::LParen, "(")?;
        let field_name = self.parse_ident()?;
        self.expect_token(&Token::RParen, ")")?;
        Ok(CreateIndexStmt {
            index_name,
            table_name,
            field_name,
            if_not_exists,
            unique,
        })
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        if self.consume_keyword(Keyword::Table) {
            let if_exists = self.parse_if_exists()?;
            let name = self.parse_ident()?;
            return Ok(Statement::DropTable(DropStmt { name, if_exists }));
        }
        if self.consume_keyword(Keyword::Index) {
            let if_exists = self.parse_if_exists()?;
            let name = self.parse_ident()?;
            return Ok(Statement::DropIndex(DropStmt { name, if_exists }));
        }
        Err(self.error(&["TABLE", "INDEX"]))
    }

    fn parse_insert(&mut self) -> Result<InsertStmt> {
        self.expect_keyword(Keyword::Into, "INTO")?;
        let table_name = self.parse_ident()?;

        let mut field_names = Vec::new();
        if self.consume_token(&Token::LParen) {
            loop {
                field_names.push(self.parse_ident()?);
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            self.expect_token(&Token::RParen, ")")?;
        }

        let source = if self.consume_keyword(Keyword::Values) {
            InsertSource::Values(self.parse_value_rows()?)
        } else if self.consume_keyword(Keyword::Records) {
            if !field_names.is_empty() {
                return Err(self.error(&["VALUES"]));
            }
            InsertSource::Records(self.parse_record_specs()?)
        } else {
            return Err(self.error(&["VALUES", "RECORDS"]));
        };

        Ok(InsertStmt {
            table_name,
            field_names,
            source,
        })
    }

    fn parse_value_rows(&mut self) -> Result<Vec<Vec<Expr>>> {
        let mut rows = Vec::new();
        loop {
            self.expect_token(&Token::LParen, "(")?;
            let mut row = Vec::new();
            loop {
                row.push(self.parse_expr(0)?);
                if !self.consume_token(&Token::Comma) {
                    break;
                }
            }
            self.expect_token(&Token::RParen, ")")?;
            rows.push(row);
            if !self.consume_token(&Token::Comma) {
                return Ok(rows);
            }
        }
    }

    fn parse_record_specs(&mut self) -> Result<Vec<RecordSpec>> {
        let mut specs = Vec::new();
        loop {
            let spec = match self.peek() {
                Token::Positional => {
                    self.advance();
                    self.positional_count += 1;
                    RecordSpec::Param(ParamRef::Positional(self.positional_count))
                }
                Token::Named(name) => {
                    let name = name.to_string();
                    self.advance();
                    RecordSpec::Param(ParamRef::Named(name))
                }
                Token::LParen => {
                    self.advance();
                    let mut pairs = Vec::new();
                    loop {
                        let key = self.parse_ident()?;
                        self.expect_token(&Token::Colon, ":")?;
                        let value = self.parse_expr(0)?;
                        pairs.push((key, value));
                        if !self.consume_token(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect_token(&Token::RParen, ")")?;
                    RecordSpec::Pairs(pairs)
                }
                _ => return Err(self.error(&["(", "?", "$"])),
            };
            specs.push(spec);
            if !self.consume_token(&Token::Comma) {
                return Ok(specs);
            }
        }
    }

    fn parse_select(&mut self) -> Result<SelectStmt> {
        let mut selectors = Vec::new();
        loop {
            selectors.push(self.parse_selector()?);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        self.expect_keyword(Keyword::From, "FROM")?;
        let table_name = self.parse_ident()?;
        let where_expr = self.parse_where_clause()?;

        let order_by = if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By, "BY")?;
            let field = self.parse_ident()?;
            let direction = if self.consume_keyword(Keyword::Desc) {
                Direction::Desc
            } else {
                self.consume_keyword(Keyword::Asc);
                Direction::Asc
            };
            Some(OrderBy { field, direction })
        } else {
            None
        };

        let limit = if self.consume_keyword(Keyword::Limit) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        let offset = if self.consume_keyword(Keyword::Offset) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        Ok(SelectStmt {
            table_name,
            selectors,
            where_expr,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_selector(&mut self) -> Result<Selector> {
        match self.peek() {
            Token::Star => {
                self.advance();
                Ok(Selector::Wildcard)
            }
            Token::Ident(name) => {
                let name = name.to_string();
                self.advance();
                if name == "key" && self.consume_token(&Token::LParen) {
                    self.expect_token(&Token::RParen, ")")?;
                    Ok(Selector::Key)
                } else {
                    Ok(Selector::Field(name))
                }
            }
            _ => Err(self.error(&["*", "identifier", "key()"])),
        }
    }

    fn parse_update(&mut self) -> Result<UpdateStmt> {
        let table_name = self.parse_ident()?;
        self.expect_keyword(Keyword::Set, "SET")?;

        let mut assignments = Vec::new();
        loop {
            let field = self.parse_ident()?;
            self.expect_token(&Token::Eq, "=")?;
            let value = self.parse_expr(0)?;
            assignments.push((field, value));
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }

        let where_expr = self.parse_where_clause()?;
        Ok(UpdateStmt {
            table_name,
            assignments,
            where_expr,
        })
    }

    fn parse_delete(&mut self) -> Result<DeleteStmt> {
        self.expect_keyword(Keyword::From, "FROM")?;
        let table_name = self.parse_ident()?;
        let where_expr = self.parse_where_clause()?;
        Ok(DeleteStmt {
            table_name,
            where_expr,
        })
    }

    fn parse_where_clause(&mut self) -> Result<Option<Expr>> {
        if self.consume_keyword(Keyword::Where) {
            Ok(Some(self.parse_expr(0)?))
        } else {
            Ok(None)
        }
    }

    /// Precedence-climbing expression parser. `min_bp` is the minimum
    /// binding power an operator needs to extend the left-hand side.
    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;

        loop {
            let (bp, op) = match self.peek() {
                Token::Keyword(Keyword::Or) => (1, Some(BinaryOp::Or)),
                Token::Keyword(Keyword::And) => (2, Some(BinaryOp::And)),
                Token::Eq => (3, Some(BinaryOp::Eq)),
                Token::Neq => (3, Some(BinaryOp::Neq)),
                Token::Lt => (3, Some(BinaryOp::Lt)),
                Token::Lte => (3, Some(BinaryOp::Lte)),
                Token::Gt => (3, Some(BinaryOp::Gt)),
                Token::Gte => (3, Some(BinaryOp::Gte)),
                Token::Keyword(Keyword::In) => (4, None),
                Token::Keyword(Keyword::Is) => (5, None),
                Token::Plus => (6, Some(BinaryOp::Add)),
                Token::Minus => (6, Some(BinaryOp::Sub)),
                Token::Star => (7, Some(BinaryOp::Mul)),
                Token::Slash => (7, Some(BinaryOp::Div)),
                _ => break,
            };
            if bp < min_bp {
                break;
            }

            match op {
                Some(op) => {
                    self.advance();
                    let rhs = self.parse_expr(bp + 1)?;
                    lhs = Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                }
                None if self.check_keyword(Keyword::In) => {
                    self.advance();
                    let rhs = self.parse_expr(bp + 1)?;
                    lhs = Expr::In {
                        expr: Box::new(lhs),
                        list: Box::new(rhs),
                    };
                }
                None => {
                    // IS [NOT] NULL
                    self.advance();
                    let negated = self.consume_keyword(Keyword::Not);
                    self.expect_keyword(Keyword::Null, "NULL")?;
                    lhs = Expr::IsNull {
                        expr: Box::new(lhs),
                        negated,
                    };
                }
            }
        }

        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.consume_token(&Token::Minus) {
            let operand = self.parse_unary()?;
            return Ok(negate(operand));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().clone() {
            Token::Number(text) => {
                self.advance();
                Ok(Expr::Literal(parse_number(text).ok_or_else(|| self.error(&["number"]))?))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::Literal(Value::string(s.into_owned())))
            }
            Token::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Literal(Value::bool(true)))
            }
            Token::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Literal(Value::bool(false)))
            }
            Token::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expr::Literal(Value::null()))
            }
            Token::Ident(name) => {
                self.advance();
                if name == "key" && self.consume_token(&Token::LParen) {
                    self.expect_token(&Token::RParen, ")")?;
                    Ok(Expr::Key)
                } else {
                    Ok(Expr::Ident(name.to_string()))
                }
            }
            Token::Positional => {
                self.advance();
                self.positional_count += 1;
                Ok(Expr::Param(ParamRef::Positional(self.positional_count)))
            }
            Token::Named(name) => {
                self.advance();
                Ok(Expr::Param(ParamRef::Named(name.to_string())))
            }
            Token::LParen => {
                self.advance();
                let first = self.parse_expr(0)?;
                if self.consume_token(&Token::Comma) {
                    let mut items = vec![first];
                    loop {
                        items.push(self.parse_expr(0)?);
                        if !self.consume_token(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect_token(&Token::RParen, ")")?;
                    Ok(Expr::List(items))
                } else {
                    self.expect_token(&Token::RParen, ")")?;
                    Ok(first)
                }
            }
            _ => Err(self.error(&["expression"])),
        }
    }
}

/// Folds unary minus into numeric literals so `-1` types as the literal
/// `-1` rather than a negation node.
fn negate(expr: Expr) -> Expr {
    if let Expr::Literal(v) = &expr {
        if v.ty.is_integer() {
            if let Ok(n) = v.to_i128() {
                if let Ok(n) = i64::try_from(-n) {
                    return Expr::Literal(Value::smallest_int(n));
                }
            }
        }
        if v.ty.is_float() {
            if let Ok(f) = v.to_f64() {
                return Expr::Literal(Value::float64(-f));
            }
        }
    }
    Expr::Neg(Box::new(expr))
}

/// Types a numeric literal: integers take the smallest signed tag that
/// fits (falling back to Uint64 and then Float64 for huge values), and
/// anything with a fraction or exponent is Float64.
fn parse_number(text: &str) -> Option<Value> {
    if text.contains(['.', 'e', 'E']) {
        return text.parse::<f64>().ok().map(Value::float64);
    }
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::smallest_int(n));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Some(Value::uint64(n));
    }
    text.parse::<f64>().ok().map(Value::float64)
}
