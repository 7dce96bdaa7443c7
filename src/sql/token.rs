//! # Tokens
//!
//! Token and keyword definitions for the SQL dialect. String-bearing tokens
//! borrow from the input wherever possible; only string literals with
//! embedded escapes need an owned copy, which is why they carry a `Cow`.

use std::borrow::Cow;
use std::fmt;

/// Position of a token in the input, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// Reserved words of the dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Create,
    Table,
    Index,
    Unique,
    If,
    Not,
    Exists,
    On,
    Primary,
    Key,
    Drop,
    Insert,
    Into,
    Values,
    Records,
    Select,
    From,
    Where,
    Update,
    Set,
    Delete,
    Limit,
    Offset,
    Order,
    By,
    Asc,
    Desc,
    And,
    Or,
    In,
    Is,
    Null,
    True,
    False,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    Keyword(Keyword),
    /// Bare or double-quoted identifier.
    Ident(&'a str),
    /// Single-quoted string literal, unescaped.
    String(Cow<'a, str>),
    /// Numeric literal, kept as source text for the parser to type.
    Number(&'a str),
    /// Anonymous positional parameter `?`.
    Positional,
    /// Named parameter `$name`.
    Named(&'a str),
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    Colon,
    Semicolon,
    /// Lexing error with a human-readable cause.
    Error(&'static str),
    Eof,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Keyword(k) => write!(f, "{k:?}"),
            Token::Ident(s) => write!(f, "identifier {s}"),
            Token::String(s) => write!(f, "string '{s}'"),
            Token::Number(s) => write!(f, "number {s}"),
            Token::Positional => write!(f, "?"),
            Token::Named(s) => write!(f, "${s}"),
            Token::Eq => write!(f, "="),
            Token::Neq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Lte => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Gte => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Semicolon => write!(f, ";"),
            Token::Error(msg) => write!(f, "invalid token ({msg})"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}
