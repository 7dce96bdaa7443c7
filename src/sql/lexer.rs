//! # SQL Lexer
//!
//! Single-pass tokenizer for the dialect. Identifiers, numbers and named
//! parameters borrow directly from the input; string literals only allocate
//! when they contain the `''` escape. Keywords resolve through a
//! compile-time perfect hash map, so lookup never depends on the keyword
//! count.
//!
//! The lexer tracks the line and column of the token it last produced,
//! which the parser copies into every diagnostic.

use super::token::{Keyword, Pos, Token};
use phf::phf_map;
use std::borrow::Cow;

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "CREATE" => Keyword::Create,
    "TABLE" => Keyword::Table,
    "INDEX" => Keyword::Index,
    "UNIQUE" => Keyword::Unique,
    "IF" => Keyword::If,
    "NOT" => Keyword::Not,
    "EXISTS" => Keyword::Exists,
    "ON" => Keyword::On,
    "PRIMARY" => Keyword::Primary,
    "KEY" => Keyword::Key,
    "DROP" => Keyword::Drop,
    "INSERT" => Keyword::Insert,
    "INTO" => Keyword::Into,
    "VALUES" => Keyword::Values,
    "RECORDS" => Keyword::Records,
    "SELECT" => Keyword::Select,
    "FROM" => Keyword::From,
    "WHERE" => Keyword::Where,
    "UPDATE" => Keyword::Update,
    "SET" => Keyword::Set,
    "DELETE" => Keyword::Delete,
    "LIMIT" => Keyword::Limit,
    "OFFSET" => Keyword::Offset,
    "ORDER" => Keyword::Order,
    "BY" => Keyword::By,
    "ASC" => Keyword::Asc,
    "DESC" => Keyword::Desc,
    "AND" => Keyword::And,
    "OR" => Keyword::Or,
    "IN" => Keyword::In,
    "IS" => Keyword::Is,
    "NULL" => Keyword::Null,
    "TRUE" => Keyword::True,
    "FALSE" => Keyword::False,
};

pub struct Lexer<'a> {
    input: &'a str,
    offset: usize,
    line: u32,
    column: u32,
    token_pos: Pos,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Lexer<'a> {
        Lexer {
            input,
            offset: 0,
            line: 1,
            column: 1,
            token_pos: Pos { line: 1, column: 1 },
        }
    }

    /// Position of the most recently returned token.
    pub fn pos(&self) -> Pos {
        self.token_pos
    }

    fn rest(&self) -> &'a str {
        &self.input[self.offset..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Produces the next token, skipping whitespace.
    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        self.token_pos = Pos {
            line: self.line,
            column: self.column,
        };

        let Some(c) = self.peek_char() else {
            return Token::Eof;
        };

        match c {
            '\'' => self.scan_string(),
            '"' => self.scan_quoted_ident(),
            '$' => {
                self.bump();
                let name = self.scan_ident_chars();
                if name.is_empty() {
                    Token::Error("expected a name after $")
                } else {
                    Token::Named(name)
                }
            }
            '?' => {
                self.bump();
                Token::Positional
            }
            '=' => {
                self.bump();
                Token::Eq
            }
            '!' => {
                self.bump();
                if self.peek_char() == Some('=') {
                    self.bump();
                    Token::Neq
                } else {
                    Token::Error("expected = after !")
                }
            }
            '<' => {
                self.bump();
                if self.peek_char() == Some('=') {
                    self.bump();
                    Token::Lte
                } else {
                    Token::Lt
                }
            }
            '>' => {
                self.bump();
                if self.peek_char() == Some('=') {
                    self.bump();
                    Token::Gte
                } else {
                    Token::Gt
                }
            }
            '+' => {
                self.bump();
                Token::Plus
            }
            '-' => {
                self.bump();
                Token::Minus
            }
            '*' => {
                self.bump();
                Token::Star
            }
            '/' => {
                self.bump();
                Token::Slash
            }
            '(' => {
                self.bump();
                Token::LParen
            }
            ')' => {
                self.bump();
                Token::RParen
            }
            ',' => {
                self.bump();
                Token::Comma
            }
            ':' => {
                self.bump();
                Token::Colon
            }
            ';' => {
                self.bump();
                Token::Semicolon
            }
            _ if c.is_ascii_digit() => self.scan_number(),
            _ if c.is_alphabetic() || c == '_' => {
                let word = self.scan_ident_chars();
                match KEYWORDS.get(word.to_ascii_uppercase().as_str()) {
                    Some(&kw) => Token::Keyword(kw),
                    None => Token::Ident(word),
                }
            }
            _ => {
                self.bump();
                Token::Error("unexpected character")
            }
        }
    }

    fn scan_ident_chars(&mut self) -> &'a str {
        let start = self.offset;
        while matches!(self.peek_char(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        &self.input[start..self.offset]
    }

    fn scan_quoted_ident(&mut self) -> Token<'a> {
        self.bump(); // opening quote
        let start = self.offset;
        loop {
            match self.peek_char() {
                Some('"') => {
                    let name = &self.input[start..self.offset];
                    self.bump();
                    return Token::Ident(name);
                }
                Some(_) => {
                    self.bump();
                }
                None => return Token::Error("unterminated quoted identifier"),
            }
        }
    }

    fn scan_string(&mut self) -> Token<'a> {
        self.bump(); // opening quote
        let start = self.offset;
        let mut escaped = false;
        loop {
            match self.peek_char() {
                Some('\'') => {
                    let end = self.offset;
                    self.bump();
                    if self.peek_char() == Some('\'') {
                        // '' escape, keep scanning
                        escaped = true;
                        self.bump();
                        continue;
                    }
                    let raw = &self.input[start..end];
                    return if escaped {
                        Token::String(Cow::Owned(raw.replace("''", "'")))
                    } else {
                        Token::String(Cow::Borrowed(raw))
                    };
                }
                Some(_) => {
                    self.bump();
                }
                None => return Token::Error("unterminated string literal"),
            }
        }
    }

    fn scan_number(&mut self) -> Token<'a> {
        let start = self.offset;
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        // fractional part: a dot followed by at least one digit
        if self.peek_char() == Some('.') {
            let after_dot = self.rest()[1..].chars().next();
            if matches!(after_dot, Some(c) if c.is_ascii_digit()) {
                self.bump();
                while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        // exponent
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let mut lookahead = self.rest().chars().skip(1);
            let next = lookahead.next();
            let sign_then_digit = matches!(next, Some('+' | '-'))
                && matches!(lookahead.next(), Some(c) if c.is_ascii_digit());
            if matches!(next, Some(c) if c.is_ascii_digit()) || sign_then_digit {
                self.bump(); // e
                if matches!(self.peek_char(), Some('+' | '-')) {
                    self.bump();
                }
                while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        Token::Number(&self.input[start..self.offset])
    }
}
