//! Query expressions over catalog entries
//!
//! A small expression language in the style of dataframe queries:
//!
//! ```text
//! state == 'TX' and (drainage_area > 1000 or site:type in ['stream', 'lake'])
//! not display_name == "Austin"
//! ```
//!
//! Identifiers resolve to an entry column (`name`, `service`, `service_id`,
//! `display_name`, `description`, `geometry`, `parameters`) or else to a
//! metadata path with `:` separating nested keys. Unknown identifiers are null.
//! Backticks quote identifiers containing other characters.

use quest_core::error::{QuestError, Result};
use quest_core::models::CatalogEntry;
use serde_json::Value;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated {0}")]
    Unterminated(&'static str),

    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },

    #[error("unexpected end of query")]
    UnexpectedEnd,

    #[error("query nests deeper than {0} levels")]
    TooDeep(usize),
}

/// Bound on expression tree depth, counting chained `and`/`or` terms
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Op(CmpOp),
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    List(Vec<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    In { item: Box<Expr>, list: Box<Expr>, negated: bool },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

fn starts_number(chars: &[char], i: usize) -> bool {
    let digit_or_dot = |c: &char| c.is_ascii_digit() || *c == '.';
    match chars.get(i) {
        Some('-') => chars.get(i + 1).is_some_and(digit_or_dot),
        Some(c) => digit_or_dot(c),
        None => false,
    }
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '&' => {
                tokens.push(Token::And);
                i += if chars.get(i + 1) == Some(&'&') { 2 } else { 1 };
            }
            '|' => {
                tokens.push(Token::Or);
                i += if chars.get(i + 1) == Some(&'|') { 2 } else { 1 };
            }
            '~' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CmpOp::Eq, 2),
                    ('!', Some('=')) => (CmpOp::Ne, 2),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', _) => (CmpOp::Gt, 1),
                    _ => return Err(QueryError::UnexpectedChar(c, i)),
                };
                tokens.push(Token::Op(op));
                i += width;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(QueryError::Unterminated("string")),
                        Some('\\') if i + 1 < chars.len() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            '`' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '`')
                    .ok_or(QueryError::Unterminated("quoted identifier"))?;
                tokens.push(Token::Ident(chars[start..start + end].iter().collect()));
                i = start + end + 1;
            }
            c if starts_number(&chars, i) => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || matches!(chars[i], 'e' | 'E')
                        || (matches!(chars[i], '+' | '-') && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| QueryError::UnexpectedChar(c, start))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | ':' | '.'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    "null" | "None" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(QueryError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn enter(&mut self) -> std::result::Result<(), QueryError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(QueryError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), QueryError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(QueryError::Expected {
                expected: format!("{:?}", expected),
                found: format!("{:?}", token),
            }),
            None => Err(QueryError::UnexpectedEnd),
        }
    }

    fn parse_or(&mut self) -> std::result::Result<Expr, QueryError> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            self.enter()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and(&mut self) -> std::result::Result<Expr, QueryError> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            self.enter()?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_not(&mut self) -> std::result::Result<Expr, QueryError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> std::result::Result<Expr, QueryError> {
        let left = self.parse_primary()?;
        match self.peek() {
            Some(Token::Op(op)) => {
                let op = *op;
                self.pos += 1;
                let right = self.parse_primary()?;
                Ok(Expr::Compare(Box::new(left), op, Box::new(right)))
            }
            Some(Token::In) => {
                self.pos += 1;
                let list = self.parse_primary()?;
                Ok(Expr::In {
                    item: Box::new(left),
                    list: Box::new(list),
                    negated: false,
                })
            }
            Some(Token::Not) if self.peek_at(1) == Some(&Token::In) => {
                self.pos += 2;
                let list = self.parse_primary()?;
                Ok(Expr::In {
                    item: Box::new(left),
                    list: Box::new(list),
                    negated: true,
                })
            }
            _ => Ok(left),
        }
    }

    fn parse_primary(&mut self) -> std::result::Result<Expr, QueryError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(
                serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
            )),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                self.enter()?;
                if self.peek() == Some(&Token::RBracket) {
                    self.depth -= 1;
                    self.pos += 1;
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.parse_primary()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        Some(token) => {
                            return Err(QueryError::Expected {
                                expected: "',' or ']'".to_string(),
                                found: format!("{:?}", token),
                            })
                        }
                        None => return Err(QueryError::Unterminated("list")),
                    }
                }
                self.depth -= 1;
                Ok(Expr::List(items))
            }
            Some(token) => Err(QueryError::Expected {
                expected: "a value or identifier".to_string(),
                found: format!("{:?}", token),
            }),
            None => Err(QueryError::UnexpectedEnd),
        }
    }
}

/// Parse a query string
pub fn parse_query(query: &str) -> Result<Expr> {
    let invalid = |e: QueryError| QuestError::InvalidQuery {
        query: query.to_string(),
        reason: e.to_string(),
    };

    let tokens = tokenize(query).map_err(invalid)?;
    if tokens.is_empty() {
        return Err(invalid(QueryError::UnexpectedEnd));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or().map_err(invalid)?;
    if let Some(token) = parser.peek() {
        return Err(invalid(QueryError::Expected {
            expected: "end of query".to_string(),
            found: format!("{:?}", token),
        }));
    }
    Ok(expr)
}

fn resolve(entry: &CatalogEntry, name: &str) -> Value {
    match name {
        "name" => Value::String(entry.name.clone()),
        "service" => Value::String(entry.service.clone()),
        "service_id" => Value::String(entry.service_id.clone()),
        "display_name" => Value::String(entry.display_name.clone()),
        "description" => Value::String(entry.description.clone()),
        "parameters" => Value::String(entry.parameters.clone()),
        "geometry" => entry.geometry.clone().map(Value::String).unwrap_or(Value::Null),
        "publisher_id" => entry.publisher_id.clone().map(Value::String).unwrap_or(Value::Null),
        path => entry.metadata_path(path).cloned().unwrap_or(Value::Null),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => as_number(left)?.partial_cmp(&as_number(right)?),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        _ => compare(left, right) == Some(Ordering::Equal) || left == right,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn evaluate(expr: &Expr, entry: &CatalogEntry) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Ident(name) => resolve(entry, name),
        Expr::List(items) => Value::Array(items.iter().map(|e| evaluate(e, entry)).collect()),
        Expr::Compare(left, op, right) => {
            let (l, r) = (evaluate(left, entry), evaluate(right, entry));
            let result = match op {
                CmpOp::Eq => loosely_equal(&l, &r),
                CmpOp::Ne => !loosely_equal(&l, &r),
                CmpOp::Lt => compare(&l, &r) == Some(Ordering::Less),
                CmpOp::Le => matches!(compare(&l, &r), Some(Ordering::Less | Ordering::Equal)),
                CmpOp::Gt => compare(&l, &r) == Some(Ordering::Greater),
                CmpOp::Ge => matches!(compare(&l, &r), Some(Ordering::Greater | Ordering::Equal)),
            };
            Value::Bool(result)
        }
        Expr::In { item, list, negated } => {
            let item = evaluate(item, entry);
            let found = match evaluate(list, entry) {
                Value::Array(values) => values.iter().any(|v| loosely_equal(&item, v)),
                Value::String(haystack) => {
                    item.as_str().is_some_and(|needle| haystack.contains(needle))
                }
                other => loosely_equal(&item, &other),
            };
            Value::Bool(found != *negated)
        }
        Expr::And(left, right) => {
            Value::Bool(truthy(&evaluate(left, entry)) && truthy(&evaluate(right, entry)))
        }
        Expr::Or(left, right) => {
            Value::Bool(truthy(&evaluate(left, entry)) || truthy(&evaluate(right, entry)))
        }
        Expr::Not(inner) => Value::Bool(!truthy(&evaluate(inner, entry))),
    }
}

impl Expr {
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        truthy(&evaluate(self, entry))
    }
}

/// Keep the entries matching every query
pub fn apply_queries<S: AsRef<str>>(
    entries: Vec<CatalogEntry>,
    queries: &[S],
) -> Result<Vec<CatalogEntry>> {
    let parsed = queries
        .iter()
        .map(|q| parse_query(q.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(entries
        .into_iter()
        .filter(|entry| parsed.iter().all(|expr| expr.matches(entry)))
        .collect())
}
