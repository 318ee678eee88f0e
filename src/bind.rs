//! Bind parameters: locating `:name` placeholders, classifying the supplied
//! values, and compiling SQL to a dialect's placeholder style.
//!
//! Classification happens per request. A parameter whose value is a tuple is
//! `Expanding` and compiles to one placeholder per element, so
//! `where id in :ids` with three ids becomes `where id in (?, ?, ?)`.

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::value::{Params, Value};

/// Placeholder syntax of the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?` (SQLite, MySQL)
    Qmark,
    /// `$1`, `$2`, ... (PostgreSQL)
    Numeric,
}

impl ParamStyle {
    fn placeholder(self, n: usize) -> String {
        match self {
            ParamStyle::Qmark => "?".to_string(),
            ParamStyle::Numeric => format!("${}", n),
        }
    }
}

/// How one named parameter binds for a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    /// Expands to this many placeholders.
    Expanding(usize),
}

pub type ParamKinds = BTreeMap<String, ParamKind>;

/// Classify named values: tuples expand, everything else binds as one value.
pub fn classify(params: &Params) -> ParamKinds {
    params
        .iter()
        .map(|(name, value)| {
            let kind = match value {
                Value::Tuple(items) => ParamKind::Expanding(items.len()),
                _ => ParamKind::Scalar,
            };
            (name.clone(), kind)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Param(String),
}

/// SQL split into literal text and named parameter references.
///
/// Placeholders inside string literals, quoted identifiers and comments are
/// ignored. `::` (a cast) is never a placeholder and `\:` is an escaped colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplate {
    pieces: Vec<Piece>,
}

impl SqlTemplate {
    pub fn parse(sql: &str) -> Self {
        let bytes = sql.as_bytes();
        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut start = 0;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\'' | b'"' => i = skip_quoted(bytes, i),
                b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line(bytes, i),
                b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block(bytes, i),
                b'\\' if bytes.get(i + 1) == Some(&b':') => {
                    text.push_str(&sql[start..i]);
                    start = i + 1;
                    i += 2;
                }
                b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
                b':' if starts_param(bytes, i) => {
                    let end = ident_end(bytes, i + 1);
                    text.push_str(&sql[start..i]);
                    if !text.is_empty() {
                        pieces.push(Piece::Text(std::mem::take(&mut text)));
                    }
                    pieces.push(Piece::Param(sql[i + 1..end].to_string()));
                    start = end;
                    i = end;
                }
                _ => i += 1,
            }
        }

        text.push_str(&sql[start..]);
        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Self { pieces }
    }

    /// Parameter names ordered by first occurrence, without duplicates.
    pub fn param_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for piece in &self.pieces {
            if let Piece::Param(name) = piece {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Render placeholders in `style`, expanding parameters per `kinds`.
    /// Parameters absent from `kinds` bind as scalars.
    pub fn compile(&self, style: ParamStyle, kinds: &ParamKinds) -> CompiledStatement {
        let mut sql = String::new();
        let mut slots = Vec::new();
        let mut n = 0;

        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => sql.push_str(text),
                Piece::Param(name) => {
                    let kind = kinds.get(name).copied().unwrap_or(ParamKind::Scalar);
                    match kind {
                        ParamKind::Scalar => {
                            n += 1;
                            sql.push_str(&style.placeholder(n));
                        }
                        // An empty list matches nothing.
                        ParamKind::Expanding(0) => sql.push_str("(NULL)"),
                        ParamKind::Expanding(len) => {
                            let placeholders: Vec<String> = (0..len)
                                .map(|_| {
                                    n += 1;
                                    style.placeholder(n)
                                })
                                .collect();
                            sql.push('(');
                            sql.push_str(&placeholders.join(", "));
                            sql.push(')');
                        }
                    }
                    slots.push(Slot {
                        name: name.clone(),
                        kind,
                    });
                }
            }
        }

        CompiledStatement { sql, slots }
    }
}

/// One placeholder position in compiled SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub kind: ParamKind,
}

/// SQL ready for a driver, with the parameter feeding each placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStatement {
    pub sql: String,
    pub slots: Vec<Slot>,
}

impl CompiledStatement {
    /// Flatten named values into placeholder order.
    pub fn arguments(&self, params: &Params) -> Result<Vec<Value>, EngineError> {
        let mut args = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let value = params
                .get(&slot.name)
                .ok_or_else(|| EngineError::MissingParameter(slot.name.clone()))?;
            match (slot.kind, value) {
                (ParamKind::Expanding(_), Value::Tuple(items)) => args.extend(items.iter().cloned()),
                (_, value) => args.push(value.clone()),
            }
        }
        Ok(args)
    }

    /// One argument list per execution. Bulk groups must be mappings.
    pub fn argument_sets(&self, bindings: &Bindings) -> Result<Vec<Vec<Value>>, EngineError> {
        match bindings {
            Bindings::Named(params) => Ok(vec![self.arguments(params)?]),
            Bindings::Batch(groups) => groups
                .iter()
                .map(|group| match group {
                    Value::Map(params) => self.arguments(params),
                    _ => Err(EngineError::ExpectedMapping),
                })
                .collect(),
        }
    }
}

/// Values for one invocation, after conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Bindings {
    Named(Params),
    /// Positional groups, executed once each.
    Batch(Vec<Value>),
}

impl Bindings {
    /// Classification handed to the compile step. Bulk groups never expand.
    pub fn kinds(&self) -> ParamKinds {
        match self {
            Bindings::Named(params) => classify(params),
            Bindings::Batch(_) => ParamKinds::new(),
        }
    }
}

fn starts_param(bytes: &[u8], colon: usize) -> bool {
    let next_ok = bytes
        .get(colon + 1)
        .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'_');
    let prev_ok = colon == 0 || !is_ident_byte(bytes[colon - 1]);
    next_ok && prev_ok
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn ident_end(bytes: &[u8], from: usize) -> usize {
    let mut end = from;
    while end < bytes.len() && is_ident_byte(bytes[end]) {
        end += 1;
    }
    end
}

fn skip_quoted(bytes: &[u8], open: usize) -> usize {
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            // Doubled quote is an escape.
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |p| from + p)
}

fn skip_block(bytes: &[u8], from: usize) -> usize {
    bytes[from + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| from + 2 + p + 2)
}
