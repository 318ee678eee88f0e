//! Result kinds: how a raw tabular result becomes the value a caller sees.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// The shape a statement returns, selected by its result keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultKind {
    /// `:one` / `:1`: first row or nothing.
    Row,
    /// `:many` / `:*`: every row.
    Rows,
    /// `:affected` / `:n`: affected row count.
    AffectedCount,
    /// `:scalar`: first column of the first row.
    Scalar,
    /// `:insert`: generated key, else the scalar result.
    InsertedKey,
    /// `:raw`: the untransformed result.
    #[default]
    Raw,
}

impl ResultKind {
    pub const ALL: [ResultKind; 6] = [
        ResultKind::Row,
        ResultKind::Rows,
        ResultKind::AffectedCount,
        ResultKind::Scalar,
        ResultKind::InsertedKey,
        ResultKind::Raw,
    ];

    /// Resolve a result keyword, including its leading colon.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            ":one" | ":1" => Some(ResultKind::Row),
            ":many" | ":*" => Some(ResultKind::Rows),
            ":affected" | ":n" => Some(ResultKind::AffectedCount),
            ":insert" => Some(ResultKind::InsertedKey),
            ":scalar" => Some(ResultKind::Scalar),
            ":raw" => Some(ResultKind::Raw),
            _ => None,
        }
    }

    /// Label used in statement signatures.
    pub fn label(self) -> &'static str {
        match self {
            ResultKind::Row => "row",
            ResultKind::Rows => "rows",
            ResultKind::AffectedCount => "rowcount",
            ResultKind::Scalar => "scalar",
            ResultKind::InsertedKey => "insert",
            ResultKind::Raw => "raw",
        }
    }

    pub fn transform(self, raw: RawResult) -> Output {
        match self {
            ResultKind::Row => Output::Row(first_row(raw)),
            ResultKind::Rows => Output::Rows(Rows::new(raw)),
            ResultKind::AffectedCount => Output::Affected(raw.rows_affected),
            ResultKind::Scalar => Output::Scalar(first_cell(raw)),
            ResultKind::InsertedKey => match raw.last_insert_id {
                Some(id) => Output::Scalar(Some(Value::Int(id))),
                None => Output::Scalar(first_cell(raw)),
            },
            ResultKind::Raw => Output::Raw(raw),
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn first_row(raw: RawResult) -> Option<Row> {
    let columns = raw.columns;
    raw.rows.into_iter().next().map(|values| Row {
        columns,
        values,
    })
}

fn first_cell(raw: RawResult) -> Option<Value> {
    raw.rows
        .into_iter()
        .next()
        .map(|row| row.into_iter().next().unwrap_or(Value::Null))
}

/// A materialized result as reported by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResult {
    pub columns: Arc<[String]>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

impl RawResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
            ..Self::default()
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    /// Fold the result of a later execution into this one: counts add up,
    /// the latest rows and generated key win.
    pub fn merge(mut self, next: RawResult) -> Self {
        self.rows_affected += next.rows_affected;
        if next.last_insert_id.is_some() {
            self.last_insert_id = next.last_insert_id;
        }
        if !next.columns.is_empty() {
            self.columns = next.columns;
            self.rows = next.rows;
        }
        self
    }
}

/// One result row; values keyed by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn into_map(self) -> HashMap<String, Value> {
        self.columns.iter().cloned().zip(self.values).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }
}

/// Single-pass iterator over result rows.
#[derive(Debug)]
pub struct Rows {
    columns: Arc<[String]>,
    inner: std::vec::IntoIter<Vec<Value>>,
}

impl Rows {
    fn new(raw: RawResult) -> Self {
        Self {
            columns: raw.columns,
            inner: raw.rows.into_iter(),
        }
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.inner.next().map(|values| Row {
            columns: Arc::clone(&self.columns),
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Rows {}

/// What a statement returns, one variant per result shape.
#[derive(Debug)]
pub enum Output {
    Row(Option<Row>),
    Rows(Rows),
    Affected(u64),
    Scalar(Option<Value>),
    Raw(RawResult),
}

impl Output {
    pub fn into_row(self) -> Option<Row> {
        match self {
            Output::Row(row) => row,
            _ => None,
        }
    }

    pub fn into_rows(self) -> Option<Rows> {
        match self {
            Output::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn affected(&self) -> Option<u64> {
        match self {
            Output::Affected(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_scalar(self) -> Option<Value> {
        match self {
            Output::Scalar(value) => value,
            _ => None,
        }
    }

    pub fn into_raw(self) -> Option<RawResult> {
        match self {
            Output::Raw(raw) => Some(raw),
            _ => None,
        }
    }
}
