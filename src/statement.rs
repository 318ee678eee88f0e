//! Validated, named SQL statements.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::bind::{Bindings, SqlTemplate};
use crate::error::{Error, Result};
use crate::result::ResultKind;
use crate::value::{Args, Value};

/// A named SQL statement bound to a result kind.
///
/// Statements are immutable once built. They execute through the
/// [`Module`](crate::Module) that owns them.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    name: String,
    sql: String,
    doc: Option<String>,
    result: ResultKind,
    filename: Option<PathBuf>,
    template: SqlTemplate,
}

impl Statement {
    /// Build a statement. Fails when the name is empty or not an identifier,
    /// or when the SQL is empty after trimming.
    pub fn new(
        name: impl Into<String>,
        sql: impl AsRef<str>,
        doc: Option<String>,
        result: ResultKind,
        filename: Option<PathBuf>,
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |msg: String| match &filename {
            Some(file) => Error::InvalidStatement(format!("{} In: {}", msg, file.display())),
            None => Error::InvalidStatement(msg),
        };

        if name.is_empty() {
            return Err(invalid("Statement must have a name.".to_string()));
        }
        if !is_legal_name(&name) {
            return Err(invalid(format!("'{}' is not a legal function name.", name)));
        }

        let sql = sql.as_ref().trim();
        if sql.is_empty() {
            return Err(invalid("SQL string cannot be empty.".to_string()));
        }

        Ok(Self {
            template: SqlTemplate::parse(sql),
            name,
            sql: sql.to_string(),
            doc,
            result,
            filename,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn result(&self) -> ResultKind {
        self.result
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn template(&self) -> &SqlTemplate {
        &self.template
    }

    /// Bound parameter names, ordered by first occurrence in the SQL.
    pub fn param_names(&self) -> Vec<&str> {
        self.template.param_names()
    }

    /// Validate and convert invocation arguments.
    ///
    /// Named values are the normal calling convention. Positional groups are
    /// only for bulk execution and may not be mixed with named values; each
    /// group must be a mapping, sequence or set.
    pub fn prepare(&self, args: Args) -> Result<Bindings> {
        let Args { named, positional } = args;

        if positional.is_empty() {
            return Ok(Bindings::Named(
                named
                    .into_iter()
                    .map(|(name, value)| (name, value.into_bindable()))
                    .collect(),
            ));
        }

        if !named.is_empty() {
            return Err(Error::positional_arguments());
        }

        let groups_ok = positional.iter().all(|group| {
            matches!(
                group,
                Value::Map(_) | Value::List(_) | Value::Set(_) | Value::Tuple(_)
            )
        });
        if !groups_ok {
            return Err(Error::positional_arguments());
        }

        Ok(Bindings::Batch(
            positional.into_iter().map(Value::into_bindable).collect(),
        ))
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) :: {}",
            self.name,
            self.param_names().join(", "),
            self.result.label()
        )
    }
}

/// `[A-Za-z_][A-Za-z0-9_]+`
pub(crate) fn is_legal_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let rest = chars.as_str();
    (first.is_ascii_alphabetic() || first == '_')
        && !rest.is_empty()
        && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
