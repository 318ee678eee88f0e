//! Error types for sqlfn.

use std::path::PathBuf;

use thiserror::Error;

use crate::position::SourcePosition;

/// Message used whenever a statement is invoked with positional values it
/// cannot bind by name.
pub const POSITIONAL_ARGUMENTS: &str =
    "Pass keyword arguments to statements (received positional arguments).";

/// Malformed annotation grammar, located at the token that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error in {}:{}:{} - {message}", .position.source(), .position.line, .position.column)]
pub struct ParserError {
    pub message: String,
    pub position: SourcePosition,
}

impl ParserError {
    pub fn new(message: impl Into<String>, position: &SourcePosition) -> Self {
        Self {
            message: message.into(),
            position: position.clone(),
        }
    }
}

/// Failures reported by an execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Driver error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Could not establish a connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Every pooled connection is in use, typically by an open transaction.
    #[error(
        "No connection available within {0:?}; statements for an open transaction must be called through its Transaction handle"
    )]
    PoolExhausted(std::time::Duration),

    /// A placeholder in the SQL had no value.
    #[error("A value is required for bind parameter '{0}'")]
    MissingParameter(String),

    /// A bulk group was a sequence where a mapping of names was needed.
    #[error("expected a mapping of parameter values, received a sequence")]
    ExpectedMapping,

    /// The engine cannot bind this kind of value.
    #[error("Unsupported value: {0}")]
    Unsupported(String),

    /// The savepoint was already released or rolled back.
    #[error("savepoint has already been released")]
    SavepointReleased,

    /// The session was already committed or rolled back.
    #[error("session is closed")]
    Closed,
}

/// The main error type for sqlfn operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Annotation syntax error.
    #[error(transparent)]
    Parse(#[from] ParserError),

    /// A statement failed construction-time validation.
    #[error("{0}")]
    InvalidStatement(String),

    /// A directory handed to the loader does not exist.
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Two statements share a name.
    #[error(
        "Error loading {} - a SQL function named {name} was already defined in {previous}.",
        .file.display()
    )]
    DuplicateName {
        name: String,
        file: PathBuf,
        previous: String,
    },

    /// A statement name collides with a module operation.
    #[error(
        "Error loading {} - the function name \"{name}\" is reserved. Please choose another name.",
        .file.display()
    )]
    ReservedName { name: String, file: PathBuf },

    /// The caller misused a statement's argument conventions.
    #[error("{0}")]
    InvalidArgument(String),

    /// No engine is bound to the module.
    #[error("No database connection. Bind an engine or call connect() first.")]
    NoConnection,

    /// The module has no statement with this name.
    #[error("No SQL function named '{0}'")]
    UnknownStatement(String),

    /// The transaction was already committed or rolled back.
    #[error("Transaction is already closed")]
    TransactionClosed,

    /// Propagated engine failure.
    #[error(transparent)]
    Engine(EngineError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn positional_arguments() -> Self {
        Self::InvalidArgument(POSITIONAL_ARGUMENTS.to_string())
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            // A sequence reached a slot that binds by name: the caller passed
            // positional values.
            EngineError::ExpectedMapping => Error::positional_arguments(),
            other => Error::Engine(other),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Engine(EngineError::Database(err))
    }
}

/// Result type alias for sqlfn operations.
pub type Result<T> = std::result::Result<T, Error>;
