//! Explicit transaction handles.
//!
//! [`Module::transaction`](crate::Module::transaction) opens a root
//! transaction; [`Transaction::transaction`] layers a savepoint on an open
//! handle. The borrow checker keeps the chain linear: a parent is unusable
//! while a nested handle is alive, so there is exactly one active level.
//!
//! ```rust,ignore
//! let mut tx = users.transaction().await?;
//! tx.call("insert_user", Args::new().bind("username", "joe")).await?;
//! {
//!     let mut nested = tx.transaction().await?;
//!     nested.call("insert_user", Args::new().bind("username", "paul")).await?;
//!     nested.rollback().await?;
//! }
//! tx.commit().await?; // only "joe" persists
//! ```

use std::sync::Arc;

use crate::engine::{Engine, Session};
use crate::error::{EngineError, Error, Result};
use crate::module::Module;
use crate::result::Output;
use crate::value::Args;

/// Where a handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Committed or rolled back.
    Idle,
    /// Top-level transaction owning a real engine transaction.
    RootActive,
    /// Savepoint at the given depth (1 for the first level).
    NestedActive(usize),
}

/// An open transaction or savepoint. Statements called through it run in its
/// session.
///
/// A handle dropped while open is rolled back.
pub struct Transaction<'m> {
    module: &'m Module,
    engine: Arc<dyn Engine>,
    session: Box<dyn Session + 'm>,
    depth: usize,
    finished: bool,
}

impl<'m> Transaction<'m> {
    pub(crate) fn root(
        module: &'m Module,
        engine: Arc<dyn Engine>,
        session: Box<dyn Session + 'm>,
    ) -> Self {
        tracing::debug!("BEGIN transaction");
        Self {
            module,
            engine,
            session,
            depth: 0,
            finished: false,
        }
    }

    /// `0` for the root transaction.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn is_open(&self) -> bool {
        !self.finished
    }

    pub fn state(&self) -> TransactionState {
        match (self.finished, self.depth) {
            (true, _) => TransactionState::Idle,
            (false, 0) => TransactionState::RootActive,
            (false, depth) => TransactionState::NestedActive(depth),
        }
    }

    /// Call a statement of the owning module inside this transaction.
    pub async fn call(&mut self, name: &str, args: impl Into<Args>) -> Result<Output> {
        self.ensure_open()?;
        let statement = self.module.statement(name)?;
        let bindings = statement.prepare(args.into())?;
        let compiled = self
            .engine
            .compile(statement.template(), &bindings.kinds());

        tracing::debug!("Calling {} at transaction depth {}", statement.name(), self.depth);
        let raw = self.session.execute(&compiled, &bindings).await?;
        Ok(statement.result().transform(raw))
    }

    /// Begin a savepoint nested in this transaction.
    pub async fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.ensure_open()?;
        let session = self.session.begin_nested().await?;
        let depth = self.depth + 1;
        tracing::debug!("SAVEPOINT at depth {}", depth);

        Ok(Transaction {
            module: self.module,
            engine: Arc::clone(&self.engine),
            session,
            depth,
            finished: false,
        })
    }

    /// Commit. For a savepoint, an engine report that it was already released
    /// counts as success. No-op once finished.
    pub async fn commit(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        match self.session.commit().await {
            Ok(()) => {
                tracing::debug!("COMMIT at depth {}", self.depth);
                Ok(())
            }
            Err(EngineError::SavepointReleased) if !self.is_root() => {
                tracing::debug!("Savepoint at depth {} was already released", self.depth);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Roll back. No-op once finished.
    pub async fn rollback(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        tracing::debug!("ROLLBACK at depth {}", self.depth);
        self.session.rollback().await?;
        Ok(())
    }

    /// Close the transaction according to `outcome`: commit on `Ok`, roll
    /// back on `Err`. The error is passed through unchanged; a failed
    /// rollback is only logged.
    pub async fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::warn!("Rollback after error failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            Err(Error::TransactionClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                "Transaction at depth {} dropped while open; rolling back",
                self.depth
            );
        }
    }
}
