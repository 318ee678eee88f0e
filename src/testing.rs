//! Recording engine for unit tests.
//!
//! Every execution and transaction transition is appended to a shared log as
//! the SQL a real database would have seen, so tests can assert on the exact
//! sequence.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bind::{Bindings, CompiledStatement};
use crate::engine::{Dialect, Engine, Session};
use crate::error::EngineError;
use crate::result::RawResult;

pub(crate) type Log = Arc<Mutex<Vec<String>>>;

pub(crate) struct FakeEngine {
    dialect: Dialect,
    log: Log,
    result: RawResult,
    release_fails: bool,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        Self {
            dialect: Dialect::SQLITE,
            log: Log::default(),
            result: RawResult::affected(1),
            release_fails: false,
        }
    }

    pub(crate) fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Result returned by every execution.
    pub(crate) fn returning(mut self, result: RawResult) -> Self {
        self.result = result;
        self
    }

    /// Releasing a savepoint reports that it was already released.
    pub(crate) fn release_fails(mut self) -> Self {
        self.release_fails = true;
        self
    }

    pub(crate) fn log(&self) -> Log {
        Arc::clone(&self.log)
    }
}

pub(crate) fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn record(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn run(
    log: &Log,
    result: &RawResult,
    statement: &CompiledStatement,
    bindings: &Bindings,
) -> Result<RawResult, EngineError> {
    let mut raw = RawResult::default();
    for args in statement.argument_sets(bindings)? {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        record(log, format!("EXECUTE {} [{}]", statement.sql, args.join(", ")));
        raw = raw.merge(result.clone());
    }
    Ok(raw)
}

#[async_trait]
impl Engine for FakeEngine {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(
        &self,
        statement: &CompiledStatement,
        bindings: &Bindings,
    ) -> Result<RawResult, EngineError> {
        run(&self.log, &self.result, statement, bindings)
    }

    async fn begin(&self) -> Result<Box<dyn Session>, EngineError> {
        record(&self.log, "BEGIN");
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
            result: self.result.clone(),
            release_fails: self.release_fails,
            depth: 0,
            open: true,
        }))
    }
}

struct FakeSession {
    log: Log,
    result: RawResult,
    release_fails: bool,
    depth: usize,
    open: bool,
}

impl FakeSession {
    fn ensure_open(&self) -> Result<(), EngineError> {
        match (self.open, self.depth) {
            (true, _) => Ok(()),
            (false, 0) => Err(EngineError::Closed),
            (false, _) => Err(EngineError::SavepointReleased),
        }
    }

    fn rollback_entry(&self) -> String {
        match self.depth {
            0 => "ROLLBACK".to_string(),
            n => format!("ROLLBACK TO SAVEPOINT sp{}", n),
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn execute(
        &mut self,
        statement: &CompiledStatement,
        bindings: &Bindings,
    ) -> Result<RawResult, EngineError> {
        self.ensure_open()?;
        run(&self.log, &self.result, statement, bindings)
    }

    async fn begin_nested<'s>(&'s mut self) -> Result<Box<dyn Session + 's>, EngineError> {
        self.ensure_open()?;
        let depth = self.depth + 1;
        record(&self.log, format!("SAVEPOINT sp{}", depth));
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
            result: self.result.clone(),
            release_fails: self.release_fails,
            depth,
            open: true,
        }))
    }

    async fn commit(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.open = false;
        match self.depth {
            0 => record(&self.log, "COMMIT"),
            _ if self.release_fails => return Err(EngineError::SavepointReleased),
            n => record(&self.log, format!("RELEASE SAVEPOINT sp{}", n)),
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.open = false;
        record(&self.log, self.rollback_entry());
        Ok(())
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if self.open {
            let entry = self.rollback_entry();
            if let Ok(mut log) = self.log.lock() {
                log.push(entry);
            }
        }
    }
}
