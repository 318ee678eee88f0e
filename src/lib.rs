//! # sqlfn: Annotated SQL as Named Statements
//!
//! > **Keep SQL in `.sql` files. Call it by name.**
//!
//! sqlfn loads directories of SQL files whose statements carry a small
//! comment header, and turns each one into a named, typed statement.
//!
//! ## Quick Example
//!
//! ```sql
//! -- sql/users/users.sql
//! -- :name user_for_id :1
//! select * from users where user_id = :user_id
//!
//! -- :name find_by_usernames :many
//! select * from users where username in :usernames
//! ```
//!
//! ```rust,ignore
//! use sqlfn::prelude::*;
//!
//! let users = sqlfn::load("sql/users")?;
//! users.connect("sqlite://app.db").await?;
//!
//! let row = users
//!     .call("user_for_id", Args::new().bind("user_id", 42))
//!     .await?
//!     .into_row();
//!
//! let mut tx = users.transaction().await?;
//! tx.call("insert_user", Args::new().bind("username", "oscar")).await?;
//! tx.commit().await?;
//! ```
//!
//! ## Directives
//!
//! | Line                   | Meaning                          |
//! |------------------------|----------------------------------|
//! | `-- :name foo`         | Statement name                   |
//! | `-- :name foo :many`   | Name plus inline result kind     |
//! | `-- :result :scalar`   | Result kind on its own line      |
//!
//! | Keyword             | Result                           |
//! |---------------------|----------------------------------|
//! | `:one` / `:1`       | First row or nothing             |
//! | `:many` / `:*`      | All rows                         |
//! | `:affected` / `:n`  | Affected row count               |
//! | `:scalar`           | First column of first row        |
//! | `:insert`           | Generated key                    |
//! | `:raw` (default)    | Untransformed result             |

pub mod bind;
pub mod config;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod position;
pub mod registry;
pub mod result;
pub mod statement;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use engine::{Dialect, Engine, ParamStyle, Session, SqlxEngine};
pub use error::{EngineError, Error, ParserError, Result};
pub use module::Module;
pub use parser::{parse, parse_with, ParseOptions};
pub use position::SourcePosition;
pub use registry::ModuleCache;
pub use result::{Output, RawResult, ResultKind, Row, Rows};
pub use statement::Statement;
pub use transaction::{Transaction, TransactionState};
pub use value::{Args, Params, Value};

pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, Encoding, LoaderConfig};
    pub use crate::engine::{Dialect, Engine, Session, SqlxEngine};
    pub use crate::error::*;
    pub use crate::module::Module;
    pub use crate::registry::ModuleCache;
    pub use crate::result::{Output, ResultKind, Row};
    pub use crate::statement::Statement;
    pub use crate::transaction::Transaction;
    pub use crate::value::{Args, Value};
}

/// Load every statement file in a directory.
///
/// # Example
///
/// ```
/// let module = sqlfn::load(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/sql/basic")).unwrap();
/// assert_eq!(
///     module.statement("get_user").unwrap().to_string(),
///     "get_user(user_id) :: row"
/// );
/// ```
pub fn load(path: impl AsRef<std::path::Path>) -> Result<Module> {
    Module::load(path)
}
