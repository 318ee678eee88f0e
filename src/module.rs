//! Modules: named statements loaded from directories of annotated SQL.
//!
//! Each file ending in the configured extension is read in sorted order and
//! split into statement units, one per `-- :name` line. Names are unique
//! within a module and may not collide with the module's own operations.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{DatabaseConfig, LoaderConfig};
use crate::engine::{Dialect, Engine, SqlxEngine};
use crate::error::{Error, Result};
use crate::parser::{self, ParseOptions};
use crate::position::{SourcePosition, LITERAL_SOURCE};
use crate::result::Output;
use crate::statement::Statement;
use crate::transaction::Transaction;
use crate::value::Args;

/// Names statements may not use.
pub const RESERVED: &[&str] = &[
    "add_queries",
    "add_statement",
    "bind",
    "call",
    "connect",
    "dialect",
    "disconnect",
    "engine",
    "load",
    "sqlpaths",
    "statement",
    "statements",
    "transaction",
    "unbind",
];

/// A set of named statements and the engine they execute on.
///
/// The statement table is only changed through `&mut self`; the engine
/// binding can be swapped through a shared reference.
pub struct Module {
    statements: Vec<Statement>,
    index: HashMap<String, usize>,
    sqlpaths: BTreeSet<PathBuf>,
    loader: LoaderConfig,
    engine: RwLock<Option<Arc<dyn Engine>>>,
}

impl Module {
    /// An empty, unbound module with the default loader settings.
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    pub fn with_config(loader: LoaderConfig) -> Self {
        Self {
            statements: Vec::new(),
            index: HashMap::new(),
            sqlpaths: BTreeSet::new(),
            loader,
            engine: RwLock::new(None),
        }
    }

    /// Load every statement file in `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with([path], &LoaderConfig::default())
    }

    /// Load every statement file in each of `paths`.
    pub fn load_with<P: AsRef<Path>>(
        paths: impl IntoIterator<Item = P>,
        config: &LoaderConfig,
    ) -> Result<Self> {
        let mut module = Self::with_config(config.clone());
        module.add_queries(paths)?;
        Ok(module)
    }

    /// Load more directories into this module. Either every statement is
    /// added or, on error, none is.
    pub fn add_queries<P: AsRef<Path>>(&mut self, paths: impl IntoIterator<Item = P>) -> Result<()> {
        let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();

        let mut staged = Vec::new();
        for path in &paths {
            self.load_directory(path, &mut staged)?;
        }

        tracing::info!(
            "Loaded {} statement(s) from {} path(s)",
            staged.len(),
            paths.len()
        );
        for statement in staged {
            self.insert(statement);
        }
        self.sqlpaths.extend(paths);
        Ok(())
    }

    /// Add one statement, typically parsed from a literal string.
    pub fn add_statement(&mut self, statement: Statement) -> Result<()> {
        self.check_name(&statement, &[])?;
        self.insert(statement);
        Ok(())
    }

    pub fn statement(&self, name: &str) -> Result<&Statement> {
        self.get(name)
            .ok_or_else(|| Error::UnknownStatement(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Statement> {
        self.index.get(name).map(|&i| &self.statements[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Statements in load order.
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Every directory loaded into this module.
    pub fn sqlpaths(&self) -> &BTreeSet<PathBuf> {
        &self.sqlpaths
    }

    pub fn loader(&self) -> &LoaderConfig {
        &self.loader
    }

    // ====================================================================
    // Engine binding
    // ====================================================================

    /// Execute this module's statements on `engine`.
    pub fn bind(&self, engine: Arc<dyn Engine>) {
        tracing::debug!("Binding module to {} engine", engine.dialect().name);
        *self.engine.write().unwrap_or_else(PoisonError::into_inner) = Some(engine);
    }

    pub fn unbind(&self) {
        *self.engine.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_bound(&self) -> bool {
        self.engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The bound engine.
    pub fn engine(&self) -> Result<Arc<dyn Engine>> {
        self.engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NoConnection)
    }

    /// Connect to `url` through sqlx and bind the result.
    pub async fn connect(&self, url: &str) -> Result<()> {
        self.connect_with(url, &DatabaseConfig::default()).await
    }

    pub async fn connect_with(&self, url: &str, config: &DatabaseConfig) -> Result<()> {
        let engine = SqlxEngine::connect_with(url, config).await?;
        self.bind(Arc::new(engine));
        Ok(())
    }

    /// Same as [`unbind`](Self::unbind).
    pub fn disconnect(&self) {
        self.unbind();
    }

    pub fn dialect(&self) -> Result<Dialect> {
        Ok(self.engine()?.dialect())
    }

    // ====================================================================
    // Execution
    // ====================================================================

    /// Call a statement as its own auto-committed unit.
    ///
    /// This never joins an open [`Transaction`]; work for one goes through
    /// [`Transaction::call`]. On a single-connection pool held by an open
    /// transaction the call fails fast with
    /// [`EngineError::PoolExhausted`](crate::EngineError::PoolExhausted).
    ///
    /// Arguments are validated before the engine is consulted, so misuse is
    /// reported even on an unbound module.
    pub async fn call(&self, name: &str, args: impl Into<Args>) -> Result<Output> {
        let statement = self.statement(name)?;
        let bindings = statement.prepare(args.into())?;
        let engine = self.engine()?;
        let compiled = engine.compile(statement.template(), &bindings.kinds());

        tracing::debug!("Calling {}", statement.name());
        let raw = engine.execute(&compiled, &bindings).await?;
        Ok(statement.result().transform(raw))
    }

    /// Open a root transaction.
    pub async fn transaction(&self) -> Result<Transaction<'_>> {
        let engine = self.engine()?;
        let session = engine.begin().await?;
        Ok(Transaction::root(self, engine, session))
    }

    // ====================================================================
    // Loading
    // ====================================================================

    fn load_directory(&self, dir: &Path, staged: &mut Vec<Statement>) -> Result<()> {
        if !dir.is_dir() {
            return Err(Error::DirectoryNotFound(dir.to_path_buf()));
        }

        let extension = self.loader.extension.as_str();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(extension));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let options = ParseOptions {
            header: self.loader.header_comments,
        };

        for file in files {
            let text = self.loader.encoding.decode(std::fs::read(&file)?, &file)?;
            let source = file.display().to_string();

            for (line, chunk) in split_statements(&text) {
                let start = SourcePosition::at(source.as_str(), line, 1);
                let statement = parser::parse_with(&chunk, Some(&start), &options)?;
                self.check_name(&statement, staged)?;
                tracing::debug!("Parsed {} at {}:{}", statement.name(), source, line + 1);
                staged.push(statement);
            }
        }
        Ok(())
    }

    fn check_name(&self, statement: &Statement, staged: &[Statement]) -> Result<()> {
        let name = statement.name();
        let file = statement
            .filename()
            .map_or_else(|| PathBuf::from(LITERAL_SOURCE), Path::to_path_buf);

        if RESERVED.contains(&name) {
            return Err(Error::ReservedName {
                name: name.to_string(),
                file,
            });
        }

        let previous = self
            .get(name)
            .or_else(|| staged.iter().find(|s| s.name() == name));
        if let Some(previous) = previous {
            return Err(Error::DuplicateName {
                name: name.to_string(),
                file,
                previous: previous
                    .filename()
                    .map_or_else(|| LITERAL_SOURCE.to_string(), |p| p.display().to_string()),
            });
        }
        Ok(())
    }

    fn insert(&mut self, statement: Statement) {
        self.index
            .insert(statement.name().to_string(), self.statements.len());
        self.statements.push(statement);
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("statements", &self.index.keys().collect::<BTreeSet<_>>())
            .field("sqlpaths", &self.sqlpaths)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Split file text into statement units with the zero-based line each
/// starts on. A unit starts at every `-- :name` line after the first line;
/// units with no content are dropped.
fn split_statements(text: &str) -> Vec<(usize, String)> {
    let lines: Vec<&str> = text.lines().collect();

    let mut starts = vec![0];
    starts.extend((1..lines.len()).filter(|&i| starts_statement(lines[i])));

    starts
        .iter()
        .enumerate()
        .map(|(k, &start)| {
            let end = starts.get(k + 1).copied().unwrap_or(lines.len());
            (start, lines[start..end].join("\n"))
        })
        .filter(|(_, chunk)| !chunk.trim().is_empty())
        .collect()
}

/// `--+\s*:name` at the start of the line.
fn starts_statement(line: &str) -> bool {
    let rest = line.trim_start_matches('-');
    line.len() - rest.len() >= 2 && rest.trim_start().starts_with(":name")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoding;
    use crate::engine::ParamStyle;
    use crate::result::ResultKind;
    use crate::testing::{entries, FakeEngine};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn fixtures(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/sql").join(name)
    }

    fn names(module: &Module) -> Vec<&str> {
        module.statements().map(Statement::name).collect()
    }

    #[test]
    fn test_split_statements() {
        let text = "-- :name a\nselect 1\n\n\n-- :name b :many\nselect 2\n---:name c\nselect 3";
        assert_eq!(
            split_statements(text),
            vec![
                (0, "-- :name a\nselect 1\n\n".to_string()),
                (4, "-- :name b :many\nselect 2".to_string()),
                (6, "---:name c\nselect 3".to_string()),
            ]
        );
    }

    #[test]
    fn test_split_ignores_indented_and_single_dash() {
        let text = "-- :name a\nselect 1\n  -- :name b\n- :name c";
        assert_eq!(split_statements(text).len(), 1);
    }

    #[test]
    fn test_split_empty_file() {
        assert!(split_statements("").is_empty());
        assert!(split_statements("\n\n  \n").is_empty());
    }

    #[test]
    fn test_load_basic() {
        let module = Module::load(fixtures("basic")).unwrap();
        assert_eq!(names(&module), vec!["get_user", "search_users", "user_count"]);
        assert!(module.sqlpaths().contains(&fixtures("basic")));

        let get_user = module.statement("get_user").unwrap();
        assert_eq!(get_user.result(), ResultKind::Row);
        assert_eq!(get_user.param_names(), vec!["user_id"]);
        assert_eq!(
            get_user.filename(),
            Some(fixtures("basic").join("users.sql").as_path())
        );
    }

    #[test]
    fn test_multiple_statements_per_file_track_lines() {
        let module = Module::load(fixtures("multi-statement")).unwrap();
        assert_eq!(names(&module), vec!["first", "second", "third"]);

        let source = fixtures("multi-statement").join("queries.sql");
        let third = module.statement("third").unwrap();
        assert_eq!(
            third.sql().lines().next(),
            Some(format!("-- sqlfn statement third in file \"{}\" at line 9", source.display()).as_str())
        );
        assert_eq!(third.doc(), Some("The third one."));
        assert_eq!(third.result(), ResultKind::Scalar);
    }

    #[test]
    fn test_without_header_comments() {
        let config = LoaderConfig {
            header_comments: false,
            ..LoaderConfig::default()
        };
        let module = Module::load_with([fixtures("basic")], &config).unwrap();
        assert_eq!(
            module.statement("user_count").unwrap().sql(),
            "select count(*) from users"
        );
    }

    #[test]
    fn test_latin1_files() {
        let config = LoaderConfig {
            encoding: Encoding::Latin1,
            ..LoaderConfig::default()
        };
        let module = Module::load_with([fixtures("latin1")], &config).unwrap();
        assert_eq!(
            module.statement("latin_greeting").unwrap().doc(),
            Some("Café au lait.")
        );

        assert!(matches!(Module::load(fixtures("latin1")), Err(Error::Io(_))));
    }

    #[test]
    fn test_other_files_are_skipped() {
        let module = Module::load(fixtures("mod1")).unwrap();
        assert_eq!(module.len(), 1);
    }

    #[test]
    fn test_missing_directory() {
        let err = Module::load("does/not/exist").unwrap_err();
        assert_eq!(err.to_string(), "Directory not found: does/not/exist");
    }

    #[test]
    fn test_duplicate_name_across_files() {
        let err = Module::load(fixtures("duplicate-name")).unwrap_err();
        let first = fixtures("duplicate-name").join("foo.sql");
        let second = fixtures("duplicate-name").join("foo2.sql");
        assert_eq!(
            err.to_string(),
            format!(
                "Error loading {} - a SQL function named foo was already defined in {}.",
                second.display(),
                first.display()
            )
        );
    }

    #[test]
    fn test_reserved_name() {
        let err = Module::load(fixtures("reserved")).unwrap_err();
        match err {
            Error::ReservedName { name, file } => {
                assert_eq!(name, "disconnect");
                assert_eq!(file, fixtures("reserved").join("disconnect.sql"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_aborts_load() {
        let err = Module::load(fixtures("bad-keyword")).unwrap_err();
        let file = fixtures("bad-keyword").join("bad.sql");
        assert_eq!(
            err.to_string(),
            format!("Error in {}:4:17 - unrecognized keyword ':wrong'", file.display())
        );
    }

    #[test]
    fn test_add_queries() {
        let mut module = Module::load(fixtures("mod1")).unwrap();
        module.add_queries([fixtures("mod2")]).unwrap();
        assert!(module.contains("mod1_query"));
        assert!(module.contains("mod2_query"));
        assert_eq!(module.sqlpaths().len(), 2);
    }

    #[test]
    fn test_add_queries_is_atomic() {
        let mut module = Module::load(fixtures("mod1")).unwrap();
        let err = module
            .add_queries([fixtures("mod2"), fixtures("duplicate-name")])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName { .. }));
        assert_eq!(names(&module), vec!["mod1_query"]);
        assert_eq!(module.sqlpaths().len(), 1);
    }

    #[test]
    fn test_add_statement() {
        let mut module = Module::new();
        module
            .add_statement(parser::parse("-- :name foo :1\nselect 1", None).unwrap())
            .unwrap();
        let err = module
            .add_statement(parser::parse("-- :name foo\nselect 2", None).unwrap())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error loading <literal> - a SQL function named foo was already defined in <literal>."
        );
        let err = module
            .add_statement(parser::parse("-- :name transaction\nselect 2", None).unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::ReservedName { .. }));
    }

    #[test]
    fn test_unknown_statement() {
        let module = Module::new();
        assert!(matches!(
            module.statement("nope"),
            Err(Error::UnknownStatement(ref n)) if n == "nope"
        ));
    }

    #[tokio::test]
    async fn test_unbound_module() {
        let module = Module::load(fixtures("basic")).unwrap();
        assert!(!module.is_bound());
        assert!(matches!(module.dialect(), Err(Error::NoConnection)));
        assert!(matches!(
            module.call("user_count", Args::new()).await,
            Err(Error::NoConnection)
        ));
        assert!(matches!(module.transaction().await, Err(Error::NoConnection)));
    }

    #[tokio::test]
    async fn test_argument_misuse_is_reported_before_connection() {
        let module = Module::load(fixtures("basic")).unwrap();
        let mixed = Args::new()
            .bind("user_id", 1)
            .group(Value::map([("user_id", 2)]));
        let scalar_group = Args::new().group(1);
        for args in [mixed, scalar_group] {
            assert!(matches!(
                module.call("get_user", args).await,
                Err(Error::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_bind_and_unbind() {
        let module = Module::load(fixtures("basic")).unwrap();
        let engine = FakeEngine::new().with_dialect(Dialect::POSTGRES);
        let log = engine.log();
        module.bind(Arc::new(engine));
        assert_eq!(module.dialect().unwrap().paramstyle, ParamStyle::Numeric);

        module
            .call("search_users", Args::new().bind("names", Value::set(["oscar", "dottie"])))
            .await
            .unwrap();
        let executed = entries(&log);
        assert_eq!(executed.len(), 1);
        assert!(
            executed[0].ends_with("where username in ($1, $2) [oscar, dottie]"),
            "{}",
            executed[0]
        );

        module.disconnect();
        assert!(matches!(module.dialect(), Err(Error::NoConnection)));
    }

    #[tokio::test]
    async fn test_list_set_and_tuple_expand_alike() {
        let module = Module::load(fixtures("basic")).unwrap();
        let engine = FakeEngine::new();
        let log = engine.log();
        module.bind(Arc::new(engine));

        for names in [
            Value::list(["oscar", "dottie"]),
            Value::set(["oscar", "dottie"]),
            Value::tuple(["oscar", "dottie"]),
        ] {
            module
                .call("search_users", Args::new().bind("names", names))
                .await
                .unwrap();
        }

        let executed = entries(&log);
        assert_eq!(executed.len(), 3);
        assert!(executed.iter().all(|e| e == &executed[0]));
        assert!(executed[0].ends_with("in (?, ?) [oscar, dottie]"), "{}", executed[0]);
    }

    #[tokio::test]
    async fn test_batch_call() {
        let mut module = Module::new();
        module
            .add_statement(
                Statement::new(
                    "insert_user",
                    "insert into users (username) values (:username)",
                    None,
                    ResultKind::AffectedCount,
                    None,
                )
                .unwrap(),
            )
            .unwrap();
        let engine = FakeEngine::new();
        let log = engine.log();
        module.bind(Arc::new(engine));

        let affected = module
            .call(
                "insert_user",
                Args::new().groups([
                    Value::map([("username", "joe")]),
                    Value::map([("username", "paul")]),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(affected.affected(), Some(2));
        assert_eq!(entries(&log).len(), 2);

        let err = module
            .call("insert_user", Args::new().group(Value::list(["joe"])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
