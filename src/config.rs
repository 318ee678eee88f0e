//! Configuration.
//!
//! Read from `./sqlfn.toml`, then `<config dir>/sqlfn/config.toml`:
//!
//! ```toml
//! [loader]
//! extension = "sql"
//! encoding = "utf-8"       # or "latin-1"
//! header_comments = true
//!
//! [database]
//! url = "sqlite::memory:"  # SQLFN_DATABASE_URL overrides
//! max_connections = 5
//! acquire_timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "sqlfn.toml";
pub const DATABASE_URL_ENV: &str = "SQLFN_DATABASE_URL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loader: LoaderConfig,
    pub database: DatabaseConfig,
}

/// How statement files are found and read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Files whose names end with this are loaded.
    pub extension: String,
    pub encoding: Encoding,
    /// Prefix each statement's SQL with a comment naming it and its source.
    pub header_comments: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extension: "sql".to_string(),
            encoding: Encoding::Utf8,
            header_comments: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl Encoding {
    /// Decode file contents. `origin` names the file in errors.
    pub fn decode(self, bytes: Vec<u8>, origin: &Path) -> Result<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes).map_err(|e| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("{} is not valid UTF-8: {}", origin.display(), e),
                ))
            }),
            Encoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    /// Seconds to wait for a free pooled connection.
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load from the first config file found, else defaults. The database URL
    /// environment variable wins over any file.
    pub fn load() -> Result<Self> {
        let mut config = match Self::locate() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database.url = Some(url);
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::debug!("Reading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    fn locate() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("sqlfn").join("config.toml"))
            .filter(|path| path.is_file())
    }
}
