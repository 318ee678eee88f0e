//! Caller-owned module cache.
//!
//! Loading is idempotent, so caching is optional. Callers that want to load
//! a directory once and share the result keep a [`ModuleCache`] and pass it
//! where it is needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::LoaderConfig;
use crate::error::Result;
use crate::module::Module;

/// Modules keyed by the directories they were loaded from.
#[derive(Debug, Default)]
pub struct ModuleCache {
    loader: LoaderConfig,
    modules: DashMap<Vec<PathBuf>, Arc<Module>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modules loaded through this cache use `loader`.
    pub fn with_config(loader: LoaderConfig) -> Self {
        Self {
            loader,
            modules: DashMap::new(),
        }
    }

    /// The module for `paths`, loading it on first use. A failed load is not
    /// cached.
    pub fn get_or_load<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) -> Result<Arc<Module>> {
        match self.modules.entry(key(paths)) {
            Entry::Occupied(entry) => {
                tracing::debug!("Module cache hit for {:?}", entry.key());
                Ok(Arc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                let module = Arc::new(Module::load_with(entry.key(), &self.loader)?);
                entry.insert(Arc::clone(&module));
                Ok(module)
            }
        }
    }

    pub fn get<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) -> Option<Arc<Module>> {
        self.modules.get(&key(paths)).map(|entry| Arc::clone(entry.value()))
    }

    /// Forget the module for `paths`. Handles already given out stay valid.
    pub fn remove<P: AsRef<Path>>(&self, paths: impl IntoIterator<Item = P>) -> Option<Arc<Module>> {
        self.modules.remove(&key(paths)).map(|(_, module)| module)
    }

    pub fn clear(&self) {
        self.modules.clear();
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn key<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Vec<PathBuf> {
    paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect()
}
