//! Repository catalog
//!
//! The catalog is owned and refreshed by the embedding application; the
//! indexing core only reads it.

use revindex_core::RepositoryRef;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct RepoCatalog {
    repos: RwLock<Vec<RepositoryRef>>,
}

impl RepoCatalog {
    pub fn new(repos: Vec<RepositoryRef>) -> Self {
        Self {
            repos: RwLock::new(repos),
        }
    }

    /// Swaps in a freshly loaded set of repositories
    pub fn replace(&self, repos: Vec<RepositoryRef>) {
        let mut guard = self.repos.write().unwrap_or_else(PoisonError::into_inner);
        log::info!("Catalog refreshed: {} -> {} repositories", guard.len(), repos.len());
        *guard = repos;
    }

    pub fn get(&self, host: &str, name: &str) -> Option<RepositoryRef> {
        self.repos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.host == host && r.name == name)
            .cloned()
    }

    /// Snapshot of every configured repository
    pub fn repositories(&self) -> Vec<RepositoryRef> {
        self.repos.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.repos.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
