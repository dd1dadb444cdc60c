//! Run-scoped version cache
//!
//! A single JSON object (module name -> version) at a well-known path. The
//! contents are trusted verbatim; nothing is revalidated against upstream.
//! Concurrent runs sharing one cache path are not coordinated.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::error::{RepoError, Result};
use crate::versions::VersionTable;

/// On-disk version cache
#[derive(Debug, Clone)]
pub struct VersionCache {
    path: PathBuf,
    max_age: Option<Duration>,
}

impl VersionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_age: None,
        }
    }

    /// Treat cache files older than `max_age` as absent
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached table
    ///
    /// Absence, staleness and corruption all return `None`: the cache is an
    /// optimization and never a reason to fail resolution.
    pub fn load(&self) -> Option<VersionTable> {
        if !self.path.exists() {
            return None;
        }

        if self.is_stale() {
            debug!("version cache {} is stale, ignoring", self.path.display());
            return None;
        }

        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read version cache {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<VersionTable>(&content) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!("Version cache corrupted, ignoring: {}", e);
                None
            }
        }
    }

    /// Persist a table, replacing any previous cache
    pub fn store(&self, table: &VersionTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_vec_pretty(table)?;
        std::fs::write(&self.path, content).map_err(|e| RepoError::CacheError {
            message: format!("Failed to write {}: {}", self.path.display(), e),
        })
    }

    fn is_stale(&self) -> bool {
        let Some(max_age) = self.max_age else {
            return false;
        };
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > max_age)
    }
}
