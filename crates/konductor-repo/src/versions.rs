//! Version cascade
//!
//! Resolves the version table of a run from a prioritized list of sources:
//!
//! 1. Run cache (unless a refresh is forced)
//! 2. Explicit source, URL or path; failure is fatal
//! 3. `<versions_dir>/<stack>.json` when enabled
//! 4. Local default file
//! 5. Remote channel file
//!
//! The first source that yields a parseable table wins and is written back to
//! the run cache.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::cache::VersionCache;
use crate::config::VersionsConfig;
use crate::error::{RepoError, Result};
use crate::http::{Fetcher, is_url};

/// Module name -> resolved version
pub type VersionTable = BTreeMap<String, String>;

/// Where a version table came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSource {
    Cache(PathBuf),
    Explicit(String),
    StackFile(PathBuf),
    DefaultFile(PathBuf),
    Remote(String),
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSource::Cache(p) => write!(f, "cache {}", p.display()),
            VersionSource::Explicit(s) => write!(f, "explicit source {}", s),
            VersionSource::StackFile(p) => write!(f, "stack file {}", p.display()),
            VersionSource::DefaultFile(p) => write!(f, "default file {}", p.display()),
            VersionSource::Remote(u) => write!(f, "remote {}", u),
        }
    }
}

/// Resolves the run's version table
pub struct VersionResolver<F: Fetcher> {
    config: VersionsConfig,
    stack_name: String,
    fetcher: F,
    cache: VersionCache,
    base_dir: PathBuf,
}

impl<F: Fetcher> VersionResolver<F> {
    pub fn new(config: VersionsConfig, stack_name: impl Into<String>, fetcher: F) -> Self {
        let cache = VersionCache::new(config.cache_path()).with_max_age(config.cache_max_age);
        Self {
            config,
            stack_name: stack_name.into(),
            fetcher,
            cache,
            base_dir: PathBuf::from("."),
        }
    }

    /// Resolve relative version file paths against `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    /// Resolve the version table
    pub async fn resolve(&self, force_refresh: bool) -> Result<VersionTable> {
        self.resolve_with_source(force_refresh)
            .await
            .map(|(table, _)| table)
    }

    /// Resolve the version table and report which source produced it
    pub async fn resolve_with_source(
        &self,
        force_refresh: bool,
    ) -> Result<(VersionTable, VersionSource)> {
        if !force_refresh {
            if let Some(table) = self.cache.load() {
                debug!("using cached versions from {}", self.cache.path().display());
                return Ok((table, VersionSource::Cache(self.cache.path().to_path_buf())));
            }
        }

        let (table, source) = self.resolve_uncached().await?;
        info!("resolved {} module versions from {}", table.len(), source);

        if let Err(e) = self.cache.store(&table) {
            warn!("Failed to persist version cache: {}", e);
        }

        Ok((table, source))
    }

    async fn resolve_uncached(&self) -> Result<(VersionTable, VersionSource)> {
        if let Some(source) = &self.config.source {
            let table = self.load_explicit(source).await.map_err(|e| {
                RepoError::ExplicitSourceFailed {
                    source_ref: source.clone(),
                    message: e.to_string(),
                }
            })?;
            return Ok((table, VersionSource::Explicit(source.clone())));
        }

        let mut tried = Vec::new();

        if self.config.stack_file {
            let path = self.resolve_path(&self.config.stack_file_path(&self.stack_name));
            match read_table(&path).await {
                Ok(table) => return Ok((table, VersionSource::StackFile(path))),
                Err(e) => debug!("stack version file {} unusable: {}", path.display(), e),
            }
            tried.push(path.display().to_string());
        }

        let default_file = self.resolve_path(&self.config.default_file);
        match read_table(&default_file).await {
            Ok(table) => return Ok((table, VersionSource::DefaultFile(default_file))),
            Err(e) => debug!(
                "default version file {} unusable: {}",
                default_file.display(),
                e
            ),
        }
        tried.push(default_file.display().to_string());

        let url = self.config.channel_url();
        match self.fetch_table(&url).await {
            Ok(table) => return Ok((table, VersionSource::Remote(url))),
            Err(e) => warn!(
                "remote versions for channel '{}' unavailable: {}",
                self.config.channel, e
            ),
        }
        tried.push(url);

        Err(RepoError::VersionSourceExhausted {
            tried: tried.join(", "),
        })
    }

    async fn load_explicit(&self, source: &str) -> Result<VersionTable> {
        if is_url(source) {
            self.fetch_table(source).await
        } else {
            read_table(&self.resolve_path(Path::new(source))).await
        }
    }

    async fn fetch_table(&self, url: &str) -> Result<VersionTable> {
        let body = self.fetcher.fetch(url).await?;
        parse_table(&body, url)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

async fn read_table(path: &Path) -> Result<VersionTable> {
    let body = tokio::fs::read(path).await?;
    parse_table(&body, &path.display().to_string())
}

fn parse_table(body: &[u8], origin: &str) -> Result<VersionTable> {
    serde_json::from_slice(body).map_err(|e| RepoError::InvalidVersionTable {
        origin: origin.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fetcher serving canned bodies and counting requests
    #[derive(Default)]
    struct FakeFetcher {
        bodies: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.bodies.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.requests.lock().unwrap().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| RepoError::HttpError {
                    status: 404,
                    message: url.to_string(),
                })
        }
    }

    const REMOTE: &str = "https://versions.example.com/{channel}.json";

    fn config(dir: &Path) -> VersionsConfig {
        VersionsConfig {
            remote_url: REMOTE.to_string(),
            cache_path: Some(dir.join("cache.json")),
            ..Default::default()
        }
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_local_default_file_without_network() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "default_versions.json", r#"{"kubevirt": "v1.3.0"}"#);

        let fetcher = std::sync::Arc::new(FakeFetcher::default());
        let resolver = VersionResolver::new(config(dir.path()), "dev", fetcher.clone())
            .with_base_dir(dir.path());

        let (table, source) = resolver.resolve_with_source(false).await.unwrap();
        assert_eq!(table["kubevirt"], "v1.3.0");
        assert_eq!(table.len(), 1);
        assert!(matches!(source, VersionSource::DefaultFile(_)));
        assert_eq!(fetcher.request_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_source_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "default_versions.json", r#"{"kubevirt": "v1.3.0"}"#);

        let mut cfg = config(dir.path());
        cfg.source = Some("pinned/missing.json".to_string());

        let resolver = VersionResolver::new(cfg, "dev", FakeFetcher::default())
            .with_base_dir(dir.path());

        let err = resolver.resolve(false).await.unwrap_err();
        assert!(matches!(err, RepoError::ExplicitSourceFailed { .. }));
    }

    #[tokio::test]
    async fn test_explicit_url_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.source = Some("https://pins.example.com/v.json".to_string());

        let fetcher = FakeFetcher::default()
            .with("https://pins.example.com/v.json", r#"{"cilium": "1.16.1"}"#);
        let resolver = VersionResolver::new(cfg, "dev", fetcher).with_base_dir(dir.path());

        let (table, source) = resolver.resolve_with_source(false).await.unwrap();
        assert_eq!(table["cilium"], "1.16.1");
        assert_eq!(
            source,
            VersionSource::Explicit("https://pins.example.com/v.json".to_string())
        );
    }

    #[tokio::test]
    async fn test_explicit_url_unparseable_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.source = Some("https://pins.example.com/v.json".to_string());

        let fetcher = FakeFetcher::default()
            .with("https://pins.example.com/v.json", "<html>not json</html>")
            .with("https://versions.example.com/stable.json", r#"{"a": "1"}"#);
        let resolver = VersionResolver::new(cfg, "dev", fetcher).with_base_dir(dir.path());

        assert!(matches!(
            resolver.resolve(false).await,
            Err(RepoError::ExplicitSourceFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_stack_file_preferred_over_default() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "versions/dev.json", r#"{"kubevirt": "v1.4.0"}"#);
        write(dir.path(), "default_versions.json", r#"{"kubevirt": "v1.3.0"}"#);

        let mut cfg = config(dir.path());
        cfg.stack_file = true;
        let resolver =
            VersionResolver::new(cfg, "dev", FakeFetcher::default()).with_base_dir(dir.path());

        let (table, source) = resolver.resolve_with_source(false).await.unwrap();
        assert_eq!(table["kubevirt"], "v1.4.0");
        assert!(matches!(source, VersionSource::StackFile(_)));
    }

    #[tokio::test]
    async fn test_missing_stack_file_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "default_versions.json", r#"{"kubevirt": "v1.3.0"}"#);

        let mut cfg = config(dir.path());
        cfg.stack_file = true;
        let resolver =
            VersionResolver::new(cfg, "prod", FakeFetcher::default()).with_base_dir(dir.path());

        assert_eq!(resolver.resolve(false).await.unwrap()["kubevirt"], "v1.3.0");
    }

    #[tokio::test]
    async fn test_remote_channel_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FakeFetcher::default()
            .with("https://versions.example.com/stable.json", r#"{"multus": "v4.1.0"}"#);
        let resolver =
            VersionResolver::new(config(dir.path()), "dev", fetcher).with_base_dir(dir.path());

        let (table, source) = resolver.resolve_with_source(false).await.unwrap();
        assert_eq!(table["multus"], "v4.1.0");
        assert!(matches!(source, VersionSource::Remote(_)));
    }

    #[tokio::test]
    async fn test_all_sources_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "default_versions.json", "{ broken");

        let resolver = VersionResolver::new(config(dir.path()), "dev", FakeFetcher::default())
            .with_base_dir(dir.path());

        let err = resolver.resolve(false).await.unwrap_err();
        assert!(matches!(err, RepoError::VersionSourceExhausted { .. }));
        assert!(!resolver.cache().path().exists());
    }

    #[tokio::test]
    async fn test_cache_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = std::sync::Arc::new(
            FakeFetcher::default()
                .with("https://versions.example.com/stable.json", r#"{"multus": "v4.1.0"}"#),
        );
        let resolver = VersionResolver::new(config(dir.path()), "dev", fetcher.clone())
            .with_base_dir(dir.path());

        let first = resolver.resolve(false).await.unwrap();
        assert_eq!(fetcher.request_count(), 1);

        let (second, source) = resolver.resolve_with_source(false).await.unwrap();
        assert_eq!(first, second);
        assert!(matches!(source, VersionSource::Cache(_)));
        assert_eq!(fetcher.request_count(), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        VersionCache::new(cfg.cache_path())
            .store(&VersionTable::from([("multus".to_string(), "old".to_string())]))
            .unwrap();

        let fetcher = std::sync::Arc::new(
            FakeFetcher::default()
                .with("https://versions.example.com/stable.json", r#"{"multus": "v4.1.0"}"#),
        );
        let resolver =
            VersionResolver::new(cfg, "dev", fetcher.clone()).with_base_dir(dir.path());

        assert_eq!(resolver.resolve(false).await.unwrap()["multus"], "old");
        assert_eq!(fetcher.request_count(), 0);

        assert_eq!(resolver.resolve(true).await.unwrap()["multus"], "v4.1.0");
        assert_eq!(fetcher.request_count(), 1);
        assert_eq!(resolver.cache().load().unwrap()["multus"], "v4.1.0");
    }
}
