//! CLI command implementations

pub mod modules;
pub mod preview;
pub mod up;
pub mod versions;

use konductor_core::{GlobalMetadataStore, Provenance, StackConfig};
use konductor_engine::{Driver, ModuleRegistry};
use konductor_kube::{ProvisioningEngine, Provisioner};
use konductor_repo::{HttpFetcher, VersionResolver, VersionSource, VersionTable, VersionsConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

/// Flags shared by every subcommand
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: PathBuf,
    pub stack: Option<String>,
    pub refresh_versions: bool,
    pub kube_context: Option<String>,
}

/// A loaded stack plus everything resolved from it
pub struct Session {
    pub stack: StackConfig,
    pub base_dir: PathBuf,
    pub fetcher: Arc<HttpFetcher>,
    pub registry: Arc<ModuleRegistry>,
}

impl Session {
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let mut stack = StackConfig::from_file(&args.config)?;
        if let Some(name) = &args.stack {
            stack.set_name(name.clone());
        }
        debug!(stack = %stack.name(), path = %args.config.display(), "loaded stack");

        Ok(Self {
            stack,
            base_dir: base_dir(&args.config),
            fetcher: Arc::new(HttpFetcher::new()?),
            registry: Arc::new(ModuleRegistry::builtin()),
        })
    }

    /// Run the version cascade for this stack
    pub async fn resolve_versions(&self, refresh: bool) -> Result<(VersionTable, VersionSource)> {
        let config: VersionsConfig = self.stack.get_typed("versions")?;
        let resolver = VersionResolver::new(config, self.stack.name(), self.fetcher.clone())
            .with_base_dir(&self.base_dir);
        Ok(resolver.resolve_with_source(refresh).await?)
    }

    /// Explicit `modules` order from the stack, registration order otherwise
    pub fn module_order(&self) -> Vec<String> {
        self.stack
            .module_order()
            .unwrap_or_else(|| self.registry.names())
    }

    /// Build a driver over `engine` with the run-wide metadata installed
    ///
    /// The driver fills the shared store from the stack's `compliance` block
    /// when the run starts; the provisioner reads it for every resource.
    pub async fn driver(&self, engine: Arc<dyn ProvisioningEngine>) -> Driver {
        let provenance = Provenance::collect(&self.base_dir).await;

        let store = Arc::new(GlobalMetadataStore::new());
        let provisioner = Provisioner::new(engine).with_metadata_store(store.clone());

        Driver::new(self.registry.clone(), provisioner)
            .with_provenance(provenance)
            .with_metadata_store(store)
            .with_fetcher(self.fetcher.clone())
    }
}

/// Directory relative version files are resolved against
fn base_dir(config: &Path) -> PathBuf {
    match config.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
