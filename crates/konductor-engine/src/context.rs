//! What a deploy entrypoint receives and returns

use konductor_kube::{ApplyOptions, Provisioner, Resource, ResourceHandle};
use konductor_repo::{ChartVersionLookup, Fetcher, VersionTable, latest_stable_chart_version};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Everything a module deployment can use
///
/// Cheap to clone; the dependency chain and exports are snapshots taken when
/// the module's deployment started.
#[derive(Clone)]
pub struct DeployContext {
    module: String,
    depends_on: Vec<ResourceHandle>,
    exports: Arc<BTreeMap<String, JsonValue>>,
    versions: Arc<VersionTable>,
    provisioner: Provisioner,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl DeployContext {
    pub fn new(module: impl Into<String>, provisioner: Provisioner) -> Self {
        Self {
            module: module.into(),
            depends_on: Vec::new(),
            exports: Arc::default(),
            versions: Arc::default(),
            provisioner,
            fetcher: None,
        }
    }

    pub fn with_depends_on(mut self, depends_on: Vec<ResourceHandle>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_exports(mut self, exports: Arc<BTreeMap<String, JsonValue>>) -> Self {
        self.exports = exports;
        self
    }

    pub fn with_versions(mut self, versions: Arc<VersionTable>) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Option<Arc<dyn Fetcher>>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Name of the module being deployed
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Handles of every module deployed before this one, in order
    pub fn depends_on(&self) -> &[ResourceHandle] {
        &self.depends_on
    }

    /// Value exported by an earlier module
    pub fn export(&self, module: &str) -> Option<&JsonValue> {
        self.exports.get(module)
    }

    /// The run's resolved version table
    pub fn versions(&self) -> &VersionTable {
        &self.versions
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    /// Apply a resource that depends on every prior module
    pub async fn apply(&self, resource: Resource) -> Result<ResourceHandle> {
        self.apply_after(resource, &[]).await
    }

    /// Apply a resource that depends on the prior modules plus `extra`
    pub async fn apply_after(
        &self,
        resource: Resource,
        extra: &[ResourceHandle],
    ) -> Result<ResourceHandle> {
        let options = ApplyOptions::depends_on(self.depends_on.iter().chain(extra).cloned());
        Ok(self.provisioner.apply(resource, options).await?)
    }

    /// Apply a resource with explicit options
    pub async fn apply_with(
        &self,
        resource: Resource,
        options: ApplyOptions,
    ) -> Result<ResourceHandle> {
        Ok(self.provisioner.apply(resource, options).await?)
    }

    /// Version from the config, else the latest stable chart in `index_url`
    pub async fn chart_version(
        &self,
        configured: Option<&str>,
        index_url: &str,
        chart: &str,
    ) -> Result<String> {
        if let Some(version) = configured.filter(|v| !v.is_empty() && *v != "latest") {
            return Ok(version.to_string());
        }

        let Some(fetcher) = &self.fetcher else {
            return Err(EngineError::VersionUnavailable {
                module: self.module.clone(),
                message: "no version configured and chart lookups are disabled".to_string(),
            });
        };

        match latest_stable_chart_version(fetcher.as_ref(), index_url, chart).await {
            ChartVersionLookup::Found(version) => Ok(version),
            other => Err(EngineError::VersionUnavailable {
                module: self.module.clone(),
                message: other.to_string(),
            }),
        }
    }

    /// Version from the config, failing when unset
    pub fn require_version(&self, configured: Option<&str>) -> Result<String> {
        configured
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| EngineError::VersionUnavailable {
                module: self.module.clone(),
                message: "set a version in the stack or the version table".to_string(),
            })
    }
}

impl fmt::Debug for DeployContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployContext")
            .field("module", &self.module)
            .field("depends_on", &self.depends_on)
            .field("exports", &self.exports.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// What a deploy entrypoint returns
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    /// Version actually deployed
    pub version: String,
    /// Handle later modules depend on
    pub handle: ResourceHandle,
    /// Value surfaced in the run's `exports`
    pub exported: Option<JsonValue>,
}

impl DeploymentResult {
    pub fn new(version: impl Into<String>, handle: ResourceHandle) -> Self {
        Self {
            version: version.into(),
            handle,
            exported: None,
        }
    }

    pub fn with_export(mut self, value: JsonValue) -> Self {
        self.exported = Some(value);
        self
    }
}
