//! Orchestration driver
//!
//! Deploys modules strictly one after another. Each enabled module receives
//! the handles of every module deployed before it; a failure anywhere aborts
//! the run without touching what was already applied.

use konductor_core::{ComplianceConfig, GlobalMetadataStore, Provenance, StackConfig};
use konductor_kube::{Provisioner, ResourceHandle};
use konductor_repo::{Fetcher, VersionTable};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::context::{DeployContext, DeploymentResult};
use crate::error::{EngineError, Result};
use crate::registry::{ModuleDescriptor, ModuleRegistry};

/// Key of the provenance entry in `configurations`
pub const SOURCE_REPOSITORY_KEY: &str = "source_repository";

/// Lifecycle of a module within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    NotConsidered,
    Disabled,
    Configuring,
    Deploying,
    Deployed,
    Failed,
}

impl ModuleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleState::Deployed | ModuleState::Failed)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::NotConsidered => "not-considered",
            ModuleState::Disabled => "disabled",
            ModuleState::Configuring => "configuring",
            ModuleState::Deploying => "deploying",
            ModuleState::Deployed => "deployed",
            ModuleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a successful run publishes
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutputs {
    /// Module name -> deployed version
    pub versions: BTreeMap<String, String>,
    /// Module name -> `{enabled: true}`, plus the provenance entry
    pub configurations: Map<String, JsonValue>,
    /// Module name -> exported value
    pub exports: BTreeMap<String, JsonValue>,
    /// Final state of every considered module, in run order
    pub states: Vec<(String, ModuleState)>,
}

impl RunOutputs {
    pub fn state(&self, module: &str) -> Option<ModuleState> {
        self.states
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, state)| *state)
    }

    pub fn deployed(&self) -> impl Iterator<Item = &str> {
        self.states
            .iter()
            .filter(|(_, state)| *state == ModuleState::Deployed)
            .map(|(name, _)| name.as_str())
    }
}

/// Sequential module deployment
pub struct Driver {
    registry: Arc<ModuleRegistry>,
    provisioner: Provisioner,
    provenance: Provenance,
    metadata: Option<Arc<GlobalMetadataStore>>,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl Driver {
    pub fn new(registry: Arc<ModuleRegistry>, provisioner: Provisioner) -> Self {
        Self {
            registry,
            provisioner,
            provenance: Provenance::default(),
            metadata: None,
            fetcher: None,
        }
    }

    /// Provenance published as `configurations.source_repository`
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Store initialized from the stack's `compliance` block when a run starts
    ///
    /// Pass the same store to the provisioner with
    /// [`Provisioner::with_metadata_store`] so every resource is labelled.
    pub fn with_metadata_store(mut self, store: Arc<GlobalMetadataStore>) -> Self {
        self.metadata = Some(store);
        self
    }

    /// Fetcher modules use for chart version lookups
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Modules that would deploy for this stack, in order
    pub fn enabled_modules(&self, modules: &[String], stack: &StackConfig) -> Vec<String> {
        modules
            .iter()
            .filter(|name| {
                let default = self
                    .registry
                    .find_config_schema(name)
                    .map(|s| s.enabled_by_default())
                    .unwrap_or(false);
                stack.module_enabled(name, default)
            })
            .cloned()
            .collect()
    }

    /// Deploy `modules` in order
    pub async fn run(
        &self,
        modules: &[String],
        stack: &StackConfig,
        versions: &VersionTable,
    ) -> Result<RunOutputs> {
        let mut outputs = RunOutputs::default();
        self.run_into(modules, stack, versions, &mut outputs).await?;
        Ok(outputs)
    }

    /// Deploy `modules` in order, recording into `outputs` as modules complete
    ///
    /// On failure `outputs` keeps everything recorded before the failing
    /// module; nothing is recorded for the failing module itself.
    pub async fn run_into(
        &self,
        modules: &[String],
        stack: &StackConfig,
        versions: &VersionTable,
        outputs: &mut RunOutputs,
    ) -> Result<()> {
        let enabled = self.enabled_modules(modules, stack);

        // Unresolvable descriptors abort before anything is deployed
        let descriptors = enabled
            .iter()
            .map(|name| self.registry.descriptor(name))
            .collect::<Result<Vec<_>>>()?;
        let mut descriptors = descriptors.into_iter();

        if let Some(store) = &self.metadata {
            let compliance: ComplianceConfig = stack.get_typed("compliance")?;
            let global = store.initialize(&compliance, &self.provenance);
            debug!(
                labels = global.labels.len(),
                annotations = global.annotations.len(),
                "global metadata ready"
            );
        }

        let versions_snapshot = Arc::new(versions.clone());
        let mut depends_on: Vec<ResourceHandle> = Vec::new();

        for name in modules {
            if !enabled.contains(name) {
                debug!(module = %name, "module disabled, skipping");
                outputs.states.push((name.clone(), ModuleState::Disabled));
                continue;
            }
            let Some(descriptor) = descriptors.next() else {
                break;
            };

            outputs.states.push((name.clone(), ModuleState::Configuring));
            let config = self.module_config(&descriptor, stack, versions);

            set_state(outputs, ModuleState::Deploying);
            info!(module = %name, "deploying module");

            let ctx = DeployContext::new(name.clone(), self.provisioner.clone())
                .with_depends_on(depends_on.clone())
                .with_exports(Arc::new(outputs.exports.clone()))
                .with_versions(versions_snapshot.clone())
                .with_fetcher(self.fetcher.clone());

            let result = match descriptor.deploy_entrypoint.invoke(config, ctx).await {
                Ok(result) => result,
                Err(e) => {
                    error!(module = %name, error = %e, "module deployment failed");
                    set_state(outputs, ModuleState::Failed);
                    log_states(outputs);
                    return Err(EngineError::ModuleFailed {
                        module: name.clone(),
                        source: Box::new(e),
                    });
                }
            };

            if let Err(e) = validate_result(name, &result) {
                error!(module = %name, error = %e, "module returned an unusable result");
                set_state(outputs, ModuleState::Failed);
                log_states(outputs);
                return Err(e);
            }

            info!(module = %name, version = %result.version, "module deployed");
            outputs.versions.insert(name.clone(), result.version);
            outputs
                .configurations
                .insert(name.clone(), json!({ "enabled": true }));
            if let Some(exported) = result.exported {
                outputs.exports.insert(name.clone(), exported);
            }
            depends_on.push(result.handle);
            set_state(outputs, ModuleState::Deployed);
        }

        outputs
            .configurations
            .insert(SOURCE_REPOSITORY_KEY.to_string(), self.provenance.to_json());
        log_states(outputs);
        Ok(())
    }

    /// Merged configuration, with the resolved version as the `version` default
    fn module_config(
        &self,
        descriptor: &ModuleDescriptor,
        stack: &StackConfig,
        versions: &VersionTable,
    ) -> JsonValue {
        let mut user = match stack.module_block(&descriptor.name) {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        // Enablement is the driver's concern, not the module's
        user.remove("enabled");

        let schema = &descriptor.config_schema;
        let user_version_set = user.get("version").is_some_and(|v| !v.is_null());
        if schema.has_field("version") && !user_version_set {
            if let Some(version) = versions.get(&descriptor.name) {
                user.insert("version".to_string(), JsonValue::String(version.clone()));
            }
        }

        schema.merge(&descriptor.name, &JsonValue::Object(user))
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("modules", &self.registry.names())
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

fn validate_result(module: &str, result: &DeploymentResult) -> Result<()> {
    if result.version.trim().is_empty() {
        return Err(EngineError::UnexpectedReturnShape {
            module: module.to_string(),
            message: "deployment result has an empty version".to_string(),
        });
    }
    Ok(())
}

fn set_state(outputs: &mut RunOutputs, state: ModuleState) {
    if let Some((_, current)) = outputs.states.last_mut() {
        *current = state;
    }
}

fn log_states(outputs: &RunOutputs) {
    for (module, state) in &outputs.states {
        debug!(module = %module, state = %state, "module state");
    }
}
