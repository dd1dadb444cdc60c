//! Module registry
//!
//! Modules are registered explicitly at startup: a typed configuration schema
//! and a `deploy_<name>_module` entrypoint per module name. The registry
//! erases both behind JSON so the driver can handle every module uniformly.
//!
//! ```rust,ignore
//! let mut registry = ModuleRegistry::new();
//! registry.register::<CertManagerConfig, _, _>("cert_manager", true, deploy_cert_manager_module);
//! let descriptor = registry.descriptor("cert_manager")?;
//! ```

use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use konductor_core::{merge_config, schema_fields};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::{DeployContext, DeploymentResult};
use crate::error::{EngineError, Result};
use crate::modules;

type MergeFn = fn(&str, &JsonValue) -> JsonValue;
type DefaultsFn = fn() -> JsonValue;
type DeployFuture = BoxFuture<'static, Result<DeploymentResult>>;
type ErasedDeploy = dyn Fn(JsonValue, DeployContext) -> DeployFuture + Send + Sync;

/// Typed configuration of a module, erased to JSON
#[derive(Clone)]
pub struct ConfigSchema {
    type_name: &'static str,
    fields: Vec<String>,
    enabled_by_default: bool,
    merge: MergeFn,
    defaults: DefaultsFn,
}

impl ConfigSchema {
    fn of<C>(enabled_by_default: bool) -> Self
    where
        C: Serialize + DeserializeOwned + Default + 'static,
    {
        Self {
            type_name: type_name::<C>(),
            fields: schema_fields::<C>(),
            enabled_by_default,
            merge: merge_erased::<C>,
            defaults: defaults_erased::<C>,
        }
    }

    /// Rust type backing the schema
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Top-level configuration keys
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }

    /// Defaults overridden by the user map; never fails
    pub fn merge(&self, module: &str, user: &JsonValue) -> JsonValue {
        (self.merge)(module, user)
    }

    pub fn defaults(&self) -> JsonValue {
        (self.defaults)()
    }
}

impl fmt::Debug for ConfigSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSchema")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("enabled_by_default", &self.enabled_by_default)
            .finish()
    }
}

fn merge_erased<C>(module: &str, user: &JsonValue) -> JsonValue
where
    C: Serialize + DeserializeOwned + Default,
{
    let config: C = merge_config(module, user);
    serde_json::to_value(config).unwrap_or(JsonValue::Null)
}

fn defaults_erased<C>() -> JsonValue
where
    C: Serialize + Default,
{
    serde_json::to_value(C::default()).unwrap_or(JsonValue::Null)
}

/// A module's deploy function
#[derive(Clone)]
pub struct DeployEntrypoint {
    name: String,
    call: Arc<ErasedDeploy>,
}

impl DeployEntrypoint {
    /// Conventional entrypoint name, `deploy_<module>_module`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the entrypoint with a merged configuration
    pub fn invoke(&self, config: JsonValue, ctx: DeployContext) -> DeployFuture {
        (self.call)(config, ctx)
    }
}

impl fmt::Debug for DeployEntrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployEntrypoint")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Fully resolved module
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub name: String,
    pub config_schema: ConfigSchema,
    pub deploy_entrypoint: DeployEntrypoint,
}

impl ModuleDescriptor {
    pub fn enabled_by_default(&self) -> bool {
        self.config_schema.enabled_by_default()
    }
}

/// Registry of deployable modules
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    schemas: IndexMap<String, ConfigSchema>,
    entrypoints: IndexMap<String, DeployEntrypoint>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in module, in default deployment order
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        modules::register_builtin(&mut registry);
        registry
    }

    /// Record a module's configuration type
    pub fn register_schema<C>(
        &mut self,
        name: impl Into<String>,
        enabled_by_default: bool,
    ) -> &mut Self
    where
        C: Serialize + DeserializeOwned + Default + 'static,
    {
        self.schemas
            .insert(name.into(), ConfigSchema::of::<C>(enabled_by_default));
        self
    }

    /// Record a module's deploy function
    pub fn register_entrypoint<C, F, Fut>(
        &mut self,
        name: impl Into<String>,
        deploy: F,
    ) -> &mut Self
    where
        C: DeserializeOwned + Send + 'static,
        F: Fn(C, DeployContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DeploymentResult>> + Send + 'static,
    {
        let name = name.into();
        let module = name.clone();
        let call = move |raw: JsonValue, ctx: DeployContext| -> DeployFuture {
            match serde_json::from_value::<C>(raw) {
                Ok(config) => deploy(config, ctx).boxed(),
                Err(e) => {
                    let err = EngineError::InvalidModuleConfig {
                        module: module.clone(),
                        message: e.to_string(),
                    };
                    futures::future::ready(Err(err)).boxed()
                }
            }
        };

        self.entrypoints.insert(
            name.clone(),
            DeployEntrypoint {
                name: format!("deploy_{}_module", name),
                call: Arc::new(call),
            },
        );
        self
    }

    /// Record both the schema and the entrypoint
    pub fn register<C, F, Fut>(
        &mut self,
        name: &str,
        enabled_by_default: bool,
        deploy: F,
    ) -> &mut Self
    where
        C: Serialize + DeserializeOwned + Default + Send + 'static,
        F: Fn(C, DeployContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DeploymentResult>> + Send + 'static,
    {
        self.register_schema::<C>(name, enabled_by_default)
            .register_entrypoint(name, deploy)
    }

    pub fn find_config_schema(&self, name: &str) -> Result<&ConfigSchema> {
        self.schemas
            .get(name)
            .ok_or_else(|| EngineError::ModuleNotFound {
                module: name.to_string(),
            })
    }

    pub fn find_deploy_entrypoint(&self, name: &str) -> Result<&DeployEntrypoint> {
        self.entrypoints
            .get(name)
            .ok_or_else(|| EngineError::EntrypointNotFound {
                module: name.to_string(),
            })
    }

    /// Resolve schema and entrypoint together
    pub fn descriptor(&self, name: &str) -> Result<ModuleDescriptor> {
        let config_schema = self.find_config_schema(name)?.clone();
        let deploy_entrypoint = self.find_deploy_entrypoint(name)?.clone();
        Ok(ModuleDescriptor {
            name: name.to_string(),
            config_schema,
            deploy_entrypoint,
        })
    }

    /// Module names in registration order
    pub fn names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use konductor_kube::{Provisioner, RecordingEngine, Resource};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct DemoConfig {
        version: Option<String>,
        namespace: String,
    }

    async fn deploy_demo_module(
        config: DemoConfig,
        ctx: DeployContext,
    ) -> Result<DeploymentResult> {
        let handle = ctx.apply(Resource::namespace(config.namespace)).await?;
        Ok(DeploymentResult::new(
            config.version.unwrap_or_default(),
            handle,
        ))
    }

    fn context() -> DeployContext {
        DeployContext::new("demo", Provisioner::new(Arc::new(RecordingEngine::new())))
    }

    #[test]
    fn test_lookup_errors() {
        let mut registry = ModuleRegistry::new();
        registry.register_schema::<DemoConfig>("schema_only", false);

        assert!(matches!(
            registry.find_config_schema("missing"),
            Err(EngineError::ModuleNotFound { .. })
        ));
        assert!(matches!(
            registry.descriptor("schema_only"),
            Err(EngineError::EntrypointNotFound { .. })
        ));
    }

    #[test]
    fn test_schema_fields_and_merge() {
        let mut registry = ModuleRegistry::new();
        registry.register("demo", true, deploy_demo_module);

        let descriptor = registry.descriptor("demo").unwrap();
        assert!(descriptor.enabled_by_default());
        assert!(descriptor.config_schema.has_field("version"));
        assert_eq!(descriptor.deploy_entrypoint.name(), "deploy_demo_module");

        let merged = descriptor
            .config_schema
            .merge("demo", &json!({"namespace": "demo-ns", "bogus": 1}));
        assert_eq!(merged, json!({"version": null, "namespace": "demo-ns"}));
    }

    #[tokio::test]
    async fn test_invoke_entrypoint() {
        let mut registry = ModuleRegistry::new();
        registry.register("demo", false, deploy_demo_module);

        let entrypoint = registry.find_deploy_entrypoint("demo").unwrap();
        let result = entrypoint
            .invoke(json!({"version": "1.0.0", "namespace": "demo"}), context())
            .await
            .unwrap();
        assert_eq!(result.version, "1.0.0");
        assert_eq!(result.handle.id().name, "demo");
    }

    #[tokio::test]
    async fn test_invoke_rejects_mismatched_config() {
        let mut registry = ModuleRegistry::new();
        registry.register_entrypoint("demo", deploy_demo_module);

        let err = registry
            .find_deploy_entrypoint("demo")
            .unwrap()
            .invoke(json!({"namespace": ["not", "a", "string"]}), context())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidModuleConfig { .. }));
    }

    #[test]
    fn test_builtin_order() {
        let registry = ModuleRegistry::builtin();
        let names = registry.names();
        assert_eq!(names.first().map(String::as_str), Some("cert_manager"));
        for name in &names {
            assert!(registry.descriptor(name).is_ok(), "{} incomplete", name);
        }
        assert!(registry.find_config_schema("cert_manager").unwrap().enabled_by_default());
        assert!(!registry.find_config_schema("kubevirt").unwrap().enabled_by_default());
    }
}
