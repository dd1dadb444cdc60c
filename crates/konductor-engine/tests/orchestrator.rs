//! End-to-end orchestration tests against the recording engine

use konductor_core::{ComplianceConfig, GlobalMetadataStore, Provenance, StackConfig};
use konductor_engine::{
    DeployContext, DeploymentResult, Driver, EngineError, ModuleRegistry, ModuleState, Result,
    RunOutputs, SOURCE_REPOSITORY_KEY,
};
use konductor_kube::{Provisioner, RecordingEngine, Resource, ResourceHandle, ResourceId};
use konductor_repo::VersionTable;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StepConfig {
    version: Option<String>,
    namespace: Option<String>,
}

/// Applies one namespace and exports the dependency chain it was given
async fn deploy_step_module(config: StepConfig, ctx: DeployContext) -> Result<DeploymentResult> {
    let name = config.namespace.unwrap_or_else(|| ctx.module().replace('_', "-"));
    let handle = ctx.apply(Resource::namespace(name)).await?;
    let seen: Vec<String> = ctx
        .depends_on()
        .iter()
        .map(|h| h.id().name.clone())
        .collect();
    Ok(DeploymentResult::new(config.version.unwrap_or_else(|| "0.0.0".to_string()), handle)
        .with_export(json!({ "seen": seen })))
}

async fn deploy_broken_module(_config: StepConfig, ctx: DeployContext) -> Result<DeploymentResult> {
    ctx.apply(Resource::namespace("broken")).await?;
    Err(EngineError::VersionUnavailable {
        module: ctx.module().to_string(),
        message: "upstream unreachable".to_string(),
    })
}

async fn deploy_shapeless_module(
    _config: StepConfig,
    ctx: DeployContext,
) -> Result<DeploymentResult> {
    let handle = ctx.apply(Resource::namespace("shapeless")).await?;
    Ok(DeploymentResult::new("", handle))
}

/// Returns a handle whose outputs never resolve
async fn deploy_lagging_module(
    _config: StepConfig,
    _ctx: DeployContext,
) -> Result<DeploymentResult> {
    let (handle, resolver) = ResourceHandle::pending(ResourceId::new("Namespace", None, "lagging"));
    // The write side stays alive, so waiting on the outputs would block forever
    std::mem::forget(resolver);
    Ok(DeploymentResult::new("1.0.0", handle))
}

fn registry() -> Arc<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    registry
        .register("alpha", true, deploy_step_module)
        .register("beta", false, deploy_step_module)
        .register("gamma", false, deploy_step_module)
        .register("broken", false, deploy_broken_module)
        .register("shapeless", false, deploy_shapeless_module)
        .register("lagging", false, deploy_lagging_module);
    Arc::new(registry)
}

fn driver(engine: &Arc<RecordingEngine>) -> Driver {
    Driver::new(registry(), Provisioner::new(engine.clone()))
        .with_provenance(Provenance::new("https://git.example/platform", "main", "abc123"))
}

fn modules(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn stack(yaml: &str) -> StackConfig {
    StackConfig::from_yaml(yaml).unwrap()
}

#[tokio::test]
async fn test_disabled_modules_are_not_recorded() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("stack: dev\ngamma:\n  enabled: true\n");

    let outputs = driver(&engine)
        .run(&modules(&["alpha", "beta", "gamma"]), &stack, &VersionTable::new())
        .await
        .unwrap();

    assert_eq!(outputs.versions.keys().collect::<Vec<_>>(), vec!["alpha", "gamma"]);
    assert!(!outputs.configurations.contains_key("beta"));
    assert_eq!(outputs.configurations["alpha"], json!({"enabled": true}));
    assert_eq!(outputs.state("beta"), Some(ModuleState::Disabled));
    assert_eq!(outputs.state("gamma"), Some(ModuleState::Deployed));
    assert_eq!(engine.operation_counts().namespaces, 2);
}

#[tokio::test]
async fn test_default_enabled_module_can_be_disabled() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("alpha:\n  enabled: false\n");

    let outputs = driver(&engine)
        .run(&modules(&["alpha"]), &stack, &VersionTable::new())
        .await
        .unwrap();

    assert!(outputs.versions.is_empty());
    assert!(engine.applied().is_empty());
}

#[tokio::test]
async fn test_dependency_chain_accumulates_in_order() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("beta:\n  enabled: true\ngamma:\n  enabled: true\n");

    let outputs = driver(&engine)
        .run(&modules(&["alpha", "beta", "gamma"]), &stack, &VersionTable::new())
        .await
        .unwrap();

    assert_eq!(outputs.exports["alpha"]["seen"], json!([]));
    assert_eq!(outputs.exports["beta"]["seen"], json!(["alpha"]));
    assert_eq!(outputs.exports["gamma"]["seen"], json!(["alpha", "beta"]));

    let gamma = engine.find("gamma").unwrap();
    let names: Vec<_> = gamma.depends_on.iter().map(|id| id.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_disabled_module_does_not_join_chain() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("gamma:\n  enabled: true\n");

    let outputs = driver(&engine)
        .run(&modules(&["alpha", "beta", "gamma"]), &stack, &VersionTable::new())
        .await
        .unwrap();

    assert_eq!(outputs.exports["gamma"]["seen"], json!(["alpha"]));
}

#[tokio::test]
async fn test_resolved_version_is_injected() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("beta:\n  enabled: true\n  version: 2.0.0\n");
    let versions = VersionTable::from([
        ("alpha".to_string(), "1.4.2".to_string()),
        ("beta".to_string(), "1.0.0".to_string()),
    ]);

    let outputs = driver(&engine)
        .run(&modules(&["alpha", "beta"]), &stack, &versions)
        .await
        .unwrap();

    assert_eq!(outputs.versions["alpha"], "1.4.2");
    // A version set in the stack beats the resolved table
    assert_eq!(outputs.versions["beta"], "2.0.0");
}

#[tokio::test]
async fn test_unknown_keys_do_not_fail() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("alpha:\n  namespace: custom\n  future_option: [1, 2]\n");

    let outputs = driver(&engine)
        .run(&modules(&["alpha"]), &stack, &VersionTable::new())
        .await
        .unwrap();

    assert_eq!(outputs.state("alpha"), Some(ModuleState::Deployed));
    assert!(engine.find("custom").is_some());
}

#[tokio::test]
async fn test_entrypoint_failure_aborts_run() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("broken:\n  enabled: true\ngamma:\n  enabled: true\n");

    let err = driver(&engine)
        .run(&modules(&["alpha", "broken", "gamma"]), &stack, &VersionTable::new())
        .await
        .unwrap_err();

    match err {
        EngineError::ModuleFailed { module, source } => {
            assert_eq!(module, "broken");
            assert!(matches!(*source, EngineError::VersionUnavailable { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Nothing after the failing module is attempted
    assert!(engine.find("gamma").is_none());
    assert!(engine.find("alpha").is_some());
}

#[tokio::test]
async fn test_apply_failure_aborts_run() {
    let engine = Arc::new(RecordingEngine::new().fail_on("beta"));
    let stack = stack("beta:\n  enabled: true\ngamma:\n  enabled: true\n");

    let err = driver(&engine)
        .run(&modules(&["alpha", "beta", "gamma"]), &stack, &VersionTable::new())
        .await
        .unwrap_err();

    assert_eq!(err.module(), Some("beta"));
    assert!(engine.find("gamma").is_none());
}

#[tokio::test]
async fn test_empty_version_is_a_shape_error() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("shapeless:\n  enabled: true\ngamma:\n  enabled: true\n");

    let err = driver(&engine)
        .run(&modules(&["shapeless", "gamma"]), &stack, &VersionTable::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::UnexpectedReturnShape { ref module, .. } if module == "shapeless"
    ));
    assert!(engine.find("gamma").is_none());
}

#[tokio::test]
async fn test_unknown_module_aborts_before_deploying() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("mystery:\n  enabled: true\n");

    let err = driver(&engine)
        .run(&modules(&["alpha", "mystery"]), &stack, &VersionTable::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::ModuleNotFound { ref module } if module == "mystery"));
    assert!(err.is_configuration_error());
    // alpha precedes the unknown module but must not be deployed
    assert!(engine.applied().is_empty());
}

#[tokio::test]
async fn test_missing_entrypoint_aborts_before_deploying() {
    let engine = Arc::new(RecordingEngine::new());
    let mut registry = ModuleRegistry::new();
    registry
        .register("alpha", true, deploy_step_module)
        .register_schema::<StepConfig>("half", true);
    let driver = Driver::new(Arc::new(registry), Provisioner::new(engine.clone()));

    let err = driver
        .run(&modules(&["alpha", "half"]), &StackConfig::new("dev"), &VersionTable::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::EntrypointNotFound { .. }));
    assert!(engine.applied().is_empty());
}

#[tokio::test]
async fn test_source_repository_entry() {
    let engine = Arc::new(RecordingEngine::new());

    let outputs = driver(&engine)
        .run(&modules(&["alpha"]), &StackConfig::new("dev"), &VersionTable::new())
        .await
        .unwrap();

    assert_eq!(
        outputs.configurations[SOURCE_REPOSITORY_KEY],
        json!({
            "remote": "https://git.example/platform",
            "branch": "main",
            "commit": "abc123",
        })
    );
}

#[tokio::test]
async fn test_global_metadata_reaches_every_resource() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack(
        r#"
compliance:
  fisma:
    enabled: true
    level: "  Moderate/High "
  nist:
    enabled: true
    controls: ["AC-2", "AU-6"]
kubevirt:
  enabled: true
"#,
    );
    let compliance: ComplianceConfig = stack.get_typed("compliance").unwrap();
    let store = Arc::new(GlobalMetadataStore::new());
    store.initialize(&compliance, &Provenance::new("r", "main", "abc123"));
    let provisioner = Provisioner::new(engine.clone()).with_metadata_store(store);
    let driver = Driver::new(ModuleRegistry::builtin().into(), provisioner);

    let versions = VersionTable::from([
        ("cert_manager".to_string(), "v1.15.3".to_string()),
        ("kubevirt".to_string(), "v1.3.0".to_string()),
    ]);
    driver
        .run(
            &modules(&["cert_manager", "kubevirt"]),
            &stack,
            &versions,
        )
        .await
        .unwrap();

    let applied = engine.applied();
    assert!(applied.len() >= 7);
    for resource in applied {
        let labels = &resource.resource.metadata.labels;
        assert_eq!(labels["app.kubernetes.io/managed-by"], "konductor");
        assert_eq!(labels["compliance.fisma.enabled"], "true");
        assert_eq!(labels["compliance.fisma.level"], "moderate-high");
        assert_eq!(
            resource.resource.metadata.annotations["compliance.nist.controls"],
            r#"["AC-2","AU-6"]"#
        );
    }
}

#[tokio::test]
async fn test_run_initializes_shared_metadata_store() {
    let engine = Arc::new(RecordingEngine::new());
    let store = Arc::new(GlobalMetadataStore::new());
    let provisioner = Provisioner::new(engine.clone()).with_metadata_store(store.clone());
    let driver = Driver::new(registry(), provisioner)
        .with_provenance(Provenance::new("r", "main", "abc123"))
        .with_metadata_store(store);

    let audited = stack("compliance:\n  fisma:\n    enabled: true\nbeta:\n  enabled: true\n");
    driver
        .run(&modules(&["alpha", "beta"]), &audited, &VersionTable::new())
        .await
        .unwrap();

    // The store is computed once per driver; a later stack does not change it
    let plain = stack("stack: plain\n");
    driver
        .run(&modules(&["alpha"]), &plain, &VersionTable::new())
        .await
        .unwrap();

    let applied = engine.applied();
    assert_eq!(applied.len(), 3);
    for resource in applied {
        let labels = &resource.resource.metadata.labels;
        assert_eq!(labels["compliance.fisma.enabled"], "true");
        assert_eq!(labels["git.commit"], "abc123");
    }
}

#[tokio::test]
async fn test_invalid_compliance_aborts_before_deploying() {
    let engine = Arc::new(RecordingEngine::new());
    let store = Arc::new(GlobalMetadataStore::new());
    let provisioner = Provisioner::new(engine.clone()).with_metadata_store(store.clone());
    let driver = Driver::new(registry(), provisioner).with_metadata_store(store);

    let stack = stack("compliance:\n  nist:\n    controls: AC-2\n");
    let err = driver
        .run(&modules(&["alpha"]), &stack, &VersionTable::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(_)));
    assert!(engine.applied().is_empty());
}

#[tokio::test]
async fn test_builtin_modules_share_exports() {
    let engine = Arc::new(RecordingEngine::new());
    let driver = Driver::new(
        Arc::new(ModuleRegistry::builtin()),
        Provisioner::new(engine.clone()),
    );
    let stack = stack("hostpath_provisioner:\n  enabled: true\n");
    let versions = VersionTable::from([
        ("cert_manager".to_string(), "v1.15.3".to_string()),
        ("hostpath_provisioner".to_string(), "v0.20.0".to_string()),
    ]);

    let order = driver.registry().names();
    let outputs = driver.run(&order, &stack, &versions).await.unwrap();

    assert_eq!(
        outputs.deployed().collect::<Vec<_>>(),
        vec!["cert_manager", "hostpath_provisioner"]
    );
    assert_eq!(
        outputs.exports["hostpath_provisioner"]["storage_class"],
        "hostpath-storage-class"
    );
}

#[tokio::test]
async fn test_failed_run_keeps_earlier_records() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("broken:\n  enabled: true\ngamma:\n  enabled: true\n");
    let mut outputs = RunOutputs::default();

    let err = driver(&engine)
        .run_into(
            &modules(&["alpha", "broken", "gamma"]),
            &stack,
            &VersionTable::new(),
            &mut outputs,
        )
        .await
        .unwrap_err();

    assert_eq!(err.module(), Some("broken"));
    assert_eq!(outputs.versions.keys().collect::<Vec<_>>(), vec!["alpha"]);
    assert_eq!(outputs.configurations["alpha"], json!({"enabled": true}));
    assert!(!outputs.configurations.contains_key("broken"));
    assert!(!outputs.configurations.contains_key(SOURCE_REPOSITORY_KEY));
    assert_eq!(outputs.state("alpha"), Some(ModuleState::Deployed));
    assert_eq!(outputs.state("broken"), Some(ModuleState::Failed));
    assert_eq!(outputs.state("gamma"), None);
}

#[tokio::test]
async fn test_shape_error_keeps_earlier_records() {
    let engine = Arc::new(RecordingEngine::new());
    let stack = stack("shapeless:\n  enabled: true\n");
    let mut outputs = RunOutputs::default();

    let err = driver(&engine)
        .run_into(
            &modules(&["alpha", "shapeless"]),
            &stack,
            &VersionTable::from([("alpha".to_string(), "1.2.0".to_string())]),
            &mut outputs,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UnexpectedReturnShape { .. }));
    assert_eq!(outputs.versions.get("alpha").map(String::as_str), Some("1.2.0"));
    assert!(!outputs.versions.contains_key("shapeless"));
    assert!(!outputs.configurations.contains_key("shapeless"));
}

#[tokio::test]
async fn test_unresolved_outputs_do_not_block_the_run() {
    let engine = Arc::new(RecordingEngine::deferred());
    let stack = stack("lagging:\n  enabled: true\nbeta:\n  enabled: true\n");

    let drv = driver(&engine);
    let mods = modules(&["lagging", "beta"]);
    let versions = VersionTable::new();
    let run = drv.run(&mods, &stack, &versions);
    let outputs = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("run must not wait on resource outputs")
        .unwrap();

    assert_eq!(outputs.state("beta"), Some(ModuleState::Deployed));
    assert_eq!(outputs.exports["beta"]["seen"], json!(["lagging"]));

    let beta = engine.find("beta").unwrap();
    let names: Vec<_> = beta.depends_on.iter().map(|id| id.name.as_str()).collect();
    assert_eq!(names, vec!["lagging"]);
}
