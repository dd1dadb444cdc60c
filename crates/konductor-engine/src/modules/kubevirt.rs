//! KubeVirt operator and its `KubeVirt` custom resource

use konductor_kube::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use super::install_options;
use crate::context::{DeployContext, DeploymentResult};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubevirtConfig {
    pub version: Option<String>,
    pub namespace: String,
    /// Software emulation for clusters without nested virtualization
    pub use_emulation: bool,
    pub feature_gates: Vec<String>,
    /// Extra `spec.configuration` entries
    pub configuration: JsonValue,
}

impl Default for KubevirtConfig {
    fn default() -> Self {
        Self {
            version: None,
            namespace: "kubevirt".to_string(),
            use_emulation: false,
            feature_gates: vec![
                "HostDevices".to_string(),
                "ExpandDisks".to_string(),
                "AutoResourceLimitsGate".to_string(),
            ],
            configuration: JsonValue::Null,
        }
    }
}

pub fn operator_manifest_url(version: &str) -> String {
    format!(
        "https://github.com/kubevirt/kubevirt/releases/download/{}/kubevirt-operator.yaml",
        version
    )
}

pub async fn deploy_kubevirt_module(
    config: KubevirtConfig,
    ctx: DeployContext,
) -> Result<DeploymentResult> {
    let version = ctx.require_version(config.version.as_deref())?;
    let ns = config.namespace.as_str();

    let namespace = ctx.apply(Resource::namespace(ns)).await?;
    let operator = ctx
        .apply_with(
            Resource::manifest(
                "kubevirt-operator",
                operator_manifest_url(&version),
                Some(ns.to_string()),
            ),
            install_options(ctx.depends_on(), &[namespace], "10m"),
        )
        .await?;

    let mut configuration = json!({
        "developerConfiguration": {
            "useEmulation": config.use_emulation,
            "featureGates": config.feature_gates,
        }
    });
    if let (JsonValue::Object(base), JsonValue::Object(extra)) =
        (&mut configuration, &config.configuration)
    {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }

    let kubevirt = ctx
        .apply_after(
            Resource::custom(
                "kubevirt.io/v1",
                "KubeVirt",
                "kubevirt",
                Some(ns.to_string()),
                json!({
                    "spec": {
                        "configuration": configuration,
                        "customizeComponents": {},
                        "workloadUpdateStrategy": {},
                    }
                }),
            ),
            &[operator],
        )
        .await?;

    Ok(DeploymentResult::new(version, kubevirt))
}
