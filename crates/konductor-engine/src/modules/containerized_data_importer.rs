//! Containerized Data Importer (CDI) operator and its `CDI` resource

use konductor_kube::Resource;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::install_options;
use crate::context::{DeployContext, DeploymentResult};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerizedDataImporterConfig {
    pub version: Option<String>,
    pub namespace: String,
    pub feature_gates: Vec<String>,
    /// Storage class for import and upload scratch space
    pub scratch_space_storage_class: Option<String>,
}

impl Default for ContainerizedDataImporterConfig {
    fn default() -> Self {
        Self {
            version: None,
            namespace: "cdi".to_string(),
            feature_gates: vec!["HonorWaitForFirstConsumer".to_string()],
            scratch_space_storage_class: None,
        }
    }
}

fn release_url(version: &str, file: &str) -> String {
    format!(
        "https://github.com/kubevirt/containerized-data-importer/releases/download/{}/{}",
        version, file
    )
}

pub async fn deploy_containerized_data_importer_module(
    config: ContainerizedDataImporterConfig,
    ctx: DeployContext,
) -> Result<DeploymentResult> {
    let version = ctx.require_version(config.version.as_deref())?;
    let ns = config.namespace.as_str();

    let namespace = ctx.apply(Resource::namespace(ns)).await?;
    let operator = ctx
        .apply_with(
            Resource::manifest(
                "cdi-operator",
                release_url(&version, "cdi-operator.yaml"),
                Some(ns.to_string()),
            ),
            install_options(ctx.depends_on(), &[namespace], "10m"),
        )
        .await?;

    let mut cdi_config = json!({ "featureGates": config.feature_gates });
    if let Some(class) = &config.scratch_space_storage_class {
        cdi_config["scratchSpaceStorageClass"] = json!(class);
    }

    let cdi = ctx
        .apply_after(
            Resource::custom(
                "cdi.kubevirt.io/v1beta1",
                "CDI",
                "cdi",
                None,
                json!({
                    "spec": {
                        "config": cdi_config,
                        "imagePullPolicy": "IfNotPresent",
                        "infra": {
                            "nodeSelector": { "kubernetes.io/os": "linux" },
                            "tolerations": [{ "key": "CriticalAddonsOnly", "operator": "Exists" }],
                        },
                        "workload": {
                            "nodeSelector": { "kubernetes.io/os": "linux" },
                        },
                    }
                }),
            ),
            &[operator],
        )
        .await?;

    Ok(DeploymentResult::new(version, cdi))
}
