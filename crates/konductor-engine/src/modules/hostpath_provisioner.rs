//! Hostpath provisioner operator, its CR and a backing StorageClass
//!
//! The operator's webhook is served with a certificate from cert-manager, so
//! this module needs `cert_manager` deployed earlier in the same run.

use konductor_kube::Resource;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::install_options;
use crate::context::{DeployContext, DeploymentResult};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostpathProvisionerConfig {
    pub version: Option<String>,
    pub namespace: String,
    pub default_path: String,
    pub default_storage_class: bool,
    pub storage_class_name: String,
}

impl Default for HostpathProvisionerConfig {
    fn default() -> Self {
        Self {
            version: None,
            namespace: "hostpath-provisioner".to_string(),
            default_path: "/var/mnt/hostpath-provisioner".to_string(),
            default_storage_class: false,
            storage_class_name: "hostpath-storage-class".to_string(),
        }
    }
}

fn release_url(version: &str, file: &str) -> String {
    format!(
        "https://github.com/kubevirt/hostpath-provisioner-operator/releases/download/{}/{}",
        version, file
    )
}

pub async fn deploy_hostpath_provisioner_module(
    config: HostpathProvisionerConfig,
    ctx: DeployContext,
) -> Result<DeploymentResult> {
    if ctx.export("cert_manager").is_none() {
        return Err(EngineError::InvalidModuleConfig {
            module: ctx.module().to_string(),
            message: "requires the cert_manager module to be enabled and deployed first"
                .to_string(),
        });
    }

    let version = ctx.require_version(config.version.as_deref())?;
    let ns = config.namespace.as_str();

    let namespace = ctx.apply(Resource::namespace(ns)).await?;
    let webhook = ctx
        .apply_with(
            Resource::manifest(
                "hostpath-provisioner-webhook",
                release_url(&version, "webhook.yaml"),
                Some(ns.to_string()),
            ),
            install_options(ctx.depends_on(), &[namespace.clone()], "5m"),
        )
        .await?;
    let operator = ctx
        .apply_with(
            Resource::manifest(
                "hostpath-provisioner-operator",
                release_url(&version, "operator.yaml"),
                Some(ns.to_string()),
            ),
            install_options(ctx.depends_on(), &[namespace, webhook], "10m"),
        )
        .await?;

    let provisioner = ctx
        .apply_after(
            Resource::custom(
                "hostpathprovisioner.kubevirt.io/v1beta1",
                "HostPathProvisioner",
                "hostpath-provisioner",
                None,
                json!({
                    "spec": {
                        "imagePullPolicy": "IfNotPresent",
                        "storagePools": [{ "name": "ssd", "path": config.default_path }],
                        "workload": { "nodeSelector": { "kubernetes.io/os": "linux" } },
                    }
                }),
            ),
            &[operator],
        )
        .await?;

    let default_class = if config.default_storage_class { "true" } else { "false" };
    let storage_class = ctx
        .apply_after(
            Resource::custom(
                "storage.k8s.io/v1",
                "StorageClass",
                &config.storage_class_name,
                None,
                json!({
                    "provisioner": "kubevirt.io.hostpath-provisioner",
                    "reclaimPolicy": "Delete",
                    "volumeBindingMode": "WaitForFirstConsumer",
                    "parameters": { "storagePool": "ssd" },
                }),
            )
            .with_annotation("storageclass.kubernetes.io/is-default-class", default_class),
            &[provisioner],
        )
        .await?;

    Ok(DeploymentResult::new(version, storage_class)
        .with_export(json!({ "storage_class": config.storage_class_name })))
}
