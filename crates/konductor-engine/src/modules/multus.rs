//! Multus CNI meta-plugin with a default bridge attachment

use konductor_kube::Resource;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::install_options;
use crate::context::{DeployContext, DeploymentResult};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultusConfig {
    pub version: Option<String>,
    pub namespace: String,
    /// Host bridge the default NetworkAttachmentDefinition plugs into
    pub bridge_name: String,
}

impl Default for MultusConfig {
    fn default() -> Self {
        Self {
            version: None,
            namespace: "multus".to_string(),
            bridge_name: "br0".to_string(),
        }
    }
}

pub fn daemonset_manifest_url(version: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/k8snetworkplumbingwg/multus-cni/{}/deployments/multus-daemonset-thick.yml",
        version
    )
}

pub async fn deploy_multus_module(
    config: MultusConfig,
    ctx: DeployContext,
) -> Result<DeploymentResult> {
    let version = ctx.require_version(config.version.as_deref())?;
    let ns = config.namespace.as_str();

    let namespace = ctx.apply(Resource::namespace(ns)).await?;
    let daemonset = ctx
        .apply_with(
            Resource::manifest("multus-daemonset", daemonset_manifest_url(&version), None),
            install_options(ctx.depends_on(), &[namespace], "5m"),
        )
        .await?;

    let cni_config = json!({
        "cniVersion": "0.3.1",
        "type": "bridge",
        "bridge": config.bridge_name,
        "ipam": {},
    });
    let attachment = ctx
        .apply_after(
            Resource::custom(
                "k8s.cni.cncf.io/v1",
                "NetworkAttachmentDefinition",
                &config.bridge_name,
                Some(ns.to_string()),
                json!({ "spec": { "config": cni_config.to_string() } }),
            ),
            &[daemonset],
        )
        .await?;

    Ok(DeploymentResult::new(version, attachment))
}
