//! cert-manager with a self-signed root CA
//!
//! Installs the jetstack chart, then bootstraps a self-signed issuer, a CA
//! certificate and a cluster-wide CA issuer other modules can request
//! certificates from.

use konductor_kube::{HelmRelease, Resource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use super::{install_options, overlay_values};
use crate::context::{DeployContext, DeploymentResult};
use crate::error::Result;

const CHART_REPOSITORY: &str = "https://charts.jetstack.io";
const CHART_INDEX: &str = "https://charts.jetstack.io/index.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertManagerConfig {
    pub version: Option<String>,
    pub namespace: String,
    pub install_crds: bool,
    /// Name of the CA-backed ClusterIssuer
    pub cluster_issuer: String,
    pub helm_values: Map<String, JsonValue>,
}

impl Default for CertManagerConfig {
    fn default() -> Self {
        Self {
            version: None,
            namespace: "cert-manager".to_string(),
            install_crds: true,
            cluster_issuer: "cluster-selfsigned-issuer".to_string(),
            helm_values: Map::new(),
        }
    }
}

pub async fn deploy_cert_manager_module(
    config: CertManagerConfig,
    ctx: DeployContext,
) -> Result<DeploymentResult> {
    let version = ctx
        .chart_version(config.version.as_deref(), CHART_INDEX, "cert-manager")
        .await?;
    let ns = config.namespace.as_str();

    let namespace = ctx.apply(Resource::namespace(ns)).await?;

    let values = overlay_values(
        json!({
            "crds": { "enabled": config.install_crds },
            "replicaCount": 1,
            "startupapicheck": { "enabled": false },
        }),
        &config.helm_values,
    );
    let release = ctx
        .apply_with(
            Resource::helm_release(
                "cert-manager",
                ns,
                HelmRelease {
                    chart: "cert-manager".to_string(),
                    repository: Some(CHART_REPOSITORY.to_string()),
                    version: Some(version.clone()),
                    values,
                    skip_crds: false,
                },
            ),
            install_options(ctx.depends_on(), &[namespace], "10m"),
        )
        .await?;

    let root_issuer_name = format!("{}-root", config.cluster_issuer);
    let ca_secret_name = format!("{}-ca", config.cluster_issuer);

    let root_issuer = ctx
        .apply_after(
            Resource::custom(
                "cert-manager.io/v1",
                "ClusterIssuer",
                &root_issuer_name,
                None,
                json!({ "spec": { "selfSigned": {} } }),
            ),
            &[release.clone()],
        )
        .await?;

    let certificate = ctx
        .apply_after(
            Resource::custom(
                "cert-manager.io/v1",
                "Certificate",
                &ca_secret_name,
                Some(ns.to_string()),
                json!({
                    "spec": {
                        "isCA": true,
                        "commonName": ca_secret_name,
                        "secretName": ca_secret_name,
                        "privateKey": { "algorithm": "ECDSA", "size": 256 },
                        "issuerRef": {
                            "name": root_issuer_name,
                            "kind": "ClusterIssuer",
                            "group": "cert-manager.io",
                        },
                    }
                }),
            ),
            &[root_issuer],
        )
        .await?;

    let ca_issuer = ctx
        .apply_after(
            Resource::custom(
                "cert-manager.io/v1",
                "ClusterIssuer",
                &config.cluster_issuer,
                None,
                json!({ "spec": { "ca": { "secretName": ca_secret_name } } }),
            ),
            &[certificate],
        )
        .await?;

    Ok(DeploymentResult::new(version, ca_issuer).with_export(json!({
        "cluster_issuer": config.cluster_issuer,
        "ca_secret_name": ca_secret_name,
        "namespace": ns,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use konductor_kube::{Provisioner, RecordingEngine, ResourceBody};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deploys_chart_and_ca_chain() {
        let engine = Arc::new(RecordingEngine::new());
        let ctx = DeployContext::new("cert_manager", Provisioner::new(engine.clone()));
        let config = CertManagerConfig {
            version: Some("v1.15.3".to_string()),
            ..Default::default()
        };

        let result = deploy_cert_manager_module(config, ctx).await.unwrap();
        assert_eq!(result.version, "v1.15.3");
        assert_eq!(
            result.exported.as_ref().unwrap()["ca_secret_name"],
            "cluster-selfsigned-issuer-ca"
        );

        let counts = engine.operation_counts();
        assert_eq!(counts.namespaces, 1);
        assert_eq!(counts.helm_releases, 1);
        assert_eq!(counts.custom, 3);

        let release = engine.applied_of_kind("HelmRelease").remove(0);
        assert_eq!(release.timeouts.create.as_deref(), Some("10m"));
        let ResourceBody::HelmRelease(helm) = &release.resource.body else {
            panic!("expected a helm release");
        };
        assert_eq!(helm.values["crds"]["enabled"], true);
    }

    #[tokio::test]
    async fn test_helm_values_override() {
        let engine = Arc::new(RecordingEngine::new());
        let ctx = DeployContext::new("cert_manager", Provisioner::new(engine.clone()));
        let mut config = CertManagerConfig {
            version: Some("v1.15.3".to_string()),
            ..Default::default()
        };
        config.helm_values.insert("replicaCount".to_string(), json!(3));

        deploy_cert_manager_module(config, ctx).await.unwrap();
        let release = engine.applied_of_kind("HelmRelease").remove(0);
        let ResourceBody::HelmRelease(helm) = &release.resource.body else {
            panic!("expected a helm release");
        };
        assert_eq!(helm.values["replicaCount"], 3);
    }
}
