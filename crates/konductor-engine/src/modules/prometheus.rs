//! kube-prometheus-stack monitoring

use konductor_kube::{HelmRelease, Resource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use super::{install_options, overlay_values};
use crate::context::{DeployContext, DeploymentResult};
use crate::error::Result;

const CHART_REPOSITORY: &str = "https://prometheus-community.github.io/helm-charts";
const CHART_INDEX: &str = "https://prometheus-community.github.io/helm-charts/index.yaml";
const CHART_NAME: &str = "kube-prometheus-stack";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub version: Option<String>,
    pub namespace: String,
    pub grafana_enabled: bool,
    pub retention: String,
    pub helm_values: Map<String, JsonValue>,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            version: None,
            namespace: "monitoring".to_string(),
            grafana_enabled: true,
            retention: "10d".to_string(),
            helm_values: Map::new(),
        }
    }
}

pub async fn deploy_prometheus_module(
    config: PrometheusConfig,
    ctx: DeployContext,
) -> Result<DeploymentResult> {
    let version = ctx
        .chart_version(config.version.as_deref(), CHART_INDEX, CHART_NAME)
        .await?;
    let ns = config.namespace.as_str();

    let namespace = ctx.apply(Resource::namespace(ns)).await?;

    let values = overlay_values(
        json!({
            "grafana": { "enabled": config.grafana_enabled },
            "prometheus": {
                "prometheusSpec": {
                    "retention": config.retention,
                    "serviceMonitorSelectorNilUsesHelmValues": false,
                    "podMonitorSelectorNilUsesHelmValues": false,
                }
            },
        }),
        &config.helm_values,
    );

    let release = ctx
        .apply_with(
            Resource::helm_release(
                CHART_NAME,
                ns,
                HelmRelease {
                    chart: CHART_NAME.to_string(),
                    repository: Some(CHART_REPOSITORY.to_string()),
                    version: Some(version.clone()),
                    values,
                    skip_crds: false,
                },
            ),
            install_options(ctx.depends_on(), &[namespace], "15m"),
        )
        .await?;

    Ok(DeploymentResult::new(version, release))
}

#[cfg(test)]
mod tests {
    use super::*;
    use konductor_kube::{Provisioner, RecordingEngine, ResourceBody};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_release_values() {
        let engine = Arc::new(RecordingEngine::new());
        let ctx = DeployContext::new("prometheus", Provisioner::new(engine.clone()));
        let config = PrometheusConfig {
            version: Some("61.3.2".to_string()),
            grafana_enabled: false,
            ..Default::default()
        };

        let result = deploy_prometheus_module(config, ctx).await.unwrap();
        assert_eq!(result.version, "61.3.2");

        let release = engine.find(CHART_NAME).unwrap();
        assert_eq!(release.timeouts.create.as_deref(), Some("15m"));
        let ResourceBody::HelmRelease(helm) = &release.resource.body else {
            panic!("expected a helm release");
        };
        assert_eq!(helm.values["grafana"]["enabled"], false);
        assert_eq!(helm.values["prometheus"]["prometheusSpec"]["retention"], "10d");
        assert_eq!(helm.version.as_deref(), Some("61.3.2"));
    }
}
