//! Cluster-backed provisioning engine
//!
//! Everything is applied with Server-Side Apply through dynamic objects, so
//! no resource type has to be known at compile time:
//! - namespaces and custom resources are applied as a single object
//! - Helm releases are rendered with `helm template` and applied document by document
//! - remote manifests are downloaded and applied document by document

use async_trait::async_trait;
use kube::{
    Client,
    api::{Api, DynamicObject, Patch, PatchParams},
    config::{KubeConfigOptions, Kubeconfig},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use serde_json::{Value as JsonValue, json};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::engine::{ApplyOptions, ProvisioningEngine, TransformChain};
use crate::error::{KubeError, Result};
use crate::handle::ResourceHandle;
use crate::manifest::{
    display_name, gvk_from_type_meta, parse_documents, sort_for_apply, transform_object,
};
use crate::resource::{HelmRelease, Resource, ResourceBody, parse_duration};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "konductor";

/// Discovery refresh attempts for a kind the cluster does not serve yet
const DISCOVERY_ATTEMPTS: u32 = 5;
const DISCOVERY_BACKOFF: Duration = Duration::from_secs(2);

/// Options for [`KubeEngine`]
#[derive(Debug, Clone)]
pub struct KubeEngineOptions {
    /// kubeconfig context; the current context when unset
    pub context: Option<String>,
    /// Server-Side Apply field manager
    pub field_manager: String,
    /// Helm binary used for rendering charts
    pub helm_binary: String,
    /// Validate against the API server without persisting
    pub dry_run: bool,
    /// Create timeout for resources that do not set one
    pub default_timeout: Option<Duration>,
}

impl Default for KubeEngineOptions {
    fn default() -> Self {
        Self {
            context: None,
            field_manager: FIELD_MANAGER.to_string(),
            helm_binary: "helm".to_string(),
            dry_run: false,
            default_timeout: None,
        }
    }
}

/// Provisioning engine backed by a Kubernetes cluster
#[derive(Clone)]
pub struct KubeEngine {
    client: Client,
    discovery: Arc<RwLock<Discovery>>,
    http: reqwest::Client,
    options: KubeEngineOptions,
}

impl KubeEngine {
    /// Connect using the kubeconfig (or in-cluster config)
    pub async fn connect(options: KubeEngineOptions) -> Result<Self> {
        let config = match &options.context {
            Some(context) => {
                let kubeconfig = Kubeconfig::read()
                    .map_err(|e| KubeError::InvalidConfig(format!("kubeconfig: {}", e)))?;
                let kube_options = KubeConfigOptions {
                    context: Some(context.clone()),
                    ..Default::default()
                };
                kube::Config::from_custom_kubeconfig(kubeconfig, &kube_options)
                    .await
                    .map_err(|e| KubeError::InvalidConfig(format!("context '{}': {}", context, e)))?
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| KubeError::InvalidConfig(format!("kubeconfig: {}", e)))?,
        };
        let client = Client::try_from(config)?;
        Self::with_client(client, options).await
    }

    /// Create from an existing client
    pub async fn with_client(client: Client, options: KubeEngineOptions) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery: Arc::new(RwLock::new(discovery)),
            http: reqwest::Client::new(),
            options,
        })
    }

    pub fn options(&self) -> &KubeEngineOptions {
        &self.options
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh_discovery(&self) -> Result<()> {
        let discovery = Discovery::new(self.client.clone()).run().await?;
        *self.discovery.write().await = discovery;
        Ok(())
    }

    async fn resolve_api(&self, object: &DynamicObject) -> Result<(ApiResource, ApiCapabilities)> {
        let types = object
            .types
            .as_ref()
            .ok_or_else(|| {
                KubeError::InvalidManifest(format!(
                    "{} has no apiVersion/kind",
                    display_name(object)
                ))
            })?;
        let gvk = gvk_from_type_meta(types);

        for attempt in 0..=DISCOVERY_ATTEMPTS {
            if let Some(resolved) = self.discovery.read().await.resolve_gvk(&gvk) {
                return Ok(resolved);
            }
            if attempt == DISCOVERY_ATTEMPTS {
                break;
            }
            // CRDs applied moments ago may not be served yet
            if attempt > 0 {
                tokio::time::sleep(DISCOVERY_BACKOFF).await;
            }
            debug!(api_version = %types.api_version, kind = %types.kind, "refreshing discovery");
            self.refresh_discovery().await?;
        }

        Err(KubeError::UnknownResourceType {
            api_version: types.api_version.clone(),
            kind: types.kind.clone(),
        })
    }

    /// Server-side apply a single object
    async fn apply_object(
        &self,
        mut object: DynamicObject,
        default_namespace: Option<&str>,
    ) -> Result<DynamicObject> {
        let (api_resource, capabilities) = self.resolve_api(&object).await?;

        if capabilities.scope == Scope::Namespaced {
            if object.metadata.namespace.is_none() {
                object.metadata.namespace =
                    Some(default_namespace.unwrap_or("default").to_string());
            }
        } else {
            object.metadata.namespace = None;
        }

        let label = display_name(&object);
        let name = object
            .metadata
            .name
            .clone()
            .ok_or_else(|| KubeError::InvalidManifest(format!("{} has no metadata.name", label)))?;

        let api: Api<DynamicObject> = match &object.metadata.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &api_resource),
            None => Api::all_with(self.client.clone(), &api_resource),
        };

        let mut params = PatchParams::apply(&self.options.field_manager).force();
        params.dry_run = self.options.dry_run;

        let applied = api
            .patch(&name, &params, &Patch::Apply(&object))
            .await
            .map_err(|e| KubeError::ApplyFailed {
                resource: label.clone(),
                message: e.to_string(),
            })?;
        debug!(resource = %label, "applied");
        Ok(applied)
    }

    /// Transform, order and apply a multi-document stream
    async fn apply_documents(
        &self,
        documents: &str,
        default_namespace: Option<&str>,
        transforms: &TransformChain,
    ) -> Result<usize> {
        let mut objects = parse_documents(documents)?;
        for object in &mut objects {
            transform_object(object, transforms);
        }
        sort_for_apply(&mut objects);

        let count = objects.len();
        for object in objects {
            self.apply_object(object, default_namespace).await?;
        }
        Ok(count)
    }

    async fn apply_helm_release(
        &self,
        resource: &Resource,
        release: &HelmRelease,
        transforms: &TransformChain,
    ) -> Result<JsonValue> {
        let namespace = resource.namespace.as_deref().unwrap_or("default");
        let rendered = self.helm_template(&resource.name, namespace, release).await?;
        let children = transforms.for_children(&resource.metadata);
        let count = self
            .apply_documents(&rendered, Some(namespace), &children)
            .await?;

        info!(
            release = %resource.name,
            chart = %release.chart,
            version = release.version.as_deref().unwrap_or("latest"),
            resources = count,
            "helm release applied"
        );
        Ok(json!({
            "name": resource.name,
            "namespace": namespace,
            "chart": release.chart,
            "version": release.version,
            "status": "deployed",
            "resources": count,
        }))
    }

    async fn helm_template(
        &self,
        name: &str,
        namespace: &str,
        release: &HelmRelease,
    ) -> Result<String> {
        let helm_error = |message: String| KubeError::Helm {
            release: name.to_string(),
            message,
        };

        let values = values_yaml(&release.values)?;
        let mut child = Command::new(&self.options.helm_binary)
            .args(helm_template_args(name, namespace, release))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| helm_error(format!("failed to run {}: {}", self.options.helm_binary, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(values.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(helm_error(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        String::from_utf8(output.stdout).map_err(|e| helm_error(e.to_string()))
    }

    async fn apply_manifest(
        &self,
        resource: &Resource,
        url: &str,
        transforms: &TransformChain,
    ) -> Result<JsonValue> {
        let download_error = |message: String| KubeError::ManifestDownload {
            url: url.to_string(),
            message,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_error(format!("HTTP {}", response.status())));
        }
        let body = response.text().await.map_err(|e| download_error(e.to_string()))?;

        let children = transforms.for_children(&resource.metadata);
        let count = self
            .apply_documents(&body, resource.namespace.as_deref(), &children)
            .await?;
        info!(manifest = %resource.name, url, resources = count, "manifest applied");
        Ok(json!({ "name": resource.name, "url": url, "resources": count }))
    }

    async fn apply_resource(
        &self,
        resource: &Resource,
        transforms: &TransformChain,
    ) -> Result<JsonValue> {
        match &resource.body {
            ResourceBody::HelmRelease(release) => {
                self.apply_helm_release(resource, release, transforms).await
            }
            ResourceBody::Manifest { url } => self.apply_manifest(resource, url, transforms).await,
            ResourceBody::Namespace | ResourceBody::Custom { .. } => {
                let object = resource.to_object().ok_or_else(|| {
                    KubeError::InvalidConfig(format!("{} has no object form", resource.id()))
                })?;
                let object: DynamicObject = serde_json::from_value(object)?;
                let applied = self
                    .apply_object(object, resource.namespace.as_deref())
                    .await?;
                Ok(serde_json::to_value(&applied)?)
            }
        }
    }
}

#[async_trait]
impl ProvisioningEngine for KubeEngine {
    async fn apply(
        &self,
        resource: Resource,
        options: &ApplyOptions,
        transforms: &TransformChain,
    ) -> Result<ResourceHandle> {
        let id = resource.id();

        for dependency in &options.depends_on {
            dependency.outputs().await?;
        }

        let timeout = match options.timeouts.create.as_deref() {
            Some(value) => match parse_duration(value) {
                Some(duration) => Some(duration),
                None => {
                    warn!(resource = %id, timeout = value, "unparseable create timeout ignored");
                    self.options.default_timeout
                }
            },
            None => self.options.default_timeout,
        };

        let outputs = match timeout {
            Some(duration) => {
                tokio::time::timeout(duration, self.apply_resource(&resource, transforms))
                    .await
                    .map_err(|_| KubeError::Timeout {
                        resource: id.to_string(),
                        timeout: humanize(duration),
                    })??
            }
            None => self.apply_resource(&resource, transforms).await?,
        };

        Ok(ResourceHandle::resolved(id, outputs))
    }
}

/// Arguments for `helm template`, values are read from stdin
fn helm_template_args(name: &str, namespace: &str, release: &HelmRelease) -> Vec<String> {
    let mut args = vec![
        "template".to_string(),
        name.to_string(),
        release.chart.clone(),
        "--namespace".to_string(),
        namespace.to_string(),
    ];
    if let Some(repository) = &release.repository {
        args.push("--repo".to_string());
        args.push(repository.clone());
    }
    if let Some(version) = &release.version {
        args.push("--version".to_string());
        args.push(version.clone());
    }
    if !release.skip_crds {
        args.push("--include-crds".to_string());
    }
    args.push("--values".to_string());
    args.push("-".to_string());
    args
}

fn values_yaml(values: &JsonValue) -> Result<String> {
    if values.is_null() {
        return Ok("{}\n".to_string());
    }
    Ok(serde_yaml::to_string(values)?)
}

fn humanize(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
