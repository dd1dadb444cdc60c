//! Multi-document manifest handling
//!
//! Chart output and remote manifests are split into individual objects,
//! run through the transform chain and ordered so dependencies (CRDs,
//! namespaces, RBAC) are applied before the objects that need them.

use konductor_core::ResourceMetadata;
use kube::api::DynamicObject;
use kube::core::{GroupVersionKind, TypeMeta};

use crate::engine::TransformChain;
use crate::error::{KubeError, Result};

/// Resource category for ordering during apply
///
/// Lower values are applied first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceCategory {
    Crd = 0,
    Namespace = 1,
    NamespaceConfig = 2,
    ClusterRbac = 10,
    NamespacedRbac = 11,
    Config = 20,
    Storage = 21,
    Network = 30,
    Workload = 40,
    Batch = 50,
    /// Webhooks go after workloads so their backing services exist
    Admission = 60,
    CustomResource = 70,
    Other = 100,
}

impl ResourceCategory {
    pub fn from_resource(kind: &str, api_version: &str) -> Self {
        match kind {
            "CustomResourceDefinition" => Self::Crd,
            "Namespace" => Self::Namespace,
            "ResourceQuota" | "LimitRange" => Self::NamespaceConfig,
            "ClusterRole" | "ClusterRoleBinding" => Self::ClusterRbac,
            "Role" | "RoleBinding" | "ServiceAccount" => Self::NamespacedRbac,
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "NetworkPolicy" | "Service" | "Endpoints" | "Ingress" | "IngressClass" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Pod" => Self::Workload,
            "Job" | "CronJob" => Self::Batch,
            "MutatingWebhookConfiguration" | "ValidatingWebhookConfiguration" | "APIService" => {
                Self::Admission
            }
            _ if is_custom_api_version(api_version) => Self::CustomResource,
            _ => Self::Other,
        }
    }

    pub fn of(object: &DynamicObject) -> Self {
        match &object.types {
            Some(types) => Self::from_resource(&types.kind, &types.api_version),
            None => Self::Other,
        }
    }
}

/// Whether an apiVersion belongs to an API group outside the built-in set
pub fn is_custom_api_version(api_version: &str) -> bool {
    const CORE_GROUPS: &[&str] = &[
        "apps",
        "batch",
        "autoscaling",
        "policy",
        "networking.k8s.io",
        "rbac.authorization.k8s.io",
        "storage.k8s.io",
        "admissionregistration.k8s.io",
        "apiextensions.k8s.io",
        "apiregistration.k8s.io",
        "certificates.k8s.io",
        "coordination.k8s.io",
        "discovery.k8s.io",
        "events.k8s.io",
        "node.k8s.io",
        "scheduling.k8s.io",
    ];

    match api_version.rsplit_once('/') {
        Some((group, _)) => !CORE_GROUPS.contains(&group),
        None => false,
    }
}

/// Split a multi-document YAML stream into objects
///
/// Empty and comment-only documents are skipped. `default_namespace` is not
/// applied here; scope is only known after discovery.
pub fn parse_documents(manifest: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    for (index, doc) in split_documents(manifest).into_iter().enumerate() {
        let value: serde_yaml::Value = serde_yaml::from_str(doc).map_err(|e| {
            KubeError::InvalidManifest(format!("document {}: {}", index, e))
        })?;
        if value.is_null() {
            continue;
        }

        // `kind: List` wrappers show up in some published manifests
        if value.get("kind").and_then(|k| k.as_str()) == Some("List") {
            if let Some(items) = value.get("items").and_then(|i| i.as_sequence()) {
                for item in items {
                    objects.push(to_dynamic(item.clone(), index)?);
                }
            }
            continue;
        }

        objects.push(to_dynamic(value, index)?);
    }

    Ok(objects)
}

fn split_documents(manifest: &str) -> Vec<&str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in manifest.split_inclusive('\n') {
        if line.trim_end() == "---" || line.starts_with("--- ") {
            docs.push(&manifest[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    docs.push(&manifest[start..]);

    docs.into_iter()
        .filter(|doc| {
            doc.lines()
                .any(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        })
        .collect()
}

fn to_dynamic(value: serde_yaml::Value, index: usize) -> Result<DynamicObject> {
    let object: DynamicObject = serde_yaml::from_value(value)
        .map_err(|e| KubeError::InvalidManifest(format!("document {}: {}", index, e)))?;

    if object.types.is_none() {
        return Err(KubeError::InvalidManifest(format!(
            "document {}: missing apiVersion or kind",
            index
        )));
    }
    if object.metadata.name.is_none() {
        return Err(KubeError::InvalidManifest(format!(
            "document {}: missing metadata.name",
            index
        )));
    }
    Ok(object)
}

/// Order objects for creation, keeping the original order within a category
pub fn sort_for_apply(objects: &mut [DynamicObject]) {
    objects.sort_by_key(ResourceCategory::of);
}

/// Run the transform chain over an object's labels and annotations
pub fn transform_object(object: &mut DynamicObject, transforms: &TransformChain) {
    if transforms.is_empty() {
        return;
    }

    let mut metadata = ResourceMetadata {
        labels: object.metadata.labels.take().unwrap_or_default(),
        annotations: object.metadata.annotations.take().unwrap_or_default(),
    };
    transforms.apply(&mut metadata);

    object.metadata.labels = (!metadata.labels.is_empty()).then_some(metadata.labels);
    object.metadata.annotations =
        (!metadata.annotations.is_empty()).then_some(metadata.annotations);
}

/// Display name for logging: `Kind/namespace/name`
pub fn display_name(object: &DynamicObject) -> String {
    let kind = object.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("Unknown");
    let name = object.metadata.name.as_deref().unwrap_or("unnamed");
    match &object.metadata.namespace {
        Some(ns) => format!("{}/{}/{}", kind, ns, name),
        None => format!("{}/{}", kind, name),
    }
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1"
pub fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}
