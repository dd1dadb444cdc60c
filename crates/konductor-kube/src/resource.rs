//! Declarative resource descriptions

use konductor_core::ResourceMetadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::handle::ResourceId;

/// A resource to provision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub name: String,
    pub namespace: Option<String>,
    pub metadata: ResourceMetadata,
    pub body: ResourceBody,
}

/// What kind of resource is provisioned
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResourceBody {
    /// A namespace
    Namespace,

    /// Any Kubernetes object; `fields` holds everything besides
    /// apiVersion/kind/metadata (e.g. `spec`, `data`)
    Custom {
        api_version: String,
        kind: String,
        fields: Map<String, JsonValue>,
    },

    /// A Helm chart rendered and applied as one unit
    HelmRelease(HelmRelease),

    /// A remote multi-document YAML manifest
    Manifest { url: String },
}

/// Helm release settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelmRelease {
    /// Chart name, or an `oci://` reference
    pub chart: String,
    /// Chart repository URL
    pub repository: Option<String>,
    /// Chart version; latest when unset
    pub version: Option<String>,
    /// Values passed to the chart
    pub values: JsonValue,
    /// Leave chart CRDs out of the rendered output
    pub skip_crds: bool,
}

/// Per-resource operation timeouts, e.g. `"10m"`
///
/// Passed through to the engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTimeouts {
    pub create: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
}

impl CustomTimeouts {
    pub fn create(timeout: impl Into<String>) -> Self {
        Self {
            create: Some(timeout.into()),
            ..Default::default()
        }
    }
}

impl Resource {
    /// A namespace
    pub fn namespace(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            metadata: ResourceMetadata::default(),
            body: ResourceBody::Namespace,
        }
    }

    /// An arbitrary object
    ///
    /// Labels and annotations under a `metadata` key in `fields` become the
    /// resource's own metadata; the rest of that key is dropped, the name and
    /// namespace always come from the arguments.
    pub fn custom(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: Option<String>,
        fields: JsonValue,
    ) -> Self {
        let mut fields = match fields {
            JsonValue::Object(map) => map,
            JsonValue::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("spec".to_string(), other);
                map
            }
        };
        let metadata = fields
            .remove("metadata")
            .map(|value| ResourceMetadata {
                labels: string_map(&value["labels"]),
                annotations: string_map(&value["annotations"]),
            })
            .unwrap_or_default();
        Self {
            name: name.into(),
            namespace,
            metadata,
            body: ResourceBody::Custom {
                api_version: api_version.into(),
                kind: kind.into(),
                fields,
            },
        }
    }

    /// A Helm release
    pub fn helm_release(
        name: impl Into<String>,
        namespace: impl Into<String>,
        release: HelmRelease,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            metadata: ResourceMetadata::default(),
            body: ResourceBody::HelmRelease(release),
        }
    }

    /// A remote manifest; `namespace` is the default for namespaced objects
    pub fn manifest(
        name: impl Into<String>,
        url: impl Into<String>,
        namespace: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace,
            metadata: ResourceMetadata::default(),
            body: ResourceBody::Manifest { url: url.into() },
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.annotations.insert(key.into(), value.into());
        self
    }

    /// Kind name used in identities and logs
    pub fn kind(&self) -> &str {
        match &self.body {
            ResourceBody::Namespace => "Namespace",
            ResourceBody::Custom { kind, .. } => kind,
            ResourceBody::HelmRelease(_) => "HelmRelease",
            ResourceBody::Manifest { .. } => "Manifest",
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.namespace.clone(), self.name.clone())
    }

    /// Kubernetes object form, for the kinds that map to a single object
    pub fn to_object(&self) -> Option<JsonValue> {
        let (api_version, kind, fields) = match &self.body {
            ResourceBody::Namespace => ("v1", "Namespace", None),
            ResourceBody::Custom {
                api_version,
                kind,
                fields,
            } => (api_version.as_str(), kind.as_str(), Some(fields)),
            ResourceBody::HelmRelease(_) | ResourceBody::Manifest { .. } => return None,
        };

        let mut metadata = json!({ "name": self.name });
        if let Some(ns) = &self.namespace {
            metadata["namespace"] = json!(ns);
        }
        if !self.metadata.labels.is_empty() {
            metadata["labels"] = json!(self.metadata.labels);
        }
        if !self.metadata.annotations.is_empty() {
            metadata["annotations"] = json!(self.metadata.annotations);
        }

        let mut object = json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": metadata,
        });
        if let (Some(fields), JsonValue::Object(map)) = (fields, &mut object) {
            for (key, value) in fields {
                if key != "metadata" {
                    map.insert(key.clone(), value.clone());
                }
            }
        }
        Some(object)
    }
}

/// String entries of a JSON object; anything else is skipped
fn string_map(value: &JsonValue) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a timeout string (e.g., "5m", "300s", "1h")
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (num_str, unit) = if let Some(stripped) = value.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = value.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped, "h")
    } else {
        // Assume seconds if no unit
        (value, "s")
    };

    let num: u64 = num_str.parse().ok()?;

    Some(match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        "h" => Duration::from_secs(num * 3600),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_object() {
        let ns = Resource::namespace("kubevirt").with_label("app", "kubevirt");
        let object = ns.to_object().unwrap();
        assert_eq!(object["apiVersion"], "v1");
        assert_eq!(object["kind"], "Namespace");
        assert_eq!(object["metadata"]["name"], "kubevirt");
        assert_eq!(object["metadata"]["labels"]["app"], "kubevirt");
        assert!(object["metadata"].get("namespace").is_none());
        assert_eq!(ns.id().to_string(), "Namespace/kubevirt");
    }

    #[test]
    fn test_custom_object_fields() {
        let issuer = Resource::custom(
            "cert-manager.io/v1",
            "ClusterIssuer",
            "selfsigned",
            None,
            json!({"spec": {"selfSigned": {}}}),
        );
        let object = issuer.to_object().unwrap();
        assert_eq!(object["kind"], "ClusterIssuer");
        assert!(object["spec"]["selfSigned"].is_object());
        assert!(object["metadata"].get("labels").is_none());
        assert_eq!(issuer.kind(), "ClusterIssuer");
    }

    #[test]
    fn test_custom_metadata_field_is_lifted() {
        let cr = Resource::custom(
            "kubevirt.io/v1",
            "KubeVirt",
            "kubevirt",
            Some("kubevirt".into()),
            json!({
                "metadata": {
                    "name": "ignored",
                    "labels": {"tier": "virt", "replicas": 3},
                    "annotations": {"note": "x"},
                },
                "spec": {},
            }),
        );
        assert_eq!(cr.metadata.labels["tier"], "virt");
        assert!(!cr.metadata.labels.contains_key("replicas"));

        let provisioned = cr.with_label("app.kubernetes.io/managed-by", "konductor");
        let object = provisioned.to_object().unwrap();
        assert_eq!(object["metadata"]["name"], "kubevirt");
        assert_eq!(object["metadata"]["namespace"], "kubevirt");
        assert_eq!(object["metadata"]["labels"]["tier"], "virt");
        assert_eq!(
            object["metadata"]["labels"]["app.kubernetes.io/managed-by"],
            "konductor"
        );
        assert_eq!(object["metadata"]["annotations"]["note"], "x");
    }

    #[test]
    fn test_metadata_field_never_replaces_metadata() {
        let mut fields = Map::new();
        fields.insert("metadata".to_string(), json!({"name": "other"}));
        let resource = Resource {
            name: "thing".to_string(),
            namespace: None,
            metadata: ResourceMetadata::default(),
            body: ResourceBody::Custom {
                api_version: "x.io/v1".to_string(),
                kind: "Thing".to_string(),
                fields,
            },
        }
        .with_label("app", "thing");

        let object = resource.to_object().unwrap();
        assert_eq!(object["metadata"]["name"], "thing");
        assert_eq!(object["metadata"]["labels"]["app"], "thing");
    }

    #[test]
    fn test_custom_bare_spec() {
        let cr = Resource::custom("x.io/v1", "Thing", "t", Some("ns".into()), json!([1, 2]));
        let object = cr.to_object().unwrap();
        assert_eq!(object["spec"], json!([1, 2]));
        assert_eq!(object["metadata"]["namespace"], "ns");
    }

    #[test]
    fn test_helm_release_has_no_single_object() {
        let release = Resource::helm_release("cilium", "kube-system", HelmRelease::default());
        assert!(release.to_object().is_none());
        assert_eq!(release.id().to_string(), "HelmRelease/kube-system/cilium");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
    }
}
