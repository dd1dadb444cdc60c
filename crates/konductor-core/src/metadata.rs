//! Global resource metadata
//!
//! Labels and annotations derived once per run from the compliance block and
//! the source-control provenance, then merged into every resource the
//! platform creates.
//!
//! Merge policy is uniform: a global entry only fills a gap. When a resource
//! already carries a key, its own value is kept.

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compliance::ComplianceConfig;
use crate::provenance::{Provenance, UNKNOWN};

/// Maximum length of a Kubernetes label value
pub const MAX_LABEL_VALUE_LEN: usize = 63;

/// Label set on every resource
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "konductor";

static INVALID_LABEL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_.-]").expect("valid regex"));

/// Labels and annotations of a single resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ResourceMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Run-wide labels and annotations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalMetadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl GlobalMetadata {
    /// Derive the global set from compliance settings and provenance
    pub fn derive(compliance: &ComplianceConfig, provenance: &Provenance) -> Self {
        let mut labels = BTreeMap::new();
        let mut annotations = BTreeMap::new();

        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

        for regime in compliance.enabled_regimes() {
            labels.insert(format!("compliance.{}.enabled", regime), "true".to_string());
        }

        let free_text = [
            ("compliance.fisma.level", compliance.fisma.level.as_deref()),
            (
                "compliance.scip.environment",
                compliance.scip.environment.as_deref(),
            ),
            (
                "compliance.scip.provider.name",
                compliance
                    .scip
                    .provider
                    .as_ref()
                    .and_then(|p| p.name.as_deref()),
            ),
        ];
        for (key, value) in free_text {
            if let Some(value) = value.map(sanitize_label_value).filter(|v| !v.is_empty()) {
                labels.insert(key.to_string(), value);
            }
        }

        let structured = [
            ("compliance.fisma.ato", compliance.fisma.ato.clone()),
            ("compliance.nist.controls", list(&compliance.nist.controls)),
            ("compliance.nist.auxiliary", list(&compliance.nist.auxiliary)),
            ("compliance.nist.exceptions", list(&compliance.nist.exceptions)),
            ("compliance.scip.ownership", compliance.scip.ownership.clone()),
            (
                "compliance.scip.provider.regions",
                compliance
                    .scip
                    .provider
                    .as_ref()
                    .and_then(|p| list(&p.regions)),
            ),
        ];
        for (key, value) in structured {
            if let Some(value) = value {
                annotations.insert(key.to_string(), value.to_string());
            }
        }

        if provenance.commit != UNKNOWN {
            let commit = sanitize_label_value(&provenance.commit);
            if !commit.is_empty() {
                labels.insert("git.commit".to_string(), commit);
            }
        }
        annotations.insert("git.remote".to_string(), provenance.remote.clone());
        annotations.insert("git.branch".to_string(), provenance.branch.clone());

        Self {
            labels,
            annotations,
        }
    }

    /// Merge the global entries into a resource's own metadata
    pub fn apply(&self, mut resource: ResourceMetadata) -> ResourceMetadata {
        self.apply_in_place(&mut resource);
        resource
    }

    /// In-place form of [`GlobalMetadata::apply`]
    pub fn apply_in_place(&self, resource: &mut ResourceMetadata) {
        fill_gaps(&mut resource.labels, &self.labels);
        fill_gaps(&mut resource.annotations, &self.annotations);
    }
}

fn fill_gaps(target: &mut BTreeMap<String, String>, global: &BTreeMap<String, String>) {
    for (key, value) in global {
        target.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn list(items: &[String]) -> Option<serde_json::Value> {
    (!items.is_empty()).then(|| serde_json::json!(items))
}

/// Compute-once holder for the run's [`GlobalMetadata`]
///
/// Created at orchestration start and shared by handle with every resource
/// construction site. The first `initialize` wins; later calls return the
/// value computed by the first one, even when they race.
#[derive(Debug, Default)]
pub struct GlobalMetadataStore {
    cell: OnceCell<Arc<GlobalMetadata>>,
}

impl GlobalMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the metadata on first call, return the cached value afterwards
    pub fn initialize(
        &self,
        compliance: &ComplianceConfig,
        provenance: &Provenance,
    ) -> Arc<GlobalMetadata> {
        self.cell
            .get_or_init(|| Arc::new(GlobalMetadata::derive(compliance, provenance)))
            .clone()
    }

    /// Apply the global metadata to a resource; a no-op before initialization
    pub fn apply_in_place(&self, resource: &mut ResourceMetadata) {
        if let Some(global) = self.cell.get() {
            global.apply_in_place(resource);
        }
    }
}

/// Sanitize free text for use as a label value
///
/// Lowercases, replaces characters outside `[a-z0-9_.-]` with `-`, strips
/// leading/trailing non-alphanumerics and truncates to 63 characters.
pub fn sanitize_label_value(value: &str) -> String {
    let lowered = value.to_lowercase();
    let replaced = INVALID_LABEL_CHARS.replace_all(&lowered, "-");
    let trimmed = trim_non_alphanumeric(&replaced);
    let truncated: String = trimmed.chars().take(MAX_LABEL_VALUE_LEN).collect();
    trim_non_alphanumeric(&truncated).to_string()
}

fn trim_non_alphanumeric(value: &str) -> &str {
    value.trim_matches(|c: char| !c.is_ascii_alphanumeric())
}
