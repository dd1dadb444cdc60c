//! In-memory provisioning engine
//!
//! Records every resource it is handed instead of talking to a cluster.
//! Used by `konductor preview` and by tests that assert on what a module
//! would provision.

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::engine::{ApplyOptions, ProvisioningEngine, TransformChain};
use crate::error::{KubeError, Result};
use crate::handle::{ResourceHandle, ResourceId};
use crate::resource::{CustomTimeouts, Resource, ResourceBody};

/// A resource as it reached the engine
#[derive(Debug, Clone)]
pub struct AppliedResource {
    /// The resource after every transform ran
    pub resource: Resource,
    pub depends_on: Vec<ResourceId>,
    pub timeouts: CustomTimeouts,
}

/// Counts of applies by resource kind, for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub namespaces: usize,
    pub custom: usize,
    pub helm_releases: usize,
    pub manifests: usize,
}

impl OperationCounts {
    pub fn total(&self) -> usize {
        self.namespaces + self.custom + self.helm_releases + self.manifests
    }
}

/// Recording engine
#[derive(Clone, Default)]
pub struct RecordingEngine {
    applied: Arc<RwLock<Vec<AppliedResource>>>,
    operations: Arc<RwLock<OperationCounts>>,
    /// Resource names whose apply fails
    failures: Arc<RwLock<HashSet<String>>>,
    /// Resolve outputs on a background task after dependencies resolve
    deferred: bool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve outputs asynchronously, the way a real engine does
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    /// Make applies of the named resource fail
    pub fn fail_on(self, name: impl Into<String>) -> Self {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into());
        self
    }

    /// Everything applied so far, in submission order
    pub fn applied(&self) -> Vec<AppliedResource> {
        self.applied
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applied resources of one kind
    pub fn applied_of_kind(&self, kind: &str) -> Vec<AppliedResource> {
        self.applied()
            .into_iter()
            .filter(|a| a.resource.kind() == kind)
            .collect()
    }

    /// Look up an applied resource by name
    pub fn find(&self, name: &str) -> Option<AppliedResource> {
        self.applied().into_iter().find(|a| a.resource.name == name)
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset(&self) {
        self.applied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self
            .operations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = OperationCounts::default();
    }

    fn record(&self, resource: &Resource, options: &ApplyOptions) {
        {
            let mut ops = self
                .operations
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match resource.body {
                ResourceBody::Namespace => ops.namespaces += 1,
                ResourceBody::Custom { .. } => ops.custom += 1,
                ResourceBody::HelmRelease(_) => ops.helm_releases += 1,
                ResourceBody::Manifest { .. } => ops.manifests += 1,
            }
        }

        self.applied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(AppliedResource {
                resource: resource.clone(),
                depends_on: options.depends_on.iter().map(|h| h.id().clone()).collect(),
                timeouts: options.timeouts.clone(),
            });
    }
}

/// Outputs a successful apply would report
fn outputs_for(resource: &Resource) -> JsonValue {
    match &resource.body {
        ResourceBody::HelmRelease(release) => json!({
            "name": resource.name,
            "namespace": resource.namespace,
            "chart": release.chart,
            "version": release.version,
            "status": "deployed",
        }),
        ResourceBody::Manifest { url } => json!({ "name": resource.name, "url": url }),
        ResourceBody::Namespace | ResourceBody::Custom { .. } => resource
            .to_object()
            .unwrap_or_else(|| json!({ "name": resource.name })),
    }
}

#[async_trait]
impl ProvisioningEngine for RecordingEngine {
    async fn apply(
        &self,
        resource: Resource,
        options: &ApplyOptions,
        _transforms: &TransformChain,
    ) -> Result<ResourceHandle> {
        let failing = self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&resource.name);
        if failing {
            return Err(KubeError::ApplyFailed {
                resource: resource.id().to_string(),
                message: "injected failure".to_string(),
            });
        }

        self.record(&resource, options);
        let outputs = outputs_for(&resource);

        if !self.deferred {
            return Ok(ResourceHandle::resolved(resource.id(), outputs));
        }

        let (handle, resolver) = ResourceHandle::pending(resource.id());
        let dependencies = options.depends_on.clone();
        tokio::spawn(async move {
            for dependency in &dependencies {
                if dependency.outputs().await.is_err() {
                    // Resolver dropped: dependents observe OutputsUnavailable
                    return;
                }
            }
            resolver.resolve(outputs);
        });
        Ok(handle)
    }
}
