//! Resource handles
//!
//! A handle is returned as soon as a resource is submitted and can be used
//! right away as a dependency. Its computed outputs (release status, generated
//! names, ...) may only become available later.

use serde_json::Value as JsonValue;
use std::fmt;
use tokio::sync::watch;

use crate::error::{KubeError, Result};

/// Identity of a provisioned resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceId {
    pub fn new(
        kind: impl Into<String>,
        namespace: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Opaque handle to a submitted resource
#[derive(Clone)]
pub struct ResourceHandle {
    id: ResourceId,
    outputs: watch::Receiver<Option<JsonValue>>,
}

/// Write side of a pending handle
#[derive(Debug)]
pub struct OutputResolver {
    sender: watch::Sender<Option<JsonValue>>,
}

impl OutputResolver {
    /// Publish the computed outputs, waking every waiter
    pub fn resolve(self, outputs: JsonValue) {
        // Receivers may all be gone already; nothing to notify then
        let _ = self.sender.send(Some(outputs));
    }
}

impl ResourceHandle {
    /// A handle whose outputs are supplied later through the resolver
    pub fn pending(id: ResourceId) -> (Self, OutputResolver) {
        let (sender, outputs) = watch::channel(None);
        (Self { id, outputs }, OutputResolver { sender })
    }

    /// A handle with outputs known up front
    pub fn resolved(id: ResourceId, outputs: JsonValue) -> Self {
        let (handle, resolver) = Self::pending(id);
        resolver.resolve(outputs);
        handle
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Outputs if already resolved, without waiting
    pub fn try_outputs(&self) -> Option<JsonValue> {
        self.outputs.borrow().clone()
    }

    /// Wait for the outputs to resolve
    pub async fn outputs(&self) -> Result<JsonValue> {
        let mut receiver = self.outputs.clone();
        let value = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| KubeError::OutputsUnavailable {
                resource: self.id.to_string(),
            })?;
        Ok(value.clone().unwrap_or(JsonValue::Null))
    }

    /// Look up a single output field, waiting for resolution
    pub async fn output(&self, field: &str) -> Result<Option<JsonValue>> {
        Ok(self.outputs().await?.get(field).cloned())
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("resolved", &self.outputs.borrow().is_some())
            .finish()
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
