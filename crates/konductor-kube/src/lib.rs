//! Konductor Kube - provisioning engine plumbing
//!
//! This crate provides:
//! - **Resource model**: Namespaces, custom resources, Helm releases and remote manifests
//! - **Handles**: Dependency tokens whose computed outputs resolve asynchronously
//! - **Provisioner**: The middleware stage every resource passes through, running
//!   the registered metadata transforms before submission
//! - **Engines**: `KubeEngine` (server-side apply against a cluster) and
//!   `RecordingEngine` (in-memory, for previews and tests)

pub mod client;
pub mod engine;
pub mod error;
pub mod handle;
pub mod manifest;
pub mod recording;
pub mod resource;

pub use client::{KubeEngine, KubeEngineOptions};
pub use engine::{
    ApplyOptions, InheritMetadata, MetadataTransform, ProvisioningEngine, Provisioner,
    ResourceTransform, TransformChain,
};
pub use error::{KubeError, Result};
pub use handle::{OutputResolver, ResourceHandle, ResourceId};
pub use recording::{AppliedResource, OperationCounts, RecordingEngine};
pub use resource::{CustomTimeouts, HelmRelease, Resource, ResourceBody, parse_duration};
