//! Error types for konductor-kube

use thiserror::Error;

/// Result type for konductor-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while provisioning resources
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Failed to apply a resource
    #[error("failed to apply {resource}: {message}")]
    ApplyFailed { resource: String, message: String },

    /// Apply exceeded its create timeout
    #[error("applying {resource} timed out after {timeout}")]
    Timeout { resource: String, timeout: String },

    /// A dependency never produced outputs
    #[error("outputs of {resource} are unavailable: the resource was dropped before resolving")]
    OutputsUnavailable { resource: String },

    /// Helm rendering failed
    #[error("helm template failed for release '{release}': {message}")]
    Helm { release: String, message: String },

    /// Manifest download failed
    #[error("failed to download manifest {url}: {message}")]
    ManifestDownload { url: String, message: String },

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Unknown resource type (not served by the cluster)
    #[error("unknown resource type: {api_version}/{kind}")]
    UnknownResourceType { api_version: String, kind: String },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}
