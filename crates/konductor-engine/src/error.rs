//! Error types for konductor-engine

use thiserror::Error;

/// Result type for konductor-engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while orchestrating module deployments
#[derive(Debug, Error)]
pub enum EngineError {
    /// No configuration schema registered under this name
    #[error("module '{module}' not found: no configuration schema is registered")]
    ModuleNotFound { module: String },

    /// A schema exists but no deploy entrypoint does
    #[error("module '{module}' has no deploy entrypoint (expected deploy_{module}_module)")]
    EntrypointNotFound { module: String },

    /// The entrypoint returned a result the driver cannot record
    #[error("module '{module}' returned an unexpected result: {message}")]
    UnexpectedReturnShape { module: String, message: String },

    /// The merged configuration does not fit the entrypoint's config type
    #[error("invalid configuration for module '{module}': {message}")]
    InvalidModuleConfig { module: String, message: String },

    /// No version could be determined for a module
    #[error("no version available for module '{module}': {message}")]
    VersionUnavailable { module: String, message: String },

    /// A module's deploy entrypoint failed; the run is aborted
    #[error("module '{module}' failed to deploy: {source}")]
    ModuleFailed {
        module: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error(transparent)]
    Core(#[from] konductor_core::CoreError),

    #[error(transparent)]
    Repo(#[from] konductor_repo::RepoError),

    #[error(transparent)]
    Kube(#[from] konductor_kube::KubeError),
}

impl EngineError {
    /// Configuration errors are raised before anything is deployed
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EngineError::ModuleNotFound { .. }
                | EngineError::EntrypointNotFound { .. }
                | EngineError::InvalidModuleConfig { .. }
        )
    }

    /// Name of the module a failure is attributed to
    pub fn module(&self) -> Option<&str> {
        match self {
            EngineError::ModuleNotFound { module }
            | EngineError::EntrypointNotFound { module }
            | EngineError::UnexpectedReturnShape { module, .. }
            | EngineError::InvalidModuleConfig { module, .. }
            | EngineError::VersionUnavailable { module, .. }
            | EngineError::ModuleFailed { module, .. } => Some(module),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_failed_message() {
        let err = EngineError::ModuleFailed {
            module: "kubevirt".to_string(),
            source: Box::new(EngineError::Kube(konductor_kube::KubeError::InvalidConfig(
                "boom".to_string(),
            ))),
        };
        assert_eq!(
            err.to_string(),
            "module 'kubevirt' failed to deploy: invalid configuration: boom"
        );
        assert_eq!(err.module(), Some("kubevirt"));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(
            EngineError::ModuleNotFound {
                module: "x".to_string()
            }
            .is_configuration_error()
        );
        assert!(
            EngineError::EntrypointNotFound {
                module: "x".to_string()
            }
            .to_string()
            .contains("deploy_x_module")
        );
    }
}
