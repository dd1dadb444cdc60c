//! CLI error types with exit code handling
//!
//! Every library error is funneled into [`CliError`] so `main` can render a
//! diagnostic and exit with a code scripts can branch on.

use konductor_core::CoreError;
use konductor_engine::EngineError;
use konductor_kube::KubeError;
use konductor_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Stack configuration is missing or invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(konductor::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Version table could not be resolved
    #[error("Version resolution failed: {message}")]
    #[diagnostic(code(konductor::cli::versions))]
    Versions {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A module failed to deploy
    #[error("Deployment of '{module}' failed: {message}")]
    #[diagnostic(code(konductor::cli::deploy))]
    Deploy {
        module: String,
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Cluster unreachable or misconfigured
    #[error("Cluster error: {message}")]
    #[diagnostic(
        code(konductor::cli::cluster),
        help("check the kubeconfig context with `kubectl config current-context`")
    )]
    Cluster { message: String },

    /// Invalid command line value
    #[error("{message}")]
    #[diagnostic(code(konductor::cli::usage))]
    Usage { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(konductor::cli::io))]
    Io { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(konductor::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Versions { .. } => exit_codes::VERSION_ERROR,
            CliError::Deploy { .. } => exit_codes::DEPLOY_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::other(format!("failed to render output: {}", err))
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let help = match &err {
            CoreError::StackNotFound { .. } => {
                Some("pass the stack file with --config or create stack.yaml".to_string())
            }
            CoreError::YamlParse(_) => Some("the stack file must be a YAML mapping".to_string()),
            _ => None,
        };
        CliError::Config {
            message: err.to_string(),
            help,
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let help = match &err {
            RepoError::ExplicitSourceFailed { .. } => Some(
                "versions.source is authoritative; fix it or remove it to use the fallback cascade"
                    .to_string(),
            ),
            RepoError::VersionSourceExhausted { .. } => Some(
                "add a default_versions.json next to the stack file or set versions.source"
                    .to_string(),
            ),
            _ => None,
        };
        CliError::Versions {
            message: err.to_string(),
            help,
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        CliError::Cluster {
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        if err.is_configuration_error() {
            return CliError::Config {
                message: err.to_string(),
                help: Some("run `konductor modules` to list the registered modules".to_string()),
            };
        }
        match err {
            EngineError::Core(e) => e.into(),
            EngineError::Repo(e) => e.into(),
            EngineError::Kube(e) => e.into(),
            EngineError::ModuleFailed { module, source } => CliError::Deploy {
                module,
                message: source.to_string(),
                help: source
                    .is_configuration_error()
                    .then(|| "check the module's block in the stack file".to_string()),
            },
            other => CliError::Deploy {
                module: other.module().unwrap_or("unknown").to_string(),
                message: other.to_string(),
                help: None,
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
