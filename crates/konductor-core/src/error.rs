//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Stack configuration not found: {path}")]
    StackNotFound { path: String },

    #[error("Missing required configuration key: {key}")]
    MissingKey { key: String },

    #[error("Invalid configuration for '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    #[error("Failed to parse stack configuration: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
