//! Konductor Engine - module orchestration
//!
//! This crate provides:
//! - **Registry**: explicit, startup-time registration of module config
//!   schemas and `deploy_<name>_module` entrypoints
//! - **Driver**: sequential deployment of enabled modules with dependency
//!   tracking and fail-fast error handling
//! - **Modules**: the built-in platform modules

pub mod context;
pub mod driver;
pub mod error;
pub mod modules;
pub mod registry;

pub use context::{DeployContext, DeploymentResult};
pub use driver::{Driver, ModuleState, RunOutputs, SOURCE_REPOSITORY_KEY};
pub use error::{EngineError, Result};
pub use registry::{ConfigSchema, DeployEntrypoint, ModuleDescriptor, ModuleRegistry};
