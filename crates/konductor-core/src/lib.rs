//! Konductor Core - Core types shared by the Konductor platform orchestrator
//!
//! This crate provides the foundational types used throughout Konductor:
//! - `StackConfig`: Nested stack configuration with simple getters
//! - `merge_config`: Typed module config built from defaults and a user map
//! - `ComplianceConfig`: Compliance regimes that become labels and annotations
//! - `Provenance`: Source-control provenance of the deployment
//! - `GlobalMetadataStore`: Run-wide labels/annotations applied to every resource

pub mod compliance;
pub mod error;
pub mod merge;
pub mod metadata;
pub mod provenance;
pub mod stack;

pub use compliance::{ComplianceConfig, FismaConfig, NistConfig, ScipConfig};
pub use error::{CoreError, Result};
pub use merge::{merge_config, schema_fields};
pub use metadata::{GlobalMetadata, GlobalMetadataStore, ResourceMetadata, sanitize_label_value};
pub use provenance::Provenance;
pub use stack::StackConfig;
