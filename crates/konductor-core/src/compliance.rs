//! Compliance configuration
//!
//! The `compliance` block of a stack describes which regulatory regimes the
//! platform falls under. It is never interpreted beyond turning it into
//! resource labels and annotations (see [`crate::metadata`]).

use serde::{Deserialize, Serialize};

/// Top-level `compliance` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    pub fisma: FismaConfig,
    pub nist: NistConfig,
    pub scip: ScipConfig,
}

/// FISMA settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FismaConfig {
    pub enabled: bool,
    /// Impact level, free text (e.g. "moderate")
    pub level: Option<String>,
    /// Authority-to-operate record, carried verbatim as an annotation
    pub ato: Option<serde_json::Value>,
}

/// NIST 800-53 settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NistConfig {
    pub enabled: bool,
    pub controls: Vec<String>,
    pub auxiliary: Vec<String>,
    pub exceptions: Vec<String>,
}

/// Ownership and hosting information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScipConfig {
    /// Deployment environment, free text (e.g. "Production/EU")
    pub environment: Option<String>,
    pub ownership: Option<serde_json::Value>,
    pub provider: Option<ScipProvider>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScipProvider {
    pub name: Option<String>,
    pub regions: Vec<String>,
}

impl ComplianceConfig {
    /// Names of the regimes switched on by an `enabled` flag
    pub fn enabled_regimes(&self) -> Vec<&'static str> {
        let mut regimes = Vec::new();
        if self.fisma.enabled {
            regimes.push("fisma");
        }
        if self.nist.enabled {
            regimes.push("nist");
        }
        regimes
    }
}
