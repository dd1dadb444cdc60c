//! Helm repository index
//!
//! Only the parts of `index.yaml` needed to pick a chart version are modeled.

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{RepoError, Result};
use crate::http::Fetcher;

/// Sentinel reported when a chart is absent from an index
pub const CHART_NOT_FOUND: &str = "Chart not found";

/// Repository index (Helm-compatible)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Charts indexed by name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
}

/// Chart entry in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    #[serde(default)]
    pub name: String,

    /// Chart version (semver)
    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub deprecated: bool,
}

impl ChartEntry {
    /// Parse version as semver, tolerating a single leading `v`
    pub fn parsed_version(&self) -> Option<Version> {
        parse_version(&self.version)
    }
}

impl ChartIndex {
    /// Parse index from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    /// Parse index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartEntry>> {
        self.entries.get(name)
    }

    /// Latest stable version of a chart, by semver ordering
    pub fn latest_stable(&self, name: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .filter_map(|entry| {
                let version = entry.parsed_version()?;
                version.pre.is_empty().then_some((version, entry))
            })
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, entry)| entry)
    }
}

/// Outcome of a chart version lookup
///
/// Lookups never fail with an error; callers inspect the outcome instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartVersionLookup {
    Found(String),
    NotFound,
    Failed(String),
}

impl ChartVersionLookup {
    /// The version, when one was found
    pub fn version(&self) -> Option<&str> {
        match self {
            ChartVersionLookup::Found(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ChartVersionLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartVersionLookup::Found(v) => write!(f, "{}", v),
            ChartVersionLookup::NotFound => write!(f, "{}", CHART_NOT_FOUND),
            ChartVersionLookup::Failed(message) => {
                write!(f, "Error fetching chart index: {}", message)
            }
        }
    }
}

/// Latest stable version of `chart_name` in the Helm index at `index_url`
///
/// Fails soft: a chart without stable versions is [`ChartVersionLookup::NotFound`],
/// a network or parse problem is [`ChartVersionLookup::Failed`].
pub async fn latest_stable_chart_version<F: Fetcher + ?Sized>(
    fetcher: &F,
    index_url: &str,
    chart_name: &str,
) -> ChartVersionLookup {
    let body = match fetcher.fetch(index_url).await {
        Ok(body) => body,
        Err(e) => return ChartVersionLookup::Failed(e.to_string()),
    };

    let index = match ChartIndex::from_bytes(&body) {
        Ok(index) => index,
        Err(e) => return ChartVersionLookup::Failed(e.to_string()),
    };

    match index.latest_stable(chart_name) {
        Some(entry) => ChartVersionLookup::Found(entry.version.clone()),
        None => ChartVersionLookup::NotFound,
    }
}

/// Whether a version string is a stable release
///
/// Stable means: valid semver (optionally `v`-prefixed) without a
/// pre-release component. Development-style versions such as `1.0.0.dev1`
/// are not valid semver and therefore never stable.
pub fn is_stable_version(version: &str) -> bool {
    parse_version(version).is_some_and(|v| v.pre.is_empty())
}

fn parse_version(version: &str) -> Option<Version> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}
