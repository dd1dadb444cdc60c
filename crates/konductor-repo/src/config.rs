//! Version source configuration
//!
//! Read from the `versions` block of the stack:
//!
//! ```yaml
//! versions:
//!   source: https://example.com/pinned_versions.json   # explicit, fatal on failure
//!   stack_file: true                                   # try versions/<stack>.json
//!   channel: stable
//!   cache_max_age: 1h
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default remote location of channel version files, `{channel}` is substituted
pub const DEFAULT_REMOTE_URL: &str =
    "https://raw.githubusercontent.com/containercraft/konductor/main/versions/{channel}_versions.json";

/// Configuration of the version cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionsConfig {
    /// Explicit source (URL or local path); when set no fallback is attempted
    pub source: Option<String>,

    /// Try `<versions_dir>/<stack>.json` before the default file
    pub stack_file: bool,

    /// Directory holding per-stack version files
    pub versions_dir: PathBuf,

    /// Local default version file
    pub default_file: PathBuf,

    /// Remote channel name (e.g. "stable")
    pub channel: String,

    /// Remote URL template containing `{channel}`
    pub remote_url: String,

    /// Run cache location (defaults to the system temp dir)
    pub cache_path: Option<PathBuf>,

    /// Treat a cache older than this as absent; no expiry when unset
    #[serde(with = "humantime_serde")]
    pub cache_max_age: Option<Duration>,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            source: None,
            stack_file: false,
            versions_dir: PathBuf::from("versions"),
            default_file: PathBuf::from("default_versions.json"),
            channel: "stable".to_string(),
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            cache_path: None,
            cache_max_age: None,
        }
    }
}

impl VersionsConfig {
    /// Path of the version file named after the stack
    pub fn stack_file_path(&self, stack_name: &str) -> PathBuf {
        self.versions_dir.join(format!("{}.json", stack_name))
    }

    /// Remote URL for the configured channel
    pub fn channel_url(&self) -> String {
        self.remote_url.replace("{channel}", &self.channel)
    }

    /// Effective cache path
    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("konductor_versions_cache.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VersionsConfig::default();
        assert_eq!(config.channel, "stable");
        assert!(!config.stack_file);
        assert!(config.source.is_none());
        assert!(config.cache_path().ends_with("konductor_versions_cache.json"));
    }

    #[test]
    fn test_channel_url() {
        let config = VersionsConfig {
            channel: "edge".to_string(),
            remote_url: "https://example.com/{channel}.json".to_string(),
            ..Default::default()
        };
        assert_eq!(config.channel_url(), "https://example.com/edge.json");
    }

    #[test]
    fn test_stack_file_path() {
        let config = VersionsConfig::default();
        assert_eq!(
            config.stack_file_path("dev"),
            PathBuf::from("versions").join("dev.json")
        );
    }

    #[test]
    fn test_parse_from_yaml() {
        let config: VersionsConfig = serde_yaml::from_str(
            r#"
source: ./pinned.json
channel: edge
cache_max_age: 1h
"#,
        )
        .unwrap();
        assert_eq!(config.source.as_deref(), Some("./pinned.json"));
        assert_eq!(config.channel, "edge");
        assert_eq!(config.cache_max_age, Some(Duration::from_secs(3600)));
        assert_eq!(config.default_file, PathBuf::from("default_versions.json"));
    }
}
