//! Source-control provenance of a deployment

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Placeholder for provenance fields that could not be determined
pub const UNKNOWN: &str = "N/A";

/// Remote URL, branch and commit of the repository driving the deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub remote: String,
    pub branch: String,
    pub commit: String,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            remote: UNKNOWN.to_string(),
            branch: UNKNOWN.to_string(),
            commit: UNKNOWN.to_string(),
        }
    }
}

impl Provenance {
    pub fn new(
        remote: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            remote: remote.into(),
            branch: branch.into(),
            commit: commit.into(),
        }
    }

    /// Collect provenance from the git checkout at `dir`
    ///
    /// Missing git, a directory outside a checkout or a detached remote all
    /// degrade to [`UNKNOWN`] field by field.
    pub async fn collect(dir: &Path) -> Self {
        let remote = git(dir, &["config", "--get", "remote.origin.url"]).await;
        let branch = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).await;
        let commit = git(dir, &["rev-parse", "HEAD"]).await;

        Self {
            remote: remote.unwrap_or_else(|| UNKNOWN.to_string()),
            branch: branch.unwrap_or_else(|| UNKNOWN.to_string()),
            commit: commit.unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }

    /// JSON form published in the run outputs as `source_repository`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "remote": self.remote,
            "branch": self.branch,
            "commit": self.commit,
        })
    }
}

async fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .map_err(|e| debug!("git {} failed: {}", args.join(" "), e))
        .ok()?;

    if !output.status.success() {
        debug!(
            "git {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!value.is_empty()).then_some(value)
}
