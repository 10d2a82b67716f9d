//! Settings for one migration run.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::VersionTag;
use crate::engine::DEFAULT_MAX_FUZZ;
use crate::git::Identity;
use crate::remote::DEFAULT_CLONE_TIMEOUT;

/// Upstream tracked when none is configured.
pub const DEFAULT_UPSTREAM: &str =
    "https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git";

/// Everything [`run_migration`](crate::workflow::run_migration) needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Upstream release repository URL.
    pub upstream_url: String,
    /// Directory holding one sub-directory of patches per version.
    pub patch_root: PathBuf,
    /// Repository the patch root lives in, for branch bookkeeping.
    pub repo_dir: PathBuf,
    /// Prefix of release tags upstream (`v` for `v6.13`).
    pub tag_prefix: String,
    /// Prefix of the update branch (`update/` for `update/6.14`).
    pub branch_prefix: String,
    /// Remote whose heads are checked for an existing update branch.
    pub remote: Option<String>,
    /// Use this version instead of the highest directory under `patch_root`.
    pub current: Option<VersionTag>,
    pub max_fuzz: usize,
    pub clone_timeout_secs: u64,
    /// Symlink unchanged patches to the previous set instead of copying.
    pub link_unchanged: bool,
    /// Commit the new patch directory on the update branch.
    pub commit: bool,
    /// Committer identity for scratch and bookkeeping commits.
    pub identity: Identity,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM.to_string(),
            patch_root: PathBuf::from("patches"),
            repo_dir: PathBuf::from("."),
            tag_prefix: "v".to_string(),
            branch_prefix: "update/".to_string(),
            remote: Some("origin".to_string()),
            current: None,
            max_fuzz: DEFAULT_MAX_FUZZ,
            clone_timeout_secs: DEFAULT_CLONE_TIMEOUT.as_secs(),
            link_unchanged: false,
            commit: false,
            identity: Identity::default(),
        }
    }
}

impl MigrateConfig {
    /// Update branch for `next`, e.g. `update/6.14`.
    pub fn branch_name(&self, next: VersionTag) -> String {
        format!("{}{}", self.branch_prefix, next)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrateConfig::default();
        assert_eq!(config.tag_prefix, "v");
        assert_eq!(config.max_fuzz, 2);
        assert_eq!(config.clone_timeout(), Duration::from_secs(1800));
        assert_eq!(config.branch_name(VersionTag::new(6, 14)), "update/6.14");
        assert_eq!(config.identity.name, "patchport");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: MigrateConfig =
            serde_json::from_str(r#"{"patch_root": "kernel/patches", "max_fuzz": 0}"#).unwrap();
        assert_eq!(config.patch_root, PathBuf::from("kernel/patches"));
        assert_eq!(config.max_fuzz, 0);
        assert_eq!(config.branch_prefix, "update/");
    }
}
