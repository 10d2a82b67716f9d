//! The terminal output of one migration run.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::outcome::{ApplicationResult, ApplyStatus};
use super::version::VersionTag;
use crate::aggregate::aggregate;

/// Run disposition reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// No newer upstream release exists.
    None,
    /// The update branch for the next release is already in progress.
    BranchExists,
    /// A migration was attempted, possibly with failed patches.
    Updated,
}

impl UpdateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateMode::None => "none",
            UpdateMode::BranchExists => "branch_exists",
            UpdateMode::Updated => "updated",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the current patch set lives and which upstream tag it tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSlot {
    pub version: VersionTag,
    pub tag: String,
    pub dir: PathBuf,
}

/// Aggregate of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub mode: UpdateMode,
    pub current: Option<VersionSlot>,
    pub next: Option<VersionSlot>,
    pub branch_name: Option<String>,
    pub failed_patches: Vec<String>,
    pub has_errors: bool,
    pub results: Vec<ApplicationResult>,
    pub generated_at: DateTime<Utc>,
}

impl MigrationReport {
    /// No newer release upstream: nothing to do.
    pub fn none(current: VersionSlot) -> Self {
        Self {
            mode: UpdateMode::None,
            current: Some(current),
            next: None,
            branch_name: None,
            failed_patches: Vec::new(),
            has_errors: false,
            results: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// The update branch already exists: a no-op, not an error.
    pub fn branch_exists(current: VersionSlot, next: VersionSlot, branch_name: String) -> Self {
        Self {
            mode: UpdateMode::BranchExists,
            current: Some(current),
            next: Some(next),
            branch_name: Some(branch_name),
            failed_patches: Vec::new(),
            has_errors: false,
            results: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// A migration was attempted; failures come from `results`.
    pub fn updated(
        current: VersionSlot,
        next: VersionSlot,
        branch_name: String,
        results: Vec<ApplicationResult>,
    ) -> Self {
        let outcome = aggregate(&results);
        Self {
            mode: UpdateMode::Updated,
            current: Some(current),
            next: Some(next),
            branch_name: Some(branch_name),
            failed_patches: outcome.failed_patches,
            has_errors: outcome.has_errors,
            results,
            generated_at: Utc::now(),
        }
    }

    pub fn count(&self, status: ApplyStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Flat key/value fields for the external orchestrator, in a stable order.
    pub fn outputs(&self) -> Vec<(&'static str, String)> {
        let dir = |slot: &Option<VersionSlot>| {
            slot.as_ref()
                .map(|s| s.dir.display().to_string())
                .unwrap_or_default()
        };
        let tag = |slot: &Option<VersionSlot>| {
            slot.as_ref().map(|s| s.tag.clone()).unwrap_or_default()
        };

        vec![
            ("update_mode", self.mode.to_string()),
            ("branch_name", self.branch_name.clone().unwrap_or_default()),
            ("next_dir", dir(&self.next)),
            ("next_tag", tag(&self.next)),
            ("current_dir", dir(&self.current)),
            ("current_tag", tag(&self.current)),
            ("has_errors", self.has_errors.to_string()),
            ("failed_patches", self.failed_patches.join(",")),
        ]
    }
}
