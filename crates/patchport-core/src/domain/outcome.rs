//! Per-patch application outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Terminal status of one patch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    /// Applied with an exact context match.
    Clean,
    /// Applied only with offset, fuzz or whitespace tolerance; no rejects.
    Fuzzy,
    /// Could not be applied without leaving reject fragments.
    Failed,
}

impl ApplyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyStatus::Clean => "clean",
            ApplyStatus::Fuzzy => "fuzzy",
            ApplyStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single patch within a run.
///
/// The only legal transition is `NotAttempted` to one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    NotAttempted,
    Done(ApplyStatus),
}

impl PatchState {
    /// Move to a terminal state. Returns `None` if already terminal.
    pub fn finish(self, status: ApplyStatus) -> Option<PatchState> {
        match self {
            PatchState::NotAttempted => Some(PatchState::Done(status)),
            PatchState::Done(_) => None,
        }
    }

    pub fn status(self) -> Option<ApplyStatus> {
        match self {
            PatchState::NotAttempted => None,
            PatchState::Done(status) => Some(status),
        }
    }
}

/// Identifier of a scratch-tree state (a commit id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeMarker(pub String);

impl TreeMarker {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for logs.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for TreeMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one patch attempt. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationResult {
    pub patch_name: String,
    /// SHA-256 of the original patch content.
    pub patch_digest: String,
    pub status: ApplyStatus,
    /// Tree state before this patch was attempted.
    pub base_marker: TreeMarker,
    /// Tree state after the patch's commit; absent when `Failed`.
    pub result_marker: Option<TreeMarker>,
    pub placed_hunks: usize,
    pub rejected_hunks: usize,
    /// Human-readable reason for `Failed`, or tolerance notes for `Fuzzy`.
    pub detail: Option<String>,
}

impl ApplicationResult {
    pub fn applied(
        patch_name: impl Into<String>,
        patch_digest: impl Into<String>,
        status: ApplyStatus,
        base_marker: TreeMarker,
        result_marker: TreeMarker,
        placed_hunks: usize,
    ) -> Self {
        debug_assert!(status != ApplyStatus::Failed);
        Self {
            patch_name: patch_name.into(),
            patch_digest: patch_digest.into(),
            status,
            base_marker,
            result_marker: Some(result_marker),
            placed_hunks,
            rejected_hunks: 0,
            detail: None,
        }
    }

    pub fn failed(
        patch_name: impl Into<String>,
        patch_digest: impl Into<String>,
        base_marker: TreeMarker,
        rejected_hunks: usize,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            patch_name: patch_name.into(),
            patch_digest: patch_digest.into(),
            status: ApplyStatus::Failed,
            base_marker,
            result_marker: None,
            placed_hunks: 0,
            rejected_hunks,
            detail: Some(detail.into()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == ApplyStatus::Failed
    }
}

/// New patch content for a `Fuzzy` result, keyed by the original name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegeneratedPatch {
    pub patch_name: String,
    pub content: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_allows_single_transition() {
        let state = PatchState::NotAttempted;
        assert_eq!(state.status(), None);

        let done = state.finish(ApplyStatus::Fuzzy).unwrap();
        assert_eq!(done.status(), Some(ApplyStatus::Fuzzy));
        assert!(done.finish(ApplyStatus::Clean).is_none());
    }

    #[test]
    fn test_failed_result_has_no_result_marker() {
        let result = ApplicationResult::failed(
            "0003-c.patch",
            "00",
            TreeMarker::new("abc"),
            2,
            "2 hunks rejected",
        );
        assert!(result.is_failed());
        assert!(result.result_marker.is_none());
        assert_eq!(result.rejected_hunks, 2);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ApplyStatus::Fuzzy).unwrap();
        assert_eq!(json, "\"fuzzy\"");
    }

    #[test]
    fn test_marker_short() {
        let marker = TreeMarker::new("0123456789abcdef0123");
        assert_eq!(marker.short(), "0123456789ab");
        assert_eq!(TreeMarker::new("abc").short(), "abc");
    }
}
