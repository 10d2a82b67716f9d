//! Structured lifecycle events for migration runs.
//!
//! Every event carries an `event` field (`migration.started`,
//! `patch.attempted`, ...) so JSON logs can be filtered without parsing
//! messages.

use tracing::{info, warn};

use crate::domain::{ApplicationResult, VersionTag};

/// RAII guard that keeps a run-scoped span entered for the whole run.
///
/// ```ignore
/// let _span = RunSpan::enter("3f1c...");
/// // every event below carries run_id = "3f1c..."
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// The run-scoped span, for instrumenting async work where an entered
/// guard cannot be held across `.await`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("patchport.run", run_id = %run_id)
}

/// Migration from `current` to `next` is starting.
pub fn emit_migration_started(run_id: &str, current: VersionTag, next: VersionTag, patches: usize) {
    info!(
        event = "migration.started",
        run_id = %run_id,
        current = %current,
        next = %next,
        patches = patches,
    );
}

/// One patch reached its terminal state.
pub fn emit_patch_attempted(result: &ApplicationResult) {
    info!(
        event = "patch.attempted",
        patch = %result.patch_name,
        status = %result.status,
        base = %result.base_marker.short(),
        result = result.result_marker.as_ref().map(|m| m.short()).unwrap_or("-"),
        placed_hunks = result.placed_hunks,
        rejected_hunks = result.rejected_hunks,
    );
}

/// Run finished with per-status counts.
pub fn emit_migration_finished(
    run_id: &str,
    mode: &str,
    clean: usize,
    fuzzy: usize,
    failed: usize,
    duration_ms: u64,
) {
    info!(
        event = "migration.finished",
        run_id = %run_id,
        mode = %mode,
        clean = clean,
        fuzzy = fuzzy,
        failed = failed,
        duration_ms = duration_ms,
    );
}

/// A run was skipped (no newer release, or branch already present).
pub fn emit_migration_skipped(run_id: &str, reason: &str) {
    info!(event = "migration.skipped", run_id = %run_id, reason = %reason);
}

/// Fatal error surfaced from a run.
pub fn emit_migration_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "migration.error", run_id = %run_id, error = %error);
}
