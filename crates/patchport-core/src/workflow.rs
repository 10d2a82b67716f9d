//! End-to-end migration of the current patch set to the next upstream release.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::MigrateConfig;
use crate::domain::{
    ApplicationResult, ApplyStatus, MigrationReport, PatchSet, PatchportError, RegeneratedPatch,
    Result, VersionSlot, VersionTag,
};
use crate::engine::PatchEngine;
use crate::git::{self, Identity};
use crate::layout::{discover_current, prepare_next_dir, version_dir, write_patch_set};
use crate::obs::{self, RunSpan};
use crate::regen::regenerate;
use crate::remote::Upstream;
use crate::resolver::{next_version, parse_remote_tags};
use crate::scratch::ScratchCheckout;

/// Current patch set location, from config or by discovery.
pub fn locate_current(config: &MigrateConfig) -> Result<(VersionTag, PathBuf)> {
    match config.current {
        Some(version) => {
            let dir = version_dir(&config.patch_root, version);
            if !dir.is_dir() {
                return Err(PatchportError::NoVersionDirs(dir));
            }
            Ok((version, dir))
        }
        None => discover_current(&config.patch_root),
    }
}

/// Resolve the release following `current` from the upstream tag list.
pub async fn resolve_next(
    upstream: &dyn Upstream,
    current: VersionTag,
    tag_prefix: &str,
) -> Result<Option<VersionTag>> {
    let listing = upstream.list_tags().await?;
    let versions = parse_remote_tags(&listing, tag_prefix);
    let next = next_version(current, &versions);
    info!(
        upstream = %upstream.location(),
        current = %current,
        next = %next.map(|v| v.to_string()).unwrap_or_else(|| "none".into()),
        known = versions.len(),
        "resolved next version"
    );
    Ok(next)
}

/// Run one migration and report its disposition.
///
/// Skips (no newer release, branch already present) are reported, not
/// returned as errors. Per-patch failures only show up in the report.
pub async fn run_migration(
    config: &MigrateConfig,
    upstream: &dyn Upstream,
) -> Result<MigrationReport> {
    let run_id = Uuid::new_v4().to_string();
    let span = obs::run_span(&run_id);
    let outcome = migrate(config, upstream, &run_id).instrument(span).await;
    if let Err(err) = &outcome {
        obs::emit_migration_error(&run_id, err);
    }
    outcome
}

async fn migrate(
    config: &MigrateConfig,
    upstream: &dyn Upstream,
    run_id: &str,
) -> Result<MigrationReport> {
    let start = Instant::now();
    let prefix = config.tag_prefix.as_str();

    let (current, current_dir) = locate_current(config)?;
    let set = PatchSet::load(&current_dir, current)?;
    let current_slot = VersionSlot {
        version: current,
        tag: current.tag_name(prefix),
        dir: current_dir.clone(),
    };

    let Some(next) = resolve_next(upstream, current, prefix).await? else {
        obs::emit_migration_skipped(run_id, "no newer upstream release");
        return Ok(MigrationReport::none(current_slot));
    };

    let branch = config.branch_name(next);
    let next_slot = VersionSlot {
        version: next,
        tag: next.tag_name(prefix),
        dir: version_dir(&config.patch_root, next),
    };

    let bookkeeping = git::is_git_repo(&config.repo_dir);
    if !bookkeeping {
        warn!(
            repo = %config.repo_dir.display(),
            "not a git repository; skipping branch check"
        );
    } else if git::branch_exists(&config.repo_dir, &branch, config.remote.as_deref())? {
        obs::emit_migration_skipped(run_id, "update branch already exists");
        return Ok(MigrationReport::branch_exists(current_slot, next_slot, branch));
    }

    let next_dir = prepare_next_dir(&config.patch_root, next)?;
    obs::emit_migration_started(run_id, current, next, set.len());

    let checkout = ScratchCheckout::new(config.identity.clone())?;
    upstream.clone_at(&next_slot.tag, checkout.source_dir()).await?;

    let max_fuzz = config.max_fuzz;
    let (set, results, regenerated) = tokio::task::spawn_blocking(move || {
        let engine = PatchEngine::new(checkout.tree(), max_fuzz);
        let results = engine.run(&set)?;
        let regenerated = regenerate(checkout.tree(), &results)?;
        Ok::<_, PatchportError>((set, results, regenerated))
    })
    .await
    .map_err(|e| PatchportError::Task(e.to_string()))??;

    write_patch_set(
        &next_dir,
        &set,
        &current_dir,
        &results,
        &regenerated,
        config.link_unchanged,
    )?;

    let report = MigrationReport::updated(current_slot, next_slot, branch.clone(), results);

    if config.commit && bookkeeping {
        let message = commit_message(&report, next);
        let dir = std::fs::canonicalize(&next_dir)?;
        let sha = git::commit_on_new_branch(
            &config.repo_dir,
            &config.identity,
            &branch,
            &dir,
            &message,
        )?;
        info!(commit = %sha, "patch set committed on update branch");
    }

    obs::emit_migration_finished(
        run_id,
        report.mode.as_str(),
        report.count(ApplyStatus::Clean),
        report.count(ApplyStatus::Fuzzy),
        report.count(ApplyStatus::Failed),
        start.elapsed().as_millis() as u64,
    );
    Ok(report)
}

fn commit_message(report: &MigrationReport, next: VersionTag) -> String {
    let mut message = format!(
        "patches: migrate to {next}\n\n{} clean, {} regenerated, {} dropped\n",
        report.count(ApplyStatus::Clean),
        report.count(ApplyStatus::Fuzzy),
        report.count(ApplyStatus::Failed),
    );
    if !report.failed_patches.is_empty() {
        message.push_str("\nDropped:\n");
        for name in &report.failed_patches {
            message.push_str(&format!("  {name}\n"));
        }
    }
    message
}

/// Result of trying a patch set against an existing checkout.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Commit the probe started from.
    pub base: String,
    pub results: Vec<ApplicationResult>,
    pub regenerated: Vec<RegeneratedPatch>,
}

/// Apply `set` to a private clone of the checkout at `tree_dir`.
///
/// The checkout itself is never modified; the clone is discarded afterwards.
pub fn probe(
    tree_dir: &Path,
    set: &PatchSet,
    max_fuzz: usize,
    identity: Identity,
) -> Result<ProbeOutcome> {
    let run_id = Uuid::new_v4().to_string();
    let _span = RunSpan::enter(&run_id);

    let checkout = ScratchCheckout::new(identity)?;
    let base = git::clone_local(tree_dir, checkout.source_dir())?;
    info!(tree = %tree_dir.display(), base = %base, patches = set.len(), "probing patch set");

    let engine = PatchEngine::new(checkout.tree(), max_fuzz);
    let results = engine.run(set)?;
    let regenerated = regenerate(checkout.tree(), &results)?;

    Ok(ProbeOutcome {
        base,
        results,
        regenerated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UpdateMode;
    use async_trait::async_trait;

    /// Upstream with a fixed tag list that must never be cloned.
    struct ListingOnly(&'static str);

    #[async_trait]
    impl Upstream for ListingOnly {
        fn location(&self) -> &str {
            "memory"
        }

        async fn list_tags(&self) -> Result<String> {
            Ok(self.0.to_string())
        }

        async fn clone_at(&self, tag: &str, _dest: &Path) -> Result<()> {
            panic!("unexpected clone of {tag}");
        }
    }

    fn patch_root(versions: &[&str]) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        for version in versions {
            let dir = root.path().join(version);
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("0001-a.patch"), "--- a/x\n+++ b/x\n").unwrap();
        }
        root
    }

    fn config(root: &Path) -> MigrateConfig {
        MigrateConfig {
            patch_root: root.to_path_buf(),
            repo_dir: root.to_path_buf(),
            ..MigrateConfig::default()
        }
    }

    #[tokio::test]
    async fn test_no_newer_release_reports_none() {
        let root = patch_root(&["6.13"]);
        let upstream = ListingOnly("a\trefs/tags/v6.12\nb\trefs/tags/v6.13\n");

        let report = run_migration(&config(root.path()), &upstream).await.unwrap();

        assert_eq!(report.mode, UpdateMode::None);
        assert!(!report.has_errors);
        assert!(!root.path().join("6.14").exists());
    }

    #[tokio::test]
    async fn test_unknown_current_reports_none() {
        let root = patch_root(&["6.13"]);
        let upstream = ListingOnly("a\trefs/tags/v6.14\nb\trefs/tags/v6.15\n");

        let report = run_migration(&config(root.path()), &upstream).await.unwrap();
        assert_eq!(report.mode, UpdateMode::None);
    }

    #[tokio::test]
    async fn test_existing_target_dir_is_fatal() {
        let root = patch_root(&["6.13"]);
        std::fs::create_dir(root.path().join("6.14")).unwrap();
        let mut config = config(root.path());
        config.current = Some(VersionTag::new(6, 13));
        let upstream = ListingOnly("a\trefs/tags/v6.13\nb\trefs/tags/v6.14\n");

        let err = run_migration(&config, &upstream).await.unwrap_err();
        assert!(matches!(err, PatchportError::TargetExists(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_empty_patch_root_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let upstream = ListingOnly("");
        let err = run_migration(&config(root.path()), &upstream)
            .await
            .unwrap_err();
        assert!(matches!(err, PatchportError::NoVersionDirs(_)));
    }

    #[test]
    fn test_commit_message_lists_dropped_patches() {
        let slot = |minor| {
            let version = VersionTag::new(6, minor);
            VersionSlot {
                version,
                tag: version.tag_name("v"),
                dir: PathBuf::from(version.to_string()),
            }
        };
        let results = vec![ApplicationResult::failed(
            "0002-b.patch",
            "d",
            crate::domain::TreeMarker::new("a"),
            1,
            "rejected",
        )];
        let report = MigrationReport::updated(slot(13), slot(14), "update/6.14".into(), results);

        let message = commit_message(&report, VersionTag::new(6, 14));
        assert!(message.starts_with("patches: migrate to 6.14\n"));
        assert!(message.contains("0 clean, 0 regenerated, 1 dropped"));
        assert!(message.contains("  0002-b.patch\n"));
    }
}
