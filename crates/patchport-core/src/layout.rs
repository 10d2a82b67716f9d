//! Per-version patch directories under the patch root.
//!
//! ```text
//! patches/
//!   6.13/0001-foo.patch
//!   6.14/0001-foo.patch   (copy, symlink, or regenerated)
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::domain::{
    ApplicationResult, ApplyStatus, PatchSet, PatchportError, RegeneratedPatch, Result, VersionTag,
};

/// Directory holding the patches for `version`.
pub fn version_dir(root: &Path, version: VersionTag) -> PathBuf {
    root.join(version.to_string())
}

/// Highest version directory under `root`.
///
/// Entries that are not `<major>.<minor>` directories are ignored.
pub fn discover_current(root: &Path) -> Result<(VersionTag, PathBuf)> {
    if !root.is_dir() {
        return Err(PatchportError::NoVersionDirs(root.to_path_buf()));
    }

    let mut best: Option<VersionTag> = None;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let Some(version) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<VersionTag>().ok())
        else {
            continue;
        };
        if best.map_or(true, |b| version > b) {
            best = Some(version);
        }
    }

    let version = best.ok_or_else(|| PatchportError::NoVersionDirs(root.to_path_buf()))?;
    debug!(version = %version, root = %root.display(), "current patch set discovered");
    Ok((version, version_dir(root, version)))
}

/// Target directory for `next`; an existing directory is a collision.
pub fn prepare_next_dir(root: &Path, next: VersionTag) -> Result<PathBuf> {
    let dir = version_dir(root, next);
    if dir.exists() {
        return Err(PatchportError::TargetExists(dir));
    }
    Ok(dir)
}

/// Populate `next_dir` from the run's results.
///
/// Clean patches are carried over byte for byte (or as a relative symlink
/// when `link_unchanged` is set on unix), fuzzy patches are replaced by their
/// regenerated form and failed patches are left out. Returns written paths
/// in patch order.
pub fn write_patch_set(
    next_dir: &Path,
    current: &PatchSet,
    current_dir: &Path,
    results: &[ApplicationResult],
    regenerated: &[RegeneratedPatch],
    link_unchanged: bool,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(next_dir.parent().unwrap_or(Path::new(".")))?;
    std::fs::create_dir(next_dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::AlreadyExists => PatchportError::TargetExists(next_dir.to_path_buf()),
        _ => e.into(),
    })?;

    let regenerated: HashMap<&str, &RegeneratedPatch> = regenerated
        .iter()
        .map(|r| (r.patch_name.as_str(), r))
        .collect();

    let mut written = Vec::new();
    for result in results {
        let target = next_dir.join(&result.patch_name);
        match result.status {
            ApplyStatus::Clean => {
                let Some(original) = current.get(&result.patch_name) else {
                    continue;
                };
                if link_unchanged && link_to_previous(current_dir, &result.patch_name, &target)? {
                    debug!(patch = %result.patch_name, "linked unchanged patch");
                } else {
                    std::fs::write(&target, &original.content)?;
                }
            }
            ApplyStatus::Fuzzy => {
                let Some(patch) = regenerated.get(result.patch_name.as_str()) else {
                    continue;
                };
                std::fs::write(&target, &patch.content)?;
            }
            ApplyStatus::Failed => continue,
        }
        written.push(target);
    }

    info!(
        dir = %next_dir.display(),
        written = written.len(),
        dropped = results.len() - written.len(),
        "patch set written"
    );
    Ok(written)
}

#[cfg(unix)]
fn link_to_previous(current_dir: &Path, name: &str, target: &Path) -> Result<bool> {
    let Some(dir_name) = current_dir.file_name() else {
        return Ok(false);
    };
    let relative = Path::new("..").join(dir_name).join(name);
    std::os::unix::fs::symlink(relative, target)?;
    Ok(true)
}

#[cfg(not(unix))]
fn link_to_previous(_current_dir: &Path, _name: &str, _target: &Path) -> Result<bool> {
    Ok(false)
}
