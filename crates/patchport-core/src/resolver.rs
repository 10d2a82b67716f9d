//! Upstream version resolution.
//!
//! Turns a raw `git ls-remote --tags` listing into an ordered list of release
//! versions and picks the one that follows the locally tracked release.

use tracing::debug;

use crate::domain::VersionTag;

/// Parse `git ls-remote --tags` output into a deduplicated, numerically
/// ordered list of release versions.
///
/// Lines look like `<sha>\trefs/tags/v6.13` with an extra peeled
/// `refs/tags/v6.13^{}` entry for annotated tags. Tags that are not exactly
/// `<prefix><major>.<minor>` are skipped.
pub fn parse_remote_tags(listing: &str, prefix: &str) -> Vec<VersionTag> {
    let mut versions: Vec<VersionTag> = listing
        .lines()
        .filter_map(|line| {
            let reference = line.split_whitespace().nth(1).unwrap_or(line.trim());
            let name = reference.strip_prefix("refs/tags/").unwrap_or(reference);
            let name = name.strip_suffix("^{}").unwrap_or(name);
            VersionTag::from_tag_name(name, prefix)
        })
        .collect();

    sort_versions(&mut versions);
    versions.dedup();
    debug!(count = versions.len(), "parsed upstream release tags");
    versions
}

/// Sort versions numerically (`6.9` before `6.10`).
pub fn sort_versions(versions: &mut [VersionTag]) {
    versions.sort_unstable();
}

/// The version immediately following `current` in `ordered`.
///
/// Returns `None` when `current` is the last entry, and also when it is not
/// listed at all: an unknown current release means there is nothing to do.
pub fn next_version(current: VersionTag, ordered: &[VersionTag]) -> Option<VersionTag> {
    let position = ordered.iter().position(|v| *v == current)?;
    ordered.get(position + 1).copied()
}
