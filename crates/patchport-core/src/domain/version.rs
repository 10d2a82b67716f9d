//! Upstream release identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::PatchportError;

/// A `major.minor` release identifier.
///
/// Ordering is numeric per component, so `6.9 < 6.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionTag {
    pub major: u64,
    pub minor: u64,
}

impl VersionTag {
    pub const fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Render the upstream tag name, e.g. `v6.13` for prefix `v`.
    pub fn tag_name(&self, prefix: &str) -> String {
        format!("{prefix}{self}")
    }

    /// Parse an upstream tag name carrying `prefix`.
    ///
    /// Returns `None` for anything that is not exactly `<prefix><major>.<minor>`
    /// (release candidates, stable point releases, unrelated tags).
    pub fn from_tag_name(name: &str, prefix: &str) -> Option<Self> {
        Self::from_numbers(name.strip_prefix(prefix)?)
    }

    /// Parse a bare `<major>.<minor>` with no prefix or surrounding text.
    fn from_numbers(body: &str) -> Option<Self> {
        let (major, minor) = body.split_once('.')?;
        let numeric = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !numeric(major) || !numeric(minor) {
            return None;
        }
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for VersionTag {
    type Err = PatchportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let body = raw.strip_prefix('v').unwrap_or(raw);
        Self::from_numbers(body).ok_or_else(|| PatchportError::InvalidVersion(raw.to_string()))
    }
}
