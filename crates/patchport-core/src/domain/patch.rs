//! Patch files and the per-version patch set.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{PatchportError, Result};
use super::version::VersionTag;

/// File extensions recognised as patches inside a version directory.
pub const PATCH_EXTENSIONS: [&str; 2] = ["patch", "diff"];

/// A named patch with its raw diff content. Read-only input to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl PatchFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// SHA-256 hex digest of the raw content.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.content))
    }
}

/// Ordered patches validated against one upstream version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSet {
    pub version: VersionTag,
    pub patches: Vec<PatchFile>,
}

impl PatchSet {
    pub fn new(version: VersionTag, patches: Vec<PatchFile>) -> Self {
        Self { version, patches }
    }

    /// Load every patch file in `dir`, sorted by file name.
    ///
    /// Symlinked patches (unchanged carry-overs from an older set) are
    /// followed. An empty directory is a precondition error.
    pub fn load(dir: &Path, version: VersionTag) -> Result<Self> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_patch = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| PATCH_EXTENSIONS.contains(&e));
            if !is_patch {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();

        if names.is_empty() {
            return Err(PatchportError::EmptyPatchSet(dir.to_path_buf()));
        }

        let patches = names
            .into_iter()
            .map(|name| {
                let content = std::fs::read(dir.join(&name))?;
                Ok(PatchFile::new(name, content))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { version, patches })
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PatchFile> {
        self.patches.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_digest_is_sha256_hex() {
        let patch = PatchFile::new("0001-a.patch", b"diff".to_vec());
        let digest = patch.digest();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, PatchFile::new("other", b"diff".to_vec()).digest());
    }

    #[test]
    fn test_load_sorts_and_filters() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("0002-b.patch"), "b").unwrap();
        std::fs::write(dir.path().join("0001-a.patch"), "a").unwrap();
        std::fs::write(dir.path().join("0003-c.diff"), "c").unwrap();
        std::fs::write(dir.path().join("README"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.patch")).unwrap();

        let set = PatchSet::load(dir.path(), VersionTag::new(6, 13)).unwrap();
        let names: Vec<_> = set.patches.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["0001-a.patch", "0002-b.patch", "0003-c.diff"]);
        assert_eq!(set.get("0002-b.patch").unwrap().content, b"b");
    }

    #[test]
    fn test_load_empty_dir_is_precondition_error() {
        let dir = tempdir().unwrap();
        let err = PatchSet::load(dir.path(), VersionTag::new(6, 13)).unwrap_err();
        assert!(matches!(err, PatchportError::EmptyPatchSet(_)));
    }
}
