//! Applying a parsed patch to a directory tree.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use super::apply::{apply_hunks, ApplyMode, Placement, TextBuffer};
use super::parse::{FileChange, FilePatch, ParsedPatch};
use crate::domain::Result;

/// Suffix of reject files written next to their target in tolerant mode.
pub const REJECT_SUFFIX: &str = ".rej";

/// Per-file outcome inside a tree application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: String,
    pub placements: Vec<Placement>,
    pub rejected: usize,
    /// Why hunks were rejected wholesale (missing file, unsafe path, ...).
    pub reason: Option<String>,
}

/// Outcome of applying a whole patch to a tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeApplication {
    pub files: Vec<FileReport>,
    pub placed: usize,
    pub rejected: usize,
    /// Whether anything was written to the tree.
    pub written: bool,
    pub reject_files: Vec<PathBuf>,
}

impl TreeApplication {
    /// Every hunk and file operation succeeded.
    pub fn is_complete(&self) -> bool {
        self.rejected == 0
    }

    /// Some hunk only landed thanks to offset, fuzz or whitespace tolerance.
    pub fn used_tolerance(&self) -> bool {
        self.files
            .iter()
            .flat_map(|f| &f.placements)
            .any(Placement::is_tolerant)
    }

    /// Short description of what went wrong or what tolerance was needed.
    pub fn summary(&self) -> String {
        let total = self.placed + self.rejected;
        if self.rejected > 0 {
            let mut reasons: Vec<String> = self
                .files
                .iter()
                .filter(|f| f.rejected > 0)
                .map(|f| match &f.reason {
                    Some(reason) => format!("{}: {}", f.path, reason),
                    None => format!("{}: {} hunk(s) rejected", f.path, f.rejected),
                })
                .collect();
            reasons.dedup();
            return format!(
                "{} of {} hunk(s) rejected ({})",
                self.rejected,
                total,
                reasons.join("; ")
            );
        }

        let (mut offsets, mut fuzzed, mut whitespace) = (0, 0, 0);
        for placement in self.files.iter().flat_map(|f| &f.placements) {
            offsets += usize::from(placement.offset != 0);
            fuzzed += usize::from(placement.fuzz > 0);
            whitespace += usize::from(placement.whitespace);
        }
        format!(
            "{total} hunk(s) placed; {offsets} offset, {fuzzed} fuzzed, {whitespace} whitespace-normalised"
        )
    }
}

fn safe_relative(path: &str) -> Option<PathBuf> {
    let candidate = Path::new(path);
    let safe = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    safe.then(|| candidate.to_path_buf())
}

#[cfg(unix)]
fn is_executable(full: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::metadata(full)?.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_full: &Path) -> Result<bool> {
    Ok(false)
}

/// Set or clear the execute bits wherever the matching read bit is set.
#[cfg(unix)]
fn apply_executable(full: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(full)?.permissions();
    let mode = permissions.mode();
    let wanted = if executable {
        mode | ((mode & 0o444) >> 2)
    } else {
        mode & !0o111
    };
    if wanted != mode {
        permissions.set_mode(wanted);
        std::fs::set_permissions(full, permissions)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_executable(_full: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

/// Working view of the files a patch touches. `None` means "absent".
struct Overlay<'a> {
    root: &'a Path,
    files: BTreeMap<PathBuf, Option<Vec<u8>>>,
    executable: BTreeMap<PathBuf, bool>,
}

impl<'a> Overlay<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            files: BTreeMap::new(),
            executable: BTreeMap::new(),
        }
    }

    fn read(&mut self, rel: &Path) -> Result<Option<Vec<u8>>> {
        if let Some(state) = self.files.get(rel) {
            return Ok(state.clone());
        }
        let full = self.root.join(rel);
        let state = if full.is_file() {
            Some(std::fs::read(&full)?)
        } else {
            None
        };
        self.files.insert(rel.to_path_buf(), state.clone());
        Ok(state)
    }

    fn set(&mut self, rel: &Path, content: Option<Vec<u8>>) {
        self.files.insert(rel.to_path_buf(), content);
    }

    fn set_executable(&mut self, rel: &Path, executable: bool) {
        self.executable.insert(rel.to_path_buf(), executable);
    }

    /// Executable bit of a file as it is on disk, before any change.
    fn was_executable(&self, rel: &Path) -> Result<bool> {
        let full = self.root.join(rel);
        if full.is_file() {
            is_executable(&full)
        } else {
            Ok(false)
        }
    }

    fn flush(self) -> Result<()> {
        for (rel, state) in self.files {
            let full = self.root.join(&rel);
            match state {
                Some(content) => {
                    if let Some(parent) = full.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let unchanged = full.is_file() && std::fs::read(&full)? == content;
                    if !unchanged {
                        std::fs::write(&full, content)?;
                    }
                    if let Some(&executable) = self.executable.get(&rel) {
                        apply_executable(&full, executable)?;
                    }
                }
                None => {
                    if full.is_file() {
                        std::fs::remove_file(&full)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn reject_all(file: &FilePatch, reason: &str) -> FileReport {
    FileReport {
        path: file.path.clone(),
        placements: Vec::new(),
        rejected: file.hunks.len().max(1),
        reason: Some(reason.to_string()),
    }
}

fn apply_file(
    overlay: &mut Overlay<'_>,
    file: &FilePatch,
    mode: ApplyMode,
) -> Result<(FileReport, Vec<usize>)> {
    let Some(target) = safe_relative(&file.path) else {
        return Ok((reject_all(file, "path escapes the tree"), Vec::new()));
    };

    let source = match &file.change {
        FileChange::Rename { from } => match safe_relative(from) {
            Some(from) => from,
            None => return Ok((reject_all(file, "path escapes the tree"), Vec::new())),
        },
        _ => target.clone(),
    };

    let existing = overlay.read(&source)?;
    let original = match (&file.change, existing) {
        (FileChange::Create, Some(content)) if !content.is_empty() => {
            return Ok((reject_all(file, "file already exists"), Vec::new()));
        }
        (FileChange::Create, _) => TextBuffer::empty(),
        (_, Some(content)) => TextBuffer::from_bytes(&content),
        (_, None) => return Ok((reject_all(file, "file does not exist"), Vec::new())),
    };

    if let FileChange::Rename { .. } = file.change {
        if source != target && overlay.read(&target)?.is_some() {
            return Ok((reject_all(file, "rename target already exists"), Vec::new()));
        }
    }

    let applied = apply_hunks(&original, &file.hunks, mode);
    let mut report = FileReport {
        path: file.path.clone(),
        placements: applied.placements.clone(),
        rejected: applied.rejects.len(),
        reason: None,
    };

    match &file.change {
        FileChange::Delete => {
            if applied.is_complete() && !applied.buffer.is_empty() {
                report.rejected += 1;
                report.reason = Some("file not empty after removing its lines".to_string());
            } else if applied.is_complete() {
                overlay.set(&target, None);
            } else {
                overlay.set(&target, Some(applied.buffer.to_bytes()));
            }
        }
        FileChange::Rename { .. } => {
            let executable = match file.executable() {
                Some(executable) => executable,
                None => overlay.was_executable(&source)?,
            };
            overlay.set(&source, None);
            overlay.set(&target, Some(applied.buffer.to_bytes()));
            overlay.set_executable(&target, executable);
        }
        FileChange::Create | FileChange::Modify => {
            overlay.set(&target, Some(applied.buffer.to_bytes()));
            if let Some(executable) = file.executable() {
                overlay.set_executable(&target, executable);
            }
        }
    }

    Ok((report, applied.rejects))
}

fn render_rejects(file: &FilePatch, rejects: &[usize]) -> Vec<u8> {
    let mut out = format!("--- a/{}\n+++ b/{}\n", file.path, file.path).into_bytes();
    for &index in rejects {
        out.extend(file.hunks[index].render());
    }
    out
}

/// Apply `patch` to the tree rooted at `root`.
///
/// In strict mode nothing is written unless every file applies completely.
/// In tolerant mode every placeable hunk is written and rejected hunks are
/// saved to `<path>.rej`, so a partial application is visible on disk.
pub fn apply_to_tree(root: &Path, patch: &ParsedPatch, mode: ApplyMode) -> Result<TreeApplication> {
    let mut overlay = Overlay::new(root);
    let mut outcome = TreeApplication::default();
    let mut reject_payloads = Vec::new();

    for file in &patch.files {
        let (report, rejects) = apply_file(&mut overlay, file, mode)?;
        outcome.placed += report.placements.len();
        outcome.rejected += report.rejected;
        if !rejects.is_empty() {
            reject_payloads.push((file, rejects));
        }
        outcome.files.push(report);
    }

    if mode == ApplyMode::Strict && !outcome.is_complete() {
        debug!(rejected = outcome.rejected, "strict apply refused; tree untouched");
        return Ok(outcome);
    }

    overlay.flush()?;
    outcome.written = true;

    if let ApplyMode::Tolerant { .. } = mode {
        for (file, rejects) in reject_payloads {
            let Some(rel) = safe_relative(&file.path) else {
                continue;
            };
            let mut reject_path = root.join(rel).into_os_string();
            reject_path.push(REJECT_SUFFIX);
            let reject_path = PathBuf::from(reject_path);
            if let Some(parent) = reject_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&reject_path, render_rejects(file, &rejects))?;
            outcome.reject_files.push(reject_path);
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::parse::parse_patch;
    use tempfile::tempdir;

    fn numbered(count: usize) -> String {
        (1..=count).map(|n| format!("line {n}\n")).collect()
    }

    const TWO_FILES: &str = "\
--- a/one.txt
+++ b/one.txt
@@ -1,3 +1,3 @@
 line 1
-line 2
+line two
 line 3
--- a/two.txt
+++ b/two.txt
@@ -1,3 +1,3 @@
 line 1
-line 2
+line deux
 line 3
";

    #[test]
    fn test_strict_is_all_or_nothing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), numbered(3)).unwrap();
        std::fs::write(dir.path().join("two.txt"), "different\n").unwrap();

        let patch = parse_patch(TWO_FILES.as_bytes()).unwrap();
        let outcome = apply_to_tree(dir.path(), &patch, ApplyMode::Strict).unwrap();

        assert!(!outcome.is_complete());
        assert!(!outcome.written);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("one.txt")).unwrap(),
            numbered(3)
        );
    }

    #[test]
    fn test_tolerant_writes_partial_and_reject_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), numbered(3)).unwrap();
        std::fs::write(dir.path().join("two.txt"), "different\n").unwrap();

        let patch = parse_patch(TWO_FILES.as_bytes()).unwrap();
        let outcome =
            apply_to_tree(dir.path(), &patch, ApplyMode::Tolerant { max_fuzz: 2 }).unwrap();

        assert_eq!(outcome.placed, 1);
        assert_eq!(outcome.rejected, 1);
        assert!(outcome.summary().starts_with("1 of 2 hunk(s) rejected"));
        assert!(std::fs::read_to_string(dir.path().join("one.txt"))
            .unwrap()
            .contains("line two"));
        let rej = std::fs::read_to_string(dir.path().join("two.txt.rej")).unwrap();
        assert!(rej.starts_with("--- a/two.txt\n+++ b/two.txt\n@@ -1,3 +1,3 @@"));
        assert_eq!(outcome.reject_files, vec![dir.path().join("two.txt.rej")]);
    }

    #[test]
    fn test_create_delete_and_rename() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("gone.txt"), "bye\n").unwrap();
        std::fs::write(dir.path().join("old.txt"), "same\n").unwrap();

        let patch = "\
diff --git a/sub/new.txt b/sub/new.txt
new file mode 100644
--- /dev/null
+++ b/sub/new.txt
@@ -0,0 +1 @@
+hello
diff --git a/gone.txt b/gone.txt
deleted file mode 100644
--- a/gone.txt
+++ /dev/null
@@ -1 +0,0 @@
-bye
diff --git a/old.txt b/moved.txt
similarity index 100%
rename from old.txt
rename to moved.txt
";
        let parsed = parse_patch(patch.as_bytes()).unwrap();
        let outcome = apply_to_tree(dir.path(), &parsed, ApplyMode::Strict).unwrap();

        assert!(outcome.is_complete(), "{}", outcome.summary());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("sub/new.txt")).unwrap(),
            "hello\n"
        );
        assert!(!dir.path().join("gone.txt").exists());
        assert!(!dir.path().join("old.txt").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("moved.txt")).unwrap(),
            "same\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_modes_are_applied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("build.sh"), "make\n").unwrap();
        std::fs::write(dir.path().join("tool.py"), "print()\n").unwrap();
        std::fs::set_permissions(
            dir.path().join("tool.py"),
            std::fs::Permissions::from_mode(0o755),
        )
        .unwrap();

        let patch = "\
diff --git a/run.sh b/run.sh
new file mode 100755
--- /dev/null
+++ b/run.sh
@@ -0,0 +1 @@
+#!/bin/sh
diff --git a/build.sh b/build.sh
old mode 100644
new mode 100755
diff --git a/tool.py b/tool.py
old mode 100755
new mode 100644
";
        let parsed = parse_patch(patch.as_bytes()).unwrap();
        let outcome = apply_to_tree(dir.path(), &parsed, ApplyMode::Strict).unwrap();
        assert!(outcome.is_complete(), "{}", outcome.summary());

        let mode = |name: &str| {
            std::fs::metadata(dir.path().join(name))
                .unwrap()
                .permissions()
                .mode()
                & 0o111
        };
        assert_ne!(mode("run.sh"), 0);
        assert_ne!(mode("build.sh"), 0);
        assert_eq!(mode("tool.py"), 0);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("build.sh")).unwrap(),
            "make\n"
        );
    }

    #[test]
    fn test_missing_file_and_unsafe_path_are_rejected() {
        let dir = tempdir().unwrap();
        let patch = "\
--- a/missing.txt
+++ b/missing.txt
@@ -1 +1 @@
-a
+b
--- a/../escape.txt
+++ b/../escape.txt
@@ -1 +1 @@
-a
+b
";
        let parsed = parse_patch(patch.as_bytes()).unwrap();
        let outcome =
            apply_to_tree(dir.path(), &parsed, ApplyMode::Tolerant { max_fuzz: 2 }).unwrap();
        assert_eq!(outcome.placed, 0);
        assert_eq!(outcome.rejected, 2);
        assert_eq!(
            outcome.files[1].reason.as_deref(),
            Some("path escapes the tree")
        );
    }
}
