//! Scratch working tree the engine applies patches in.
//!
//! Every state the engine cares about is a commit, so a [`TreeMarker`] is a
//! commit id and restoring a state is a hard reset plus a clean.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::domain::{Result, TreeMarker};
use crate::git::{capture_head_sha, run_git, run_git_as, Identity};

/// Operations the engine and the regenerator need from a scratch tree.
pub trait ScratchTree {
    /// Working directory patches are applied in.
    fn root(&self) -> &Path;

    /// Marker of the current committed state.
    fn head(&self) -> Result<TreeMarker>;

    /// Stage every change, including added and deleted files, and commit it.
    /// Paths matched by `.gitignore` are staged too.
    ///
    /// `author` overrides the commit author (`Name <email>`); the committer is
    /// always the configured identity.
    fn commit_all(&self, message: &str, author: Option<&str>) -> Result<TreeMarker>;

    /// Restore `marker` exactly, removing untracked files such as rejects.
    fn reset_to(&self, marker: &TreeMarker) -> Result<()>;

    /// Mail-format patch for the commit range `base..result`, byte for byte.
    fn export_patch(&self, base: &TreeMarker, result: &TreeMarker) -> Result<Vec<u8>>;
}

/// [`ScratchTree`] over a git work tree.
#[derive(Debug, Clone)]
pub struct GitScratchTree {
    root: PathBuf,
    identity: Identity,
}

impl GitScratchTree {
    pub fn new(root: impl Into<PathBuf>, identity: Identity) -> Self {
        Self {
            root: root.into(),
            identity,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// `git commit --author` needs `Name <email>`; anything else is dropped.
fn usable_author(author: Option<&str>) -> Option<&str> {
    let author = author?.trim();
    let open = author.find('<')?;
    let close = author.rfind('>')?;
    (open > 0 && close > open + 1 && !author.contains("=?")).then_some(author)
}

impl ScratchTree for GitScratchTree {
    fn root(&self) -> &Path {
        &self.root
    }

    fn head(&self) -> Result<TreeMarker> {
        capture_head_sha(&self.root).map(TreeMarker::new)
    }

    fn commit_all(&self, message: &str, author: Option<&str>) -> Result<TreeMarker> {
        run_git(&self.root, ["add", "-A", "--force"])?;

        let mut args = vec![
            "commit".to_string(),
            "-q".to_string(),
            "--allow-empty".to_string(),
            "--no-verify".to_string(),
            "-m".to_string(),
            message.to_string(),
        ];
        if let Some(author) = usable_author(author) {
            args.push(format!("--author={author}"));
        }
        run_git_as(&self.root, &self.identity, &args)?;

        let marker = self.head()?;
        debug!(marker = %marker.short(), "committed scratch tree state");
        Ok(marker)
    }

    fn reset_to(&self, marker: &TreeMarker) -> Result<()> {
        run_git(&self.root, ["reset", "-q", "--hard", marker.as_str()])?;
        run_git(&self.root, ["clean", "-fdxq"])?;
        debug!(marker = %marker.short(), "scratch tree restored");
        Ok(())
    }

    fn export_patch(&self, base: &TreeMarker, result: &TreeMarker) -> Result<Vec<u8>> {
        let range = format!("{}..{}", base.as_str(), result.as_str());
        run_git_as(
            &self.root,
            &self.identity,
            [
                "format-patch",
                "--stdout",
                "--no-signature",
                "--zero-commit",
                "--no-stat",
                &range,
            ],
        )
    }
}

/// A temporary checkout owning its directory; removed on drop.
#[derive(Debug)]
pub struct ScratchCheckout {
    dir: TempDir,
    tree: GitScratchTree,
}

impl ScratchCheckout {
    /// Directory name of the work tree inside the temporary directory.
    const SOURCE: &'static str = "source";

    pub fn new(identity: Identity) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("patchport-").tempdir()?;
        let tree = GitScratchTree::new(dir.path().join(Self::SOURCE), identity);
        Ok(Self { dir, tree })
    }

    /// Where the upstream clone goes; does not exist until cloned.
    pub fn source_dir(&self) -> &Path {
        self.tree.root()
    }

    pub fn tree(&self) -> &GitScratchTree {
        &self.tree
    }

    /// Temporary directory holding the checkout.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{make_git_repo, run_git as git};

    fn tree_with_file() -> (TempDir, GitScratchTree) {
        let repo = make_git_repo();
        std::fs::write(repo.path().join("a.txt"), "one\n").unwrap();
        git(repo.path(), &["add", "a.txt"]);
        git(repo.path(), &["commit", "-q", "-m", "add a"]);
        let tree = GitScratchTree::new(repo.path(), Identity::default());
        (repo, tree)
    }

    #[test]
    fn commit_all_includes_new_and_deleted_files() {
        let (_repo, tree) = tree_with_file();
        let base = tree.head().unwrap();

        std::fs::remove_file(tree.root().join("a.txt")).unwrap();
        std::fs::write(tree.root().join("b.txt"), "two\n").unwrap();
        let next = tree.commit_all("swap files", None).unwrap();

        assert_ne!(base, next);
        let status = run_git(tree.root(), ["status", "--porcelain"]).unwrap();
        assert!(status.is_empty(), "tree should be clean: {status}");
        let files = run_git(tree.root(), ["ls-files"]).unwrap();
        assert_eq!(files, "b.txt");
    }

    #[test]
    fn commit_all_includes_ignored_files() {
        let (_repo, tree) = tree_with_file();
        std::fs::write(tree.root().join(".gitignore"), "*.gen\n").unwrap();
        tree.commit_all("ignore generated files", None).unwrap();

        std::fs::write(tree.root().join("tables.gen"), "generated\n").unwrap();
        let next = tree.commit_all("add tables", None).unwrap();

        let files =
            run_git(tree.root(), ["ls-tree", "-r", "--name-only", next.as_str()]).unwrap();
        assert_eq!(files, ".gitignore\na.txt\ntables.gen");
    }

    #[test]
    fn commit_all_uses_author_when_well_formed() {
        let (_repo, tree) = tree_with_file();
        std::fs::write(tree.root().join("a.txt"), "changed\n").unwrap();
        tree.commit_all("change a", Some("Jane Doe <jane@example.org>"))
            .unwrap();

        let who = run_git(tree.root(), ["log", "-1", "--format=%an <%ae>|%cn"]).unwrap();
        assert_eq!(who, "Jane Doe <jane@example.org>|patchport");
    }

    #[test]
    fn reset_to_removes_untracked_artifacts() {
        let (_repo, tree) = tree_with_file();
        let base = tree.head().unwrap();

        std::fs::write(tree.root().join("a.txt"), "garbage\n").unwrap();
        std::fs::write(tree.root().join("a.txt.rej"), "@@ -1 +1 @@\n").unwrap();
        std::fs::create_dir_all(tree.root().join("new/dir")).unwrap();
        std::fs::write(tree.root().join("new/dir/c.txt"), "x").unwrap();

        tree.reset_to(&base).unwrap();

        assert_eq!(std::fs::read_to_string(tree.root().join("a.txt")).unwrap(), "one\n");
        assert!(!tree.root().join("a.txt.rej").exists());
        assert!(!tree.root().join("new").exists());
        assert_eq!(tree.head().unwrap(), base);
    }

    #[test]
    fn export_patch_produces_mail_format() {
        let (_repo, tree) = tree_with_file();
        let base = tree.head().unwrap();
        std::fs::write(tree.root().join("a.txt"), "one\nmore\n").unwrap();
        let result = tree.commit_all("extend a", None).unwrap();

        let patch = String::from_utf8(tree.export_patch(&base, &result).unwrap()).unwrap();
        assert!(patch.starts_with("From 0000000000000000000000000000000000000000"));
        assert!(patch.contains("Subject: [PATCH] extend a"));
        assert!(patch.contains("+more"));
    }

    #[test]
    fn usable_author_rejects_malformed_values() {
        assert_eq!(usable_author(Some("A B <a@b>")), Some("A B <a@b>"));
        assert_eq!(usable_author(Some("no email")), None);
        assert_eq!(usable_author(Some("<a@b>")), None);
        assert_eq!(usable_author(Some("=?UTF-8?q?J=C3=B6rg?= <j@x>")), None);
        assert_eq!(usable_author(None), None);
    }

    #[test]
    fn checkout_directory_removed_on_drop() {
        let checkout = ScratchCheckout::new(Identity::default()).unwrap();
        let path = checkout.path().to_path_buf();
        assert!(path.exists());
        assert!(!checkout.source_dir().exists());
        drop(checkout);
        assert!(!path.exists());
    }
}
