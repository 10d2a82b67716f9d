//! Git integration utilities driven through the `git` CLI.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{PatchportError, Result};

/// Name and email used for commits patchport creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "patchport".to_string(),
            email: "patchport@localhost".to_string(),
        }
    }
}

impl Identity {
    /// `-c` overrides so commits work in repos without user config.
    fn config_args(&self) -> [String; 6] {
        [
            "-c".to_string(),
            format!("user.name={}", self.name),
            "-c".to_string(),
            format!("user.email={}", self.email),
            "-c".to_string(),
            "commit.gpgsign=false".to_string(),
        ]
    }
}

/// Run `git <args>` in `repo_dir`, returning trimmed stdout.
pub fn run_git<I, S>(repo_dir: &Path, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let stdout = run_git_bytes(repo_dir, args)?;
    Ok(String::from_utf8_lossy(&stdout).trim_end().to_string())
}

/// Run `git <args>` in `repo_dir`, returning stdout byte for byte.
pub fn run_git_bytes<I, S>(repo_dir: &Path, args: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
    let output = Command::new("git")
        .args(&args)
        .current_dir(repo_dir)
        .output()
        .map_err(|e| PatchportError::Git(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let shown: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
        return Err(PatchportError::Git(format!(
            "git {} failed: {}",
            shown.join(" "),
            stderr.trim()
        )));
    }

    debug!(dir = %repo_dir.display(), "git command succeeded");
    Ok(output.stdout)
}

/// Like [`run_git_bytes`], with the commit identity applied.
pub fn run_git_as<I, S>(repo_dir: &Path, identity: &Identity, args: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut full: Vec<OsString> =
        identity.config_args().iter().map(Into::into).collect();
    full.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
    run_git_bytes(repo_dir, full)
}

/// Capture the HEAD commit SHA from a git repository.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let sha = run_git(repo_dir, ["rev-parse", "HEAD"])?;
    if sha.is_empty() {
        return Err(PatchportError::Git(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Whether `branch` exists locally, or on `remote` when one is given.
pub fn branch_exists(repo_dir: &Path, branch: &str, remote: Option<&str>) -> Result<bool> {
    let local = Command::new("git")
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("refs/heads/{branch}"))
        .current_dir(repo_dir)
        .output()
        .map_err(|e| PatchportError::Git(format!("failed to run git: {e}")))?;
    if local.status.success() {
        return Ok(true);
    }

    let Some(remote) = remote else {
        return Ok(false);
    };
    let remotes = run_git(repo_dir, ["remote"])?;
    if !remotes.lines().any(|r| r.trim() == remote) {
        debug!(remote, "remote not configured; checked local branches only");
        return Ok(false);
    }
    let heads = run_git(
        repo_dir,
        ["ls-remote", "--heads", remote, &format!("refs/heads/{branch}")],
    )?;
    Ok(!heads.trim().is_empty())
}

/// Whether the work tree has no staged, unstaged or untracked changes.
pub fn is_clean(repo_dir: &Path) -> Result<bool> {
    Ok(run_git(repo_dir, ["status", "--porcelain"])?.is_empty())
}

/// Clone the local repository at `src` into `dest`, detached at `src`'s HEAD.
pub fn clone_local(src: &Path, dest: &Path) -> Result<String> {
    let head = capture_head_sha(src)?;
    run_git(
        src,
        [
            OsStr::new("clone"),
            OsStr::new("-q"),
            OsStr::new("--no-checkout"),
            OsStr::new("."),
            dest.as_os_str(),
        ],
    )?;
    run_git(dest, ["checkout", "-q", "--detach", &head])?;
    Ok(head)
}

/// Create `branch` at HEAD, stage `path` and commit it there.
///
/// Returns the new commit SHA.
pub fn commit_on_new_branch(
    repo_dir: &Path,
    identity: &Identity,
    branch: &str,
    path: &Path,
    message: &str,
) -> Result<String> {
    run_git(repo_dir, ["checkout", "-q", "-b", branch])?;
    run_git(repo_dir, [OsStr::new("add"), OsStr::new("--"), path.as_os_str()])?;
    run_git_as(repo_dir, identity, ["commit", "-q", "--no-verify", "-m", message])?;
    capture_head_sha(repo_dir)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::process::Command as StdCommand;

    pub fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    pub fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "initial"]);
        dir
    }
}
