//! Shared helpers for integration tests: throwaway git repositories.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

pub fn git(repo_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
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
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

pub fn make_git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-q"]);
    git(dir.path(), &["config", "user.name", "test-user"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "initial"]);
    dir
}

/// Write `files` (creating parent directories) and commit them.
pub fn commit_files(repo_dir: &Path, files: &[(&str, &str)], message: &str) -> String {
    for (path, content) in files {
        let full = repo_dir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }
    git(repo_dir, &["add", "-A"]);
    git(repo_dir, &["commit", "-q", "-m", message]);
    git(repo_dir, &["rev-parse", "HEAD"])
}

pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

pub const README: &str = "Linux kernel\n\nThis is the README.\n";

pub const FOO_6_13: &str = "int a;\nint b;\nint c;\nint d;\nint e;\n";

/// 6.14 grew two lines above the code the patches touch.
pub const FOO_6_14: &str = "/* SPDX-License-Identifier: GPL-2.0 */\n#include <foo.h>\nint a;\nint b;\nint c;\nint d;\nint e;\n";

/// Applies unchanged to 6.14.
pub const PATCH_README: &str = "\
From: Jane Doe <jane@example.org>
Subject: [PATCH 1/3] README: note downstream changes

Mention that this tree carries patches.
---
 README | 1 +
 1 file changed, 1 insertion(+)

diff --git a/README b/README
--- a/README
+++ b/README
@@ -1,3 +1,4 @@
 Linux kernel
 
 This is the README.
+Carried downstream.
";

/// Written against 6.13; lands two lines lower in 6.14.
pub const PATCH_FOO: &str = "\
From: Jane Doe <jane@example.org>
Subject: [PATCH 2/3] foo: initialise b

---
diff --git a/drivers/foo.c b/drivers/foo.c
--- a/drivers/foo.c
+++ b/drivers/foo.c
@@ -1,3 +1,3 @@
 int a;
-int b;
+int b = 1;
 int c;
";

/// Touches a file 6.14 no longer has.
pub const PATCH_BAR: &str = "\
Subject: [PATCH 3/3] bar: fix typo

---
diff --git a/drivers/bar.c b/drivers/bar.c
--- a/drivers/bar.c
+++ b/drivers/bar.c
@@ -1,2 +1,2 @@
 int bar;
-int typo;
+int fixed;
";

/// Upstream repository tagged v6.13, v6.14-rc1 and v6.14.
pub fn make_upstream() -> tempfile::TempDir {
    let repo = make_git_repo();
    commit_files(
        repo.path(),
        &[
            ("README", README),
            ("drivers/foo.c", FOO_6_13),
            ("drivers/bar.c", "int bar;\nint typo;\n"),
        ],
        "Linux 6.13",
    );
    git(repo.path(), &["tag", "v6.13"]);
    git(repo.path(), &["rm", "-q", "drivers/bar.c"]);
    commit_files(repo.path(), &[("drivers/foo.c", FOO_6_14)], "Linux 6.14-rc1");
    git(repo.path(), &["tag", "v6.14-rc1"]);
    commit_files(repo.path(), &[("Makefile", "VERSION = 6\n")], "Linux 6.14");
    git(repo.path(), &["tag", "-a", "v6.14", "-m", "Linux 6.14"]);
    repo
}

/// Patch root holding `6.13/` with the three patches above.
pub fn write_patch_root(root: &Path) {
    let dir = root.join("6.13");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("0001-readme.patch"), PATCH_README).unwrap();
    std::fs::write(dir.join("0002-foo.patch"), PATCH_FOO).unwrap();
    std::fs::write(dir.join("0003-bar.patch"), PATCH_BAR).unwrap();
}
