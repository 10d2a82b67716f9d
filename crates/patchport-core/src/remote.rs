//! Upstream repository access: tag listing and shallow clones.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::{PatchportError, Result};

/// Default bound on a single upstream operation.
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(1800);

/// The upstream release repository.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Human-readable location, for logs.
    fn location(&self) -> &str;

    /// Raw `git ls-remote --tags` style listing.
    async fn list_tags(&self) -> Result<String>;

    /// Check out `tag` into `dest`, which must not exist yet.
    async fn clone_at(&self, tag: &str, dest: &Path) -> Result<()>;
}

/// [`Upstream`] reached through the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitUpstream {
    url: String,
    timeout: Duration,
}

impl GitUpstream {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    /// Run git with the configured bound; the child is killed if it expires.
    async fn run_bounded(&self, operation: &str, args: &[&str]) -> Result<String> {
        let start = Instant::now();
        let child = Command::new("git")
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PatchportError::Remote(format!("failed to run git: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PatchportError::Timeout {
                operation: operation.to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| PatchportError::Remote(format!("{operation} failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PatchportError::Remote(format!(
                "{operation} failed: {}",
                stderr.trim()
            )));
        }

        debug!(
            operation,
            duration_ms = start.elapsed().as_millis() as u64,
            "upstream operation finished"
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Upstream for GitUpstream {
    fn location(&self) -> &str {
        &self.url
    }

    async fn list_tags(&self) -> Result<String> {
        self.run_bounded("git ls-remote", &["ls-remote", "--tags", &self.url])
            .await
    }

    async fn clone_at(&self, tag: &str, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy();
        info!(url = %self.url, tag, "cloning upstream");
        self.run_bounded(
            "git clone",
            &[
                "-c",
                "advice.detachedHead=false",
                "clone",
                "--quiet",
                "--depth",
                "1",
                "--branch",
                tag,
                &self.url,
                &dest,
            ],
        )
        .await?;
        Ok(())
    }
}
