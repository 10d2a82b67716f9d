//! patchport - carry a kernel patch set forward to the next upstream release
//!
//! ## Commands
//!
//! - `run`: migrate the current patch set to the next release
//! - `next`: print the release following the current one
//! - `probe`: try a patch directory against an existing checkout

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use patchport_core::config::DEFAULT_UPSTREAM;
use patchport_core::{
    append_github_output, locate_current, probe, report_json, resolve_next, run_migration,
    write_outputs, ApplyStatus, GitUpstream, Identity, MigrateConfig, PatchSet, ProbeOutcome,
    VersionTag, DEFAULT_MAX_FUZZ,
};

#[derive(Parser)]
#[command(name = "patchport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Migrate a kernel patch set to the next upstream release", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct UpstreamArgs {
    /// Upstream release repository
    #[arg(long, env = "PATCHPORT_UPSTREAM", default_value = DEFAULT_UPSTREAM)]
    upstream: String,

    /// Prefix of upstream release tags
    #[arg(long, env = "PATCHPORT_TAG_PREFIX", default_value = "v")]
    tag_prefix: String,

    /// Seconds before an upstream listing or clone is abandoned
    #[arg(long, env = "PATCHPORT_CLONE_TIMEOUT", default_value = "1800")]
    clone_timeout: u64,
}

impl UpstreamArgs {
    fn upstream(&self) -> GitUpstream {
        GitUpstream::new(
            self.upstream.clone(),
            std::time::Duration::from_secs(self.clone_timeout),
        )
    }
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// Directory holding one patch directory per version
    #[arg(long, env = "PATCHPORT_PATCH_DIR", default_value = "patches")]
    patch_dir: PathBuf,

    /// Current version (default: highest version directory)
    #[arg(long)]
    current: Option<VersionTag>,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the current patch set to the next upstream release
    Run {
        #[command(flatten)]
        upstream: UpstreamArgs,

        #[command(flatten)]
        patches: PatchArgs,

        /// Repository the patch directory lives in
        #[arg(long, env = "PATCHPORT_REPO", default_value = ".")]
        repo: PathBuf,

        /// Prefix of the update branch
        #[arg(long, env = "PATCHPORT_BRANCH_PREFIX", default_value = "update/")]
        branch_prefix: String,

        /// Remote checked for an existing update branch
        #[arg(long, default_value = "origin")]
        remote: String,

        /// Only check local branches
        #[arg(long)]
        no_remote: bool,

        /// Outer context lines tolerant application may ignore
        #[arg(long, env = "PATCHPORT_MAX_FUZZ", default_value_t = DEFAULT_MAX_FUZZ)]
        max_fuzz: usize,

        /// Symlink unchanged patches instead of copying them
        #[arg(long)]
        link_unchanged: bool,

        /// Commit the new patch directory on the update branch
        #[arg(long)]
        commit: bool,

        #[command(flatten)]
        committer: CommitterArgs,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// File to append key=value outputs to
        #[arg(long, env = "GITHUB_OUTPUT")]
        github_output: Option<PathBuf>,
    },

    /// Print the upstream release following the current one
    Next {
        #[command(flatten)]
        upstream: UpstreamArgs,

        #[command(flatten)]
        patches: PatchArgs,
    },

    /// Apply a patch directory to a private clone of an existing checkout
    Probe {
        /// Git checkout to apply against (left untouched)
        #[arg(long)]
        tree: PathBuf,

        /// Directory of patches to apply in name order
        #[arg(long)]
        patches: PathBuf,

        /// Outer context lines tolerant application may ignore
        #[arg(long, env = "PATCHPORT_MAX_FUZZ", default_value_t = DEFAULT_MAX_FUZZ)]
        max_fuzz: usize,

        /// Write regenerated patches here
        #[arg(long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        committer: CommitterArgs,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct CommitterArgs {
    /// Committer name for scratch commits
    #[arg(long, default_value = "patchport")]
    committer_name: String,

    /// Committer email for scratch commits
    #[arg(long, default_value = "patchport@localhost")]
    committer_email: String,
}

impl CommitterArgs {
    fn identity(&self) -> Identity {
        Identity {
            name: self.committer_name.clone(),
            email: self.committer_email.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    patchport_core::telemetry::init_tracing(cli.json_logs, level);

    match cli.command {
        Commands::Run {
            upstream,
            patches,
            repo,
            branch_prefix,
            remote,
            no_remote,
            max_fuzz,
            link_unchanged,
            commit,
            committer,
            json,
            github_output,
        } => {
            let config = MigrateConfig {
                upstream_url: upstream.upstream.clone(),
                patch_root: patches.patch_dir,
                repo_dir: repo,
                tag_prefix: upstream.tag_prefix.clone(),
                branch_prefix,
                remote: (!no_remote).then_some(remote),
                current: patches.current,
                max_fuzz,
                clone_timeout_secs: upstream.clone_timeout,
                link_unchanged,
                commit,
                identity: committer.identity(),
            };
            cmd_run(&config, &upstream.upstream(), json, github_output.as_deref()).await
        }
        Commands::Next { upstream, patches } => cmd_next(&upstream, &patches).await,
        Commands::Probe {
            tree,
            patches,
            max_fuzz,
            out,
            committer,
            json,
        } => cmd_probe(tree, patches, max_fuzz, committer.identity(), out, json).await,
    }
}

/// Full migration; per-patch failures still exit 0.
async fn cmd_run(
    config: &MigrateConfig,
    upstream: &GitUpstream,
    json: bool,
    github_output: Option<&Path>,
) -> Result<()> {
    let report = run_migration(config, upstream)
        .await
        .context("Migration failed")?;

    if json {
        println!("{}", report_json(&report)?);
    } else {
        write_outputs(&report, std::io::stdout().lock())?;
    }

    if let Some(path) = github_output {
        append_github_output(&report, path)
            .with_context(|| format!("Failed to append outputs to {:?}", path))?;
        info!(path = %path.display(), "orchestrator outputs written");
    }

    Ok(())
}

async fn cmd_next(upstream_args: &UpstreamArgs, patches: &PatchArgs) -> Result<()> {
    let config = MigrateConfig {
        patch_root: patches.patch_dir.clone(),
        current: patches.current,
        ..MigrateConfig::default()
    };
    let (current, _) = locate_current(&config).context("Cannot determine current version")?;

    let next = resolve_next(&upstream_args.upstream(), current, &upstream_args.tag_prefix)
        .await
        .context("Failed to list upstream tags")?;

    match next {
        Some(next) => println!("{}", next.tag_name(&upstream_args.tag_prefix)),
        None => println!("none"),
    }
    Ok(())
}

async fn cmd_probe(
    tree: PathBuf,
    patches: PathBuf,
    max_fuzz: usize,
    identity: Identity,
    out: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    if !patchport_core::is_git_repo(&tree) {
        anyhow::bail!("Not a git checkout: {:?}", tree);
    }
    let version = patches
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.parse().ok())
        .unwrap_or(VersionTag::new(0, 0));
    let set = PatchSet::load(&patches, version)
        .with_context(|| format!("Failed to load patches from {:?}", patches))?;

    let outcome: ProbeOutcome =
        tokio::task::spawn_blocking(move || probe(&tree, &set, max_fuzz, identity))
            .await
            .context("Probe task panicked")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.results)?);
    } else {
        println!("base {}", outcome.base);
        for result in &outcome.results {
            let detail = result.detail.as_deref().unwrap_or("");
            println!("{:<6} {} {}", result.status.as_str(), result.patch_name, detail);
        }
        let failed = outcome
            .results
            .iter()
            .filter(|r| r.status == ApplyStatus::Failed)
            .count();
        println!(
            "{} patch(es), {} regenerated, {} failed",
            outcome.results.len(),
            outcome.regenerated.len(),
            failed
        );
    }

    if let Some(dir) = out {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;
        for patch in &outcome.regenerated {
            let path = dir.join(&patch.patch_name);
            std::fs::write(&path, &patch.content)
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
        info!(dir = %dir.display(), count = outcome.regenerated.len(), "regenerated patches written");
    }

    Ok(())
}
