//! patchport core library
//!
//! Migrates a kernel patch set from one upstream release to the next:
//! resolves the next release, re-applies every patch in a scratch clone,
//! regenerates patches that needed drift correction and lays out the new
//! patch directory.

pub mod aggregate;
pub mod config;
pub mod diff;
pub mod domain;
pub mod engine;
pub mod git;
pub mod layout;
pub mod obs;
pub mod output;
pub mod regen;
pub mod remote;
pub mod resolver;
pub mod scratch;
pub mod telemetry;
pub mod workflow;

pub use domain::{
    ApplicationResult, ApplyStatus, ErrorClass, MigrationReport, PatchFile, PatchSet,
    PatchState, PatchportError, RegeneratedPatch, Result, TreeMarker, UpdateMode, VersionSlot,
    VersionTag,
};

pub use aggregate::{aggregate, Outcome};
pub use config::MigrateConfig;
pub use diff::{apply_to_tree, parse_patch, ApplyMode, ParsedPatch, TreeApplication};
pub use engine::{PatchEngine, DEFAULT_MAX_FUZZ};
pub use git::{capture_head_sha, is_git_repo, Identity};
pub use layout::{discover_current, prepare_next_dir, write_patch_set};
pub use output::{append_github_output, report_json, write_outputs};
pub use regen::regenerate;
pub use remote::{GitUpstream, Upstream};
pub use resolver::{next_version, parse_remote_tags, sort_versions};
pub use scratch::{GitScratchTree, ScratchCheckout, ScratchTree};
pub use workflow::{locate_current, probe, resolve_next, run_migration, ProbeOutcome};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
