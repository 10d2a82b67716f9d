//! Domain models for patchport.
//!
//! - `VersionTag`: numeric `major.minor` upstream release identifier
//! - `PatchFile` / `PatchSet`: the patches carried for one release
//! - `ApplicationResult`: per-patch outcome with tree markers
//! - `MigrationReport`: the aggregate handed to the orchestrator

pub mod error;
pub mod outcome;
pub mod patch;
pub mod report;
pub mod version;

pub use error::{ErrorClass, PatchportError, Result};
pub use outcome::{ApplicationResult, ApplyStatus, PatchState, RegeneratedPatch, TreeMarker};
pub use patch::{PatchFile, PatchSet, PATCH_EXTENSIONS};
pub use report::{MigrationReport, UpdateMode, VersionSlot};
pub use version::VersionTag;
