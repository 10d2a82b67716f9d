//! Error taxonomy for patchport.
//!
//! Every variant here aborts a run. Patches that fail to apply are not
//! errors: they are recorded as `Failed` results and surface only in the
//! migration report.

use std::path::PathBuf;

/// Errors produced while migrating a patch set.
#[derive(Debug, thiserror::Error)]
pub enum PatchportError {
    #[error("no version directories found under {0}")]
    NoVersionDirs(PathBuf),

    #[error("no patches found in {0}")]
    EmptyPatchSet(PathBuf),

    #[error("target directory already exists: {0}")]
    TargetExists(PathBuf),

    #[error("invalid version `{0}`: expected <major>.<minor>")]
    InvalidVersion(String),

    #[error("patch parse error: {0}")]
    PatchParse(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("upstream error: {0}")]
    Remote(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("{operation} timed out after {secs} seconds")]
    Timeout { operation: String, secs: u64 },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The local environment is not in the expected state.
    Precondition,
    /// A prerequisite operation (tag listing, clone, git) failed.
    Infrastructure,
}

impl PatchportError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PatchportError::NoVersionDirs(_)
            | PatchportError::EmptyPatchSet(_)
            | PatchportError::TargetExists(_)
            | PatchportError::InvalidVersion(_) => ErrorClass::Precondition,
            PatchportError::PatchParse(_)
            | PatchportError::Git(_)
            | PatchportError::Remote(_)
            | PatchportError::Task(_)
            | PatchportError::Timeout { .. }
            | PatchportError::Json(_)
            | PatchportError::Io(_) => ErrorClass::Infrastructure,
        }
    }
}

/// Result type for patchport operations.
pub type Result<T> = std::result::Result<T, PatchportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_errors_display_path() {
        let err = PatchportError::TargetExists(PathBuf::from("patches/6.14"));
        assert!(err.to_string().contains("patches/6.14"));
        assert_eq!(err.class(), ErrorClass::Precondition);

        let err = PatchportError::EmptyPatchSet(PathBuf::from("patches/6.13"));
        assert!(err.to_string().contains("no patches"));
        assert_eq!(err.class(), ErrorClass::Precondition);
    }

    #[test]
    fn test_timeout_error_display() {
        let err = PatchportError::Timeout {
            operation: "git clone".to_string(),
            secs: 30,
        };
        assert_eq!(err.to_string(), "git clone timed out after 30 seconds");
        assert_eq!(err.class(), ErrorClass::Infrastructure);
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PatchportError = io.into();
        assert!(err.to_string().contains("io error"));
    }
}
