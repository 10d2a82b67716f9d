//! Folds per-patch results into the run-level outcome.

use crate::domain::ApplicationResult;

/// Run-level summary of per-patch results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Names of failed patches, in patch order.
    pub failed_patches: Vec<String>,
    pub has_errors: bool,
}

pub fn aggregate(results: &[ApplicationResult]) -> Outcome {
    let failed_patches: Vec<String> = results
        .iter()
        .filter(|r| r.is_failed())
        .map(|r| r.patch_name.clone())
        .collect();
    Outcome {
        has_errors: !failed_patches.is_empty(),
        failed_patches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApplyStatus, TreeMarker};

    fn clean(name: &str) -> ApplicationResult {
        ApplicationResult::applied(
            name,
            "d",
            ApplyStatus::Clean,
            TreeMarker::new("a"),
            TreeMarker::new("b"),
            1,
        )
    }

    fn failed(name: &str) -> ApplicationResult {
        ApplicationResult::failed(name, "d", TreeMarker::new("a"), 1, "rejected")
    }

    #[test]
    fn test_no_failures() {
        let outcome = aggregate(&[clean("0001"), clean("0002")]);
        assert!(!outcome.has_errors);
        assert!(outcome.failed_patches.is_empty());
    }

    #[test]
    fn test_failures_keep_patch_order() {
        let outcome = aggregate(&[failed("0003"), clean("0001"), failed("0002")]);
        assert!(outcome.has_errors);
        assert_eq!(outcome.failed_patches, vec!["0003", "0002"]);
    }

    #[test]
    fn test_empty_results() {
        assert_eq!(aggregate(&[]), Outcome::default());
    }
}
