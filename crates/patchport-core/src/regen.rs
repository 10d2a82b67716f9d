//! Regenerates patches whose application needed drift correction.

use tracing::{debug, info};

use crate::domain::{ApplicationResult, ApplyStatus, RegeneratedPatch, Result};
use crate::scratch::ScratchTree;

/// Export `base..result` for every fuzzy result, in patch order.
///
/// The exported patch applies strictly to the same base and reproduces the
/// result tree. Clean and failed results produce nothing.
pub fn regenerate<T: ScratchTree>(
    tree: &T,
    results: &[ApplicationResult],
) -> Result<Vec<RegeneratedPatch>> {
    let mut regenerated = Vec::new();

    for result in results.iter().filter(|r| r.status == ApplyStatus::Fuzzy) {
        let Some(result_marker) = &result.result_marker else {
            continue;
        };
        let content = tree.export_patch(&result.base_marker, result_marker)?;
        debug!(
            patch = %result.patch_name,
            bytes = content.len(),
            "patch regenerated"
        );
        regenerated.push(RegeneratedPatch {
            patch_name: result.patch_name.clone(),
            content,
        });
    }

    info!(regenerated = regenerated.len(), "regeneration complete");
    Ok(regenerated)
}
