//! Patch application engine.
//!
//! Applies an ordered patch set to a scratch tree one patch at a time.
//! Application is cumulative: a patch that lands (clean or fuzzy) becomes
//! part of the base for the next one, a failed patch leaves the base as it
//! was. The base is threaded explicitly as a [`TreeMarker`].

use tracing::{debug, info, warn};

use crate::diff::{apply_to_tree, parse_patch, ApplyMode, ParsedPatch};
use crate::domain::{
    ApplicationResult, ApplyStatus, PatchFile, PatchSet, PatchState, Result, TreeMarker,
};
use crate::obs;
use crate::scratch::ScratchTree;

/// Default number of outer context lines tolerant mode may ignore.
pub const DEFAULT_MAX_FUZZ: usize = 2;

/// Drives patches through strict then tolerant application.
pub struct PatchEngine<'t, T: ScratchTree> {
    tree: &'t T,
    max_fuzz: usize,
}

impl<'t, T: ScratchTree> PatchEngine<'t, T> {
    pub fn new(tree: &'t T, max_fuzz: usize) -> Self {
        Self { tree, max_fuzz }
    }

    pub fn tree(&self) -> &'t T {
        self.tree
    }

    /// Apply every patch in order, starting from the tree's current HEAD.
    ///
    /// Failed patches are recorded and the run continues; only scratch tree
    /// errors abort.
    pub fn run(&self, set: &PatchSet) -> Result<Vec<ApplicationResult>> {
        let mut base = self.tree.head()?;
        let mut results = Vec::with_capacity(set.len());

        info!(
            version = %set.version,
            patches = set.len(),
            base = %base.short(),
            "applying patch set"
        );

        let mut states = vec![PatchState::NotAttempted; set.len()];
        for (index, patch) in set.patches.iter().enumerate() {
            let (result, next_base) = match self.step(&base, patch) {
                Ok(step) => step,
                Err(err) => {
                    let not_attempted = states
                        .iter()
                        .filter(|s| **s == PatchState::NotAttempted)
                        .count();
                    warn!(
                        patch = %patch.name,
                        not_attempted,
                        error = %err,
                        "patch run aborted"
                    );
                    return Err(err);
                }
            };
            states[index] = PatchState::Done(result.status);
            obs::emit_patch_attempted(&result);
            results.push(result);
            base = next_base;
        }

        Ok(results)
    }

    /// Apply one patch on top of `base`, returning its result and the base
    /// for the following patch.
    pub fn step(
        &self,
        base: &TreeMarker,
        patch: &PatchFile,
    ) -> Result<(ApplicationResult, TreeMarker)> {
        if self.tree.head()? != *base {
            debug!(base = %base.short(), "scratch tree not at base; restoring");
            self.tree.reset_to(base)?;
        }

        let result = match parse_patch(&patch.content) {
            Ok(parsed) => self.attempt(base, patch, &parsed)?,
            Err(err) => {
                warn!(patch = %patch.name, error = %err, "patch could not be parsed");
                ApplicationResult::failed(
                    &patch.name,
                    patch.digest(),
                    base.clone(),
                    0,
                    err.to_string(),
                )
            }
        };

        let next_base = result
            .result_marker
            .clone()
            .unwrap_or_else(|| base.clone());
        Ok((result, next_base))
    }

    fn attempt(
        &self,
        base: &TreeMarker,
        patch: &PatchFile,
        parsed: &ParsedPatch,
    ) -> Result<ApplicationResult> {
        let root = self.tree.root();

        let strict = apply_to_tree(root, parsed, ApplyMode::Strict)?;
        let (status, applied) = if strict.is_complete() {
            (ApplyStatus::Clean, strict)
        } else {
            debug!(
                patch = %patch.name,
                rejected = strict.rejected,
                "strict apply failed; retrying tolerant"
            );
            let tolerant = apply_to_tree(
                root,
                parsed,
                ApplyMode::Tolerant {
                    max_fuzz: self.max_fuzz,
                },
            )?;
            if !tolerant.is_complete() {
                self.tree.reset_to(base)?;
                return Ok(ApplicationResult::failed(
                    &patch.name,
                    patch.digest(),
                    base.clone(),
                    tolerant.rejected,
                    tolerant.summary(),
                ));
            }
            (ApplyStatus::Fuzzy, tolerant)
        };

        let message = parsed
            .commit_message()
            .unwrap_or_else(|| format!("Apply {}\n", patch.name));
        let result_marker = match self.tree.commit_all(&message, parsed.author.as_deref()) {
            Ok(marker) => marker,
            Err(err) => {
                // Leave the tree at base so the caller can still inspect it.
                self.tree.reset_to(base).ok();
                return Err(err);
            }
        };

        let result = ApplicationResult::applied(
            &patch.name,
            patch.digest(),
            status,
            base.clone(),
            result_marker,
            applied.placed,
        );
        Ok(match status {
            ApplyStatus::Fuzzy => result.with_detail(applied.summary()),
            _ => result,
        })
    }
}
