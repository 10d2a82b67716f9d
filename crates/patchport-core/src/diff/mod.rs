//! Unified diff handling: parsing, hunk placement, and tree application.

pub mod apply;
pub mod parse;
pub mod tree;

pub use apply::{apply_hunks, ApplyMode, FileApplication, Placement, TextBuffer};
pub use parse::{parse_patch, FileChange, FilePatch, Hunk, HunkLine, ParsedPatch};
pub use tree::{apply_to_tree, FileReport, TreeApplication, REJECT_SUFFIX};
