//! Hunk placement against in-memory file contents.
//!
//! Two modes mirror the two tiers of the migration engine:
//!
//! - [`ApplyMode::Strict`]: each hunk must match byte-for-byte at the line it
//!   records (shifted only by the size changes of earlier hunks in the file).
//! - [`ApplyMode::Tolerant`]: each hunk may move (searching outward from the
//!   expected line), may drop up to `max_fuzz` outer context lines, and may
//!   match with whitespace runs collapsed. Hunks that still cannot be placed
//!   are returned as rejects.

use super::parse::{Hunk, HunkLine};

/// How strictly hunks must match their recorded context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Strict,
    Tolerant { max_fuzz: usize },
}

/// A file's contents as lines without terminators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBuffer {
    pub lines: Vec<Vec<u8>>,
    /// Whether the last line ends with `\n`. Empty files count as terminated.
    pub trailing_newline: bool,
}

impl TextBuffer {
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            trailing_newline: true,
        }
    }

    pub fn from_bytes(content: &[u8]) -> Self {
        if content.is_empty() {
            return Self::empty();
        }
        let mut lines: Vec<Vec<u8>> = content
            .split(|b| *b == b'\n')
            .map(<[u8]>::to_vec)
            .collect();
        let trailing_newline = content.ends_with(b"\n");
        if trailing_newline {
            lines.pop();
        }
        Self {
            lines,
            trailing_newline,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.lines.join(&b'\n');
        if !self.lines.is_empty() && self.trailing_newline {
            out.push(b'\n');
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Where and how a hunk landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub hunk: usize,
    /// Zero-based line in the result where the hunk's output starts.
    pub line: usize,
    /// Distance from the expected line.
    pub offset: isize,
    /// Outer context lines ignored on each side.
    pub fuzz: usize,
    /// Matched only after collapsing whitespace.
    pub whitespace: bool,
}

impl Placement {
    /// True when the hunk did not land exactly as recorded.
    pub fn is_tolerant(&self) -> bool {
        self.offset != 0 || self.fuzz > 0 || self.whitespace
    }
}

/// Result of applying one file's hunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileApplication {
    pub buffer: TextBuffer,
    pub placements: Vec<Placement>,
    /// Indexes of hunks that could not be placed.
    pub rejects: Vec<usize>,
}

impl FileApplication {
    pub fn is_complete(&self) -> bool {
        self.rejects.is_empty()
    }
}

fn collapse_whitespace(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    let mut in_space = false;
    for &b in line {
        if b.is_ascii_whitespace() {
            in_space = true;
        } else {
            if in_space && !out.is_empty() {
                out.push(b' ');
            }
            in_space = false;
            out.push(b);
        }
    }
    out
}

fn lines_equal(a: &[u8], b: &[u8], loose: bool) -> bool {
    a == b || (loose && collapse_whitespace(a) == collapse_whitespace(b))
}

fn matches_at(lines: &[Vec<u8>], at: usize, pre: &[&[u8]], loose: bool) -> bool {
    at + pre.len() <= lines.len()
        && pre
            .iter()
            .zip(&lines[at..at + pre.len()])
            .all(|(want, have)| lines_equal(want, have, loose))
}

/// Candidate start lines, nearest to `expected` first, never before `floor`.
fn search_order(expected: usize, floor: usize, last: usize) -> impl Iterator<Item = usize> {
    let span = last.max(expected) + 1;
    (0..=span).flat_map(move |distance| {
        let after = expected.checked_add(distance);
        let before = if distance == 0 {
            None
        } else {
            expected.checked_sub(distance)
        };
        after.into_iter().chain(before)
    })
    .filter(move |&at| at >= floor && at <= last)
}

struct Candidate {
    line: usize,
    lead_trim: usize,
    trail_trim: usize,
    fuzz: usize,
    whitespace: bool,
}

fn locate(
    lines: &[Vec<u8>],
    hunk: &Hunk,
    expected: usize,
    floor: usize,
    mode: ApplyMode,
) -> Option<Candidate> {
    let pre = hunk.pre_image();

    let ApplyMode::Tolerant { max_fuzz } = mode else {
        let ends_ok = !hunk.old_no_newline || expected + pre.len() == lines.len();
        return (expected >= floor && ends_ok && matches_at(lines, expected, &pre, false)).then_some(
            Candidate {
                line: expected,
                lead_trim: 0,
                trail_trim: 0,
                fuzz: 0,
                whitespace: false,
            },
        );
    };

    let leading = hunk.leading_context();
    let trailing = hunk.trailing_context();

    for fuzz in 0..=max_fuzz {
        let lead_trim = fuzz.min(leading);
        let trail_trim = fuzz.min(trailing);
        if fuzz > 0 && lead_trim == 0 && trail_trim == 0 {
            // Nothing left to trim; a higher fuzz would retry the same shape.
            break;
        }
        if lead_trim + trail_trim >= pre.len() && !pre.is_empty() {
            break;
        }
        let window = &pre[lead_trim..pre.len() - trail_trim];
        if lines.len() < window.len() {
            continue;
        }
        let last = lines.len() - window.len();
        let want = expected + lead_trim;

        for loose in [false, true] {
            if let Some(line) = search_order(want, floor, last)
                .find(|&at| matches_at(lines, at, window, loose))
            {
                return Some(Candidate {
                    line,
                    lead_trim,
                    trail_trim,
                    fuzz,
                    whitespace: loose,
                });
            }
        }
    }
    None
}

/// Build a hunk's replacement text, keeping the target's own context lines.
fn replacement(
    hunk: &Hunk,
    region: &[Vec<u8>],
    lead_trim: usize,
    trail_trim: usize,
) -> Vec<Vec<u8>> {
    let (start, end) = trimmed_bounds(hunk, lead_trim, trail_trim);
    let mut out = Vec::new();
    let mut cursor = 0;
    for line in &hunk.lines[start..end] {
        match line {
            HunkLine::Context(_) => {
                out.push(region[cursor].clone());
                cursor += 1;
            }
            HunkLine::Remove(_) => cursor += 1,
            HunkLine::Add(text) => out.push(text.clone()),
        }
    }
    out
}

/// Bounds in `hunk.lines` after dropping trimmed context lines.
fn trimmed_bounds(hunk: &Hunk, lead_trim: usize, trail_trim: usize) -> (usize, usize) {
    (lead_trim, hunk.lines.len() - trail_trim)
}

/// Apply `hunks` to `original` in order.
///
/// Hunks never overlap: each one is placed after the previous placed hunk's
/// output. Expected positions follow the running size delta and the offset
/// of the previous placement, so a block that moved as a whole is found
/// immediately.
pub fn apply_hunks(original: &TextBuffer, hunks: &[Hunk], mode: ApplyMode) -> FileApplication {
    let mut buffer = original.clone();
    let mut placements = Vec::new();
    let mut rejects = Vec::new();
    let mut drift: isize = 0;
    let mut floor = 0usize;

    for (index, hunk) in hunks.iter().enumerate() {
        let expected = (hunk.old_index() as isize + drift).max(0) as usize;
        let Some(found) = locate(&buffer.lines, hunk, expected, floor, mode) else {
            rejects.push(index);
            continue;
        };

        let pre_len = hunk.pre_image().len() - found.lead_trim - found.trail_trim;
        let region_end = found.line + pre_len;
        let touches_end = region_end == buffer.lines.len();
        let new_lines = replacement(
            hunk,
            &buffer.lines[found.line..region_end],
            found.lead_trim,
            found.trail_trim,
        );
        let new_len = new_lines.len();
        buffer.lines.splice(found.line..region_end, new_lines);

        if touches_end && found.trail_trim == 0 {
            buffer.trailing_newline = new_len == 0 || !hunk.new_no_newline;
        }

        let offset = found.line as isize - (expected + found.lead_trim) as isize;
        drift += offset + new_len as isize - pre_len as isize;
        floor = found.line + new_len;
        placements.push(Placement {
            hunk: index,
            line: found.line,
            offset,
            fuzz: found.fuzz,
            whitespace: found.whitespace,
        });
    }

    FileApplication {
        buffer,
        placements,
        rejects,
    }
}
