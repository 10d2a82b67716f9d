//! Unified diff parsing.
//!
//! Accepts plain unified diffs, quilt-style patches with a free-form
//! description, and `git format-patch` mail output. Content is handled as
//! raw bytes so patches against non-UTF-8 files survive untouched.

use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::domain::{PatchportError, Result};

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@ ?(.*)$")
        .expect("hunk header pattern is valid")
});

static SUBJECT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\]]*\]\s*").expect("subject tag pattern is valid"));

/// One line of a hunk body, without its leading marker or newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(Vec<u8>),
    Remove(Vec<u8>),
    Add(Vec<u8>),
}

impl HunkLine {
    pub fn text(&self) -> &[u8] {
        match self {
            HunkLine::Context(t) | HunkLine::Remove(t) | HunkLine::Add(t) => t,
        }
    }

    fn marker(&self) -> u8 {
        match self {
            HunkLine::Context(_) => b' ',
            HunkLine::Remove(_) => b'-',
            HunkLine::Add(_) => b'+',
        }
    }

    pub fn is_context(&self) -> bool {
        matches!(self, HunkLine::Context(_))
    }
}

/// A single `@@` hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    /// Function context after the closing `@@`, if any.
    pub section: String,
    pub lines: Vec<HunkLine>,
    /// The last pre-image line has no trailing newline.
    pub old_no_newline: bool,
    /// The last post-image line has no trailing newline.
    pub new_no_newline: bool,
}

impl Hunk {
    /// Lines the hunk expects to find (context and removals).
    pub fn pre_image(&self) -> Vec<&[u8]> {
        self.lines
            .iter()
            .filter(|l| !matches!(l, HunkLine::Add(_)))
            .map(HunkLine::text)
            .collect()
    }

    /// Lines the hunk leaves behind (context and additions).
    pub fn post_image(&self) -> Vec<&[u8]> {
        self.lines
            .iter()
            .filter(|l| !matches!(l, HunkLine::Remove(_)))
            .map(HunkLine::text)
            .collect()
    }

    /// Number of context lines before the first change.
    pub fn leading_context(&self) -> usize {
        self.lines.iter().take_while(|l| l.is_context()).count()
    }

    /// Number of context lines after the last change.
    pub fn trailing_context(&self) -> usize {
        self.lines.iter().rev().take_while(|l| l.is_context()).count()
    }

    /// Zero-based line index in the original file where the pre-image starts.
    pub fn old_index(&self) -> usize {
        if self.old_len == 0 {
            self.old_start
        } else {
            self.old_start.saturating_sub(1)
        }
    }

    /// Render the hunk in unified format, as written to `.rej` files.
    pub fn render(&self) -> Vec<u8> {
        let mut out = format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_len, self.new_start, self.new_len
        )
        .into_bytes();
        if !self.section.is_empty() {
            out.push(b' ');
            out.extend_from_slice(self.section.as_bytes());
        }
        out.push(b'\n');

        let last_old = self.lines.iter().rposition(|l| !matches!(l, HunkLine::Add(_)));
        let last_new = self.lines.iter().rposition(|l| !matches!(l, HunkLine::Remove(_)));
        for (i, line) in self.lines.iter().enumerate() {
            out.push(line.marker());
            out.extend_from_slice(line.text());
            out.push(b'\n');
            let open_old = self.old_no_newline && Some(i) == last_old;
            let open_new = self.new_no_newline && Some(i) == last_new;
            if open_old || open_new {
                out.extend_from_slice(b"\\ No newline at end of file\n");
            }
        }
        out
    }
}

/// What a file section does to its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modify,
    Create,
    Delete,
    Rename { from: String },
}

/// All hunks touching one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// Path (prefix stripped) the patch applies to; for renames, the new path.
    pub path: String,
    pub change: FileChange,
    pub hunks: Vec<Hunk>,
    /// Git mode before the change (`old mode`, `deleted file mode`).
    pub old_mode: Option<u32>,
    /// Git mode after the change (`new mode`, `new file mode`).
    pub new_mode: Option<u32>,
}

impl FilePatch {
    /// Whether the file ends up executable, when the patch says.
    pub fn executable(&self) -> Option<bool> {
        self.new_mode.map(|mode| mode & 0o111 != 0)
    }
}

/// A parsed patch file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedPatch {
    /// Mail `From:` header, e.g. `Jane Doe <jane@example.org>`.
    pub author: Option<String>,
    /// Subject with any `[PATCH n/m]` tag removed.
    pub subject: Option<String>,
    /// Description between the headers and the `---` separator.
    pub body: Option<String>,
    pub files: Vec<FilePatch>,
}

impl ParsedPatch {
    pub fn hunk_count(&self) -> usize {
        self.files.iter().map(|f| f.hunks.len()).sum()
    }

    /// Commit message carried by the patch, if any.
    pub fn commit_message(&self) -> Option<String> {
        let subject = self.subject.as_deref()?.trim();
        if subject.is_empty() {
            return None;
        }
        match self.body.as_deref().map(str::trim) {
            Some(body) if !body.is_empty() => Some(format!("{subject}\n\n{body}\n")),
            _ => Some(format!("{subject}\n")),
        }
    }
}

fn split_lines(input: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = input.split(|b| *b == b'\n').collect();
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Strip the first path component (`-p1`) and any trailing timestamp.
fn header_path(raw: &[u8]) -> Option<String> {
    let raw = lossy(strip_cr(raw));
    let path = raw.split('\t').next().unwrap_or("").trim();
    let path = path.trim_matches('"');
    if path == "/dev/null" || path.is_empty() {
        return None;
    }
    Some(match path.split_once('/') {
        Some((_, rest)) if !rest.is_empty() => rest.to_string(),
        _ => path.to_string(),
    })
}

fn parse_mode(raw: &[u8]) -> Option<u32> {
    u32::from_str_radix(lossy(raw).trim(), 8).ok()
}

fn git_header_paths(line: &[u8]) -> Option<(String, String)> {
    let rest = lossy(line.strip_prefix(b"diff --git ")?);
    let rest = rest.trim_end_matches('\r');
    let (a, b) = rest.split_once(" b/")?;
    let a = a.strip_prefix("a/").unwrap_or(a);
    Some((a.to_string(), b.to_string()))
}

fn is_file_header_at(lines: &[&[u8]], i: usize) -> bool {
    let line = lines[i];
    line.starts_with(b"diff --git ")
        || (line.starts_with(b"--- ")
            && lines.get(i + 1).is_some_and(|next| next.starts_with(b"+++ ")))
}

/// Parse a patch. A patch without any file section is an error.
pub fn parse_patch(input: &[u8]) -> Result<ParsedPatch> {
    let lines = split_lines(input);
    let first_file = (0..lines.len()).find(|&i| is_file_header_at(&lines, i));
    let Some(first_file) = first_file else {
        return Err(PatchportError::PatchParse(
            "no file sections found".to_string(),
        ));
    };

    let mut patch = ParsedPatch::default();
    parse_preamble(&lines[..first_file], &mut patch);

    let mut i = first_file;
    while i < lines.len() {
        if is_file_header_at(&lines, i) {
            let (file, next) = parse_file_section(&lines, i)?;
            patch.files.push(file);
            i = next;
        } else {
            i += 1;
        }
    }

    Ok(patch)
}

fn parse_preamble(lines: &[&[u8]], patch: &mut ParsedPatch) {
    let lines: Vec<String> = lines.iter().map(|l| lossy(strip_cr(l))).collect();
    let is_mail = lines
        .iter()
        .take_while(|l| !l.is_empty())
        .any(|l| l.starts_with("Subject:"));

    let mut body_start = 0;
    if is_mail {
        let mut idx = 0;
        while idx < lines.len() && !lines[idx].is_empty() {
            let line = &lines[idx];
            if let Some(from) = line.strip_prefix("From:") {
                patch.author = Some(from.trim().to_string());
            } else if let Some(subject) = line.strip_prefix("Subject:") {
                let mut full = subject.trim().to_string();
                while idx + 1 < lines.len() && lines[idx + 1].starts_with(&[' ', '\t'][..]) {
                    idx += 1;
                    full.push(' ');
                    full.push_str(lines[idx].trim());
                }
                let stripped = SUBJECT_TAG.replace(full.as_bytes(), &b""[..]);
                patch.subject = Some(lossy(&stripped).trim().to_string());
            }
            idx += 1;
        }
        body_start = idx;
    } else if let Some(idx) = lines.iter().position(|l| !l.trim().is_empty()) {
        if lines[idx] != "---" {
            patch.subject = Some(lines[idx].trim().to_string());
            body_start = idx + 1;
        }
    }

    let body: Vec<&str> = lines[body_start.min(lines.len())..]
        .iter()
        .take_while(|l| l.as_str() != "---")
        .map(String::as_str)
        .collect();
    let body = body.join("\n").trim().to_string();
    if !body.is_empty() {
        patch.body = Some(body);
    }
}

fn parse_file_section(lines: &[&[u8]], start: usize) -> Result<(FilePatch, usize)> {
    let mut i = start;
    let mut change = FileChange::Modify;
    let mut git_paths = None;
    let mut rename_from = None;
    let mut rename_to = None;
    let mut old_mode = None;
    let mut new_mode = None;

    if lines[i].starts_with(b"diff --git ") {
        git_paths = git_header_paths(strip_cr(lines[i]));
        i += 1;
        while i < lines.len() && !lines[i].starts_with(b"--- ") && !lines[i].starts_with(b"@@") {
            let line = strip_cr(lines[i]);
            if line.starts_with(b"diff --git ") {
                break;
            }
            if let Some(mode) = line.strip_prefix(b"new file mode ") {
                change = FileChange::Create;
                new_mode = parse_mode(mode);
            } else if let Some(mode) = line.strip_prefix(b"deleted file mode ") {
                change = FileChange::Delete;
                old_mode = parse_mode(mode);
            } else if let Some(mode) = line.strip_prefix(b"old mode ") {
                old_mode = parse_mode(mode);
            } else if let Some(mode) = line.strip_prefix(b"new mode ") {
                new_mode = parse_mode(mode);
            } else if let Some(from) = line.strip_prefix(b"rename from ") {
                rename_from = Some(lossy(from));
            } else if let Some(to) = line.strip_prefix(b"rename to ") {
                rename_to = Some(lossy(to));
            } else if line.starts_with(b"GIT binary patch") || line.starts_with(b"Binary files ") {
                return Err(PatchportError::PatchParse(
                    "binary patches are not supported".to_string(),
                ));
            }
            i += 1;
        }
    }

    let mut old_path = git_paths.as_ref().map(|(a, _)| a.clone());
    let mut new_path = git_paths.as_ref().map(|(_, b)| b.clone());

    if i + 1 < lines.len() && lines[i].starts_with(b"--- ") && lines[i + 1].starts_with(b"+++ ") {
        let old = header_path(&lines[i][4..]);
        let new = header_path(&lines[i + 1][4..]);
        if old.is_none() && new.is_some() {
            change = FileChange::Create;
        } else if new.is_none() && old.is_some() {
            change = FileChange::Delete;
        }
        old_path = old.or(old_path);
        new_path = new.or(new_path);
        i += 2;
    }

    if let (Some(from), Some(to)) = (rename_from, rename_to) {
        old_path = Some(from.clone());
        new_path = Some(to);
        change = FileChange::Rename { from };
    }

    let path = match change {
        FileChange::Delete => old_path.or(new_path),
        _ => new_path.or(old_path),
    }
    .ok_or_else(|| PatchportError::PatchParse("file section without a path".to_string()))?;

    let mut hunks = Vec::new();
    while i < lines.len() && lines[i].starts_with(b"@@") {
        let (hunk, next) = parse_hunk(lines, i)?;
        hunks.push(hunk);
        i = next;
    }

    let file = FilePatch {
        path,
        change,
        hunks,
        old_mode,
        new_mode,
    };
    Ok((file, i))
}

fn parse_hunk(lines: &[&[u8]], start: usize) -> Result<(Hunk, usize)> {
    let header = strip_cr(lines[start]);
    let caps = HUNK_HEADER.captures(header).ok_or_else(|| {
        PatchportError::PatchParse(format!("malformed hunk header: {}", lossy(header)))
    })?;
    let number = |idx: usize, default: usize| -> Result<usize> {
        match caps.get(idx) {
            Some(m) => lossy(m.as_bytes())
                .parse()
                .map_err(|_| PatchportError::PatchParse(format!("bad number in {}", lossy(header)))),
            None => Ok(default),
        }
    };

    let mut hunk = Hunk {
        old_start: number(1, 0)?,
        old_len: number(2, 1)?,
        new_start: number(3, 0)?,
        new_len: number(4, 1)?,
        section: caps
            .get(5)
            .map(|m| lossy(m.as_bytes()).trim().to_string())
            .unwrap_or_default(),
        lines: Vec::new(),
        old_no_newline: false,
        new_no_newline: false,
    };

    let mut old_left = hunk.old_len;
    let mut new_left = hunk.new_len;
    let mut i = start + 1;
    while i < lines.len() && (old_left > 0 || new_left > 0) {
        let line = lines[i];
        match line.first() {
            Some(b' ') if old_left > 0 && new_left > 0 => {
                hunk.lines.push(HunkLine::Context(line[1..].to_vec()));
                old_left -= 1;
                new_left -= 1;
            }
            // Some mailers strip the lone space of an empty context line.
            None if old_left > 0 && new_left > 0 => {
                hunk.lines.push(HunkLine::Context(Vec::new()));
                old_left -= 1;
                new_left -= 1;
            }
            Some(b'-') if old_left > 0 => {
                hunk.lines.push(HunkLine::Remove(line[1..].to_vec()));
                old_left -= 1;
            }
            Some(b'+') if new_left > 0 => {
                hunk.lines.push(HunkLine::Add(line[1..].to_vec()));
                new_left -= 1;
            }
            Some(b'\\') => mark_no_newline(&mut hunk),
            _ => {
                return Err(PatchportError::PatchParse(format!(
                    "hunk @@ -{},{} @@ is truncated",
                    hunk.old_start, hunk.old_len
                )))
            }
        }
        i += 1;
    }

    if old_left > 0 || new_left > 0 {
        return Err(PatchportError::PatchParse(format!(
            "hunk @@ -{},{} @@ is truncated",
            hunk.old_start, hunk.old_len
        )));
    }

    while i < lines.len() && lines[i].starts_with(b"\\") {
        mark_no_newline(&mut hunk);
        i += 1;
    }

    Ok((hunk, i))
}

fn mark_no_newline(hunk: &mut Hunk) {
    match hunk.lines.last() {
        Some(HunkLine::Remove(_)) => hunk.old_no_newline = true,
        Some(HunkLine::Add(_)) => hunk.new_no_newline = true,
        Some(HunkLine::Context(_)) => {
            hunk.old_no_newline = true;
            hunk.new_no_newline = true;
        }
        None => {}
    }
}
