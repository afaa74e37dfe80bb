//! Unified-diff hunk parser.
//!
//! Features:
//! - Works when file headers (`diff --git`, `---`/`+++`) are missing
//!   (hunks-only input, as platform APIs return per-file patches).
//! - Ignores `\ No newline at end of file` marker lines.
//! - Tracks the hunk line counters so trailing junk after a hunk is not
//!   mistaken for content.
//! - Binary patch heuristics (`GIT binary patch`, `Binary files ... differ`).
//!
//! Unlike a best-effort parser, a header that cannot be read is an error:
//! silently guessing line numbers would anchor comments on the wrong lines.

use serde::{Deserialize, Serialize};

use crate::errors::DiffError;

/// One line inside a diff hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiffLine {
    Add { new_line: u32 },
    Del { old_line: u32 },
    Context { old_line: u32, new_line: u32 },
}

impl DiffLine {
    /// Line number in the new file, if the line exists there.
    pub fn new_line_number(&self) -> Option<u32> {
        match *self {
            DiffLine::Add { new_line } | DiffLine::Context { new_line, .. } => Some(new_line),
            DiffLine::Del { .. } => None,
        }
    }
}

/// A diff hunk (continuous block of changes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
}

/// Parses a unified diff string into hunks.
///
/// # Errors
/// [`DiffError::MalformedHunkHeader`] for an `@@` line that is not a valid
/// `@@ -a[,b] +c[,d] @@` header, [`DiffError::Overflow`] if a line counter
/// leaves `u32`.
pub fn parse_hunks(patch: &str) -> Result<Vec<DiffHunk>, DiffError> {
    let mut hunks: Vec<DiffHunk> = Vec::new();
    let mut cur: Option<DiffHunk> = None;
    let mut old_line = 0u32;
    let mut new_line = 0u32;
    let mut old_left = 0u32;
    let mut new_left = 0u32;

    for (idx, line) in patch.lines().enumerate() {
        let lineno = idx + 1;

        if line.starts_with("@@") {
            if let Some(h) = cur.take() {
                hunks.push(h);
            }
            let (os, ol, ns, nl) =
                parse_hunk_header(line).ok_or_else(|| DiffError::MalformedHunkHeader {
                    line: lineno,
                    header: line.to_string(),
                })?;
            old_line = os;
            new_line = ns;
            old_left = ol;
            new_left = nl;
            cur = Some(DiffHunk {
                old_start: os,
                old_lines: ol,
                new_start: ns,
                new_lines: nl,
                lines: Vec::new(),
            });
            continue;
        }

        // Not part of diff content.
        if line.starts_with("\\ ") {
            continue;
        }

        let Some(h) = cur.as_mut() else {
            // Prelude (headers) before the first '@@'.
            continue;
        };

        if old_left == 0 && new_left == 0 {
            // Hunk exhausted; anything until the next '@@' is not content.
            continue;
        }

        if line.starts_with('+') {
            h.lines.push(DiffLine::Add { new_line });
            new_line = bump(new_line, lineno)?;
            new_left = new_left.saturating_sub(1);
        } else if line.starts_with('-') {
            h.lines.push(DiffLine::Del { old_line });
            old_line = bump(old_line, lineno)?;
            old_left = old_left.saturating_sub(1);
        } else {
            // ' ' prefix, or an empty line whose space was stripped by a tool.
            h.lines.push(DiffLine::Context { old_line, new_line });
            old_line = bump(old_line, lineno)?;
            new_line = bump(new_line, lineno)?;
            old_left = old_left.saturating_sub(1);
            new_left = new_left.saturating_sub(1);
        }
    }

    if let Some(h) = cur.take() {
        hunks.push(h);
    }
    Ok(hunks)
}

fn bump(n: u32, lineno: usize) -> Result<u32, DiffError> {
    n.checked_add(1).ok_or(DiffError::Overflow(lineno))
}

/// Parses `@@ -12,7 +12,9 @@ optional section` into (old_start, old_len, new_start, new_len).
fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32)> {
    let rest = line.strip_prefix("@@ ")?;
    let end = rest.find(" @@")?;
    let (old, new) = rest[..end].trim().split_once(' ')?;
    let (os, ol) = parse_range(old.strip_prefix('-')?)?;
    let (ns, nl) = parse_range(new.trim().strip_prefix('+')?)?;
    Some((os, ol, ns, nl))
}

/// Splits "12,7" or "12" into (start, len). A missing length means 1.
fn parse_range(s: &str) -> Option<(u32, u32)> {
    match s.split_once(',') {
        Some((a, b)) => Some((a.parse().ok()?, b.parse().ok()?)),
        None => Some((s.parse().ok()?, 1)),
    }
}

/// Simple heuristic to detect binary patches or messages in unified diff.
pub fn looks_like_binary_patch(s: &str) -> bool {
    s.contains("GIT binary patch")
        || s.starts_with("Binary files ")
        || s.contains("\nBinary files ")
        || (s.starts_with("Files ") && s.contains(" differ"))
}
