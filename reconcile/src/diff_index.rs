//! Per-file map of new-file line numbers that can carry an inline comment.
//!
//! Built once per diff file from its hunks. A line is valid when it exists in
//! the new file *and* is shown in the diff (added or context); everything
//! else cannot be anchored by the platforms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::DiffError;
use crate::parser::{DiffHunk, DiffLine, parse_hunks};

/// Validity info for one new-file line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInfo {
    pub valid: bool,
    /// Added by this diff (vs. pre-existing context).
    pub is_addition: bool,
}

/// `new_line -> LineInfo` for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffPositionIndex {
    lines: BTreeMap<u32, LineInfo>,
}

impl DiffPositionIndex {
    /// Index with no valid lines (malformed/binary patches, deleted files).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses `patch` and indexes its new-file lines.
    ///
    /// # Errors
    /// Propagates [`DiffError`] from the hunk parser; callers treat the file
    /// as having an empty index.
    pub fn build(patch: &str) -> Result<Self, DiffError> {
        let hunks = parse_hunks(patch)?;
        Ok(Self::from_hunks(&hunks))
    }

    pub fn from_hunks(hunks: &[DiffHunk]) -> Self {
        let mut lines = BTreeMap::new();
        for h in hunks {
            for l in &h.lines {
                let Some(n) = l.new_line_number() else {
                    continue;
                };
                let is_addition = matches!(l, DiffLine::Add { .. });
                // A line listed twice keeps its strongest classification.
                let entry = lines.entry(n).or_insert(LineInfo {
                    valid: true,
                    is_addition,
                });
                entry.is_addition |= is_addition;
            }
        }
        Self { lines }
    }

    pub fn lookup(&self, line: u32) -> Option<LineInfo> {
        self.lines.get(&line).copied()
    }

    pub fn is_valid(&self, line: u32) -> bool {
        self.lookup(line).is_some_and(|i| i.valid)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Nearest valid line within `±window` of `line`, excluding `line` itself.
    /// Ties prefer the lower line.
    pub fn nearest_valid_within(&self, line: u32, window: u32) -> Option<u32> {
        (1..=window).find_map(|d| {
            let below = line.checked_sub(d).filter(|&l| l > 0 && self.is_valid(l));
            below.or_else(|| line.checked_add(d).filter(|&l| self.is_valid(l)))
        })
    }

    /// Nearest added line anywhere in the file. Ties prefer the lower line.
    pub fn nearest_addition(&self, line: u32) -> Option<u32> {
        self.nearest_matching(line, |i| i.valid && i.is_addition)
    }

    /// Nearest valid line (added or context) anywhere in the file.
    pub fn nearest_valid(&self, line: u32) -> Option<u32> {
        self.nearest_matching(line, |i| i.valid)
    }

    fn nearest_matching(&self, line: u32, pred: impl Fn(&LineInfo) -> bool) -> Option<u32> {
        let below = self
            .lines
            .range(..=line)
            .rev()
            .find(|(_, i)| pred(i))
            .map(|(n, _)| *n);
        let above = self
            .lines
            .range(line..)
            .find(|(_, i)| pred(i))
            .map(|(n, _)| *n);
        match (below, above) {
            (Some(b), Some(a)) => Some(if line - b <= a - line { b } else { a }),
            (b, a) => b.or(a),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // new lines: 10 ctx, 11 add, 12 add, 13 ctx ; 40 add
    const PATCH: &str = "@@ -10,3 +10,4 @@\n a\n+b\n+c\n-d\n e\n@@ -38,0 +40,1 @@\n+z\n";

    #[test]
    fn indexes_additions_and_context() {
        let idx = DiffPositionIndex::build(PATCH).unwrap();
        assert_eq!(idx.len(), 5);
        assert_eq!(
            idx.lookup(10),
            Some(LineInfo {
                valid: true,
                is_addition: false
            })
        );
        assert!(idx.lookup(11).unwrap().is_addition);
        assert!(idx.lookup(14).is_none());
        assert!(!idx.is_valid(0));
    }

    #[test]
    fn window_search_prefers_lower_line_on_tie() {
        let idx = DiffPositionIndex::build("@@ -1,0 +5,1 @@\n+a\n@@ -2,0 +9,1 @@\n+b\n").unwrap();
        assert_eq!(idx.nearest_valid_within(7, 2), Some(5));
        assert_eq!(idx.nearest_valid_within(7, 1), None);
    }

    #[test]
    fn window_search_never_returns_line_zero() {
        let idx = DiffPositionIndex::build("@@ -1,0 +3,1 @@\n+a\n").unwrap();
        assert_eq!(idx.nearest_valid_within(1, 3), Some(3));
    }

    #[test]
    fn nearest_addition_skips_context() {
        let idx = DiffPositionIndex::build(PATCH).unwrap();
        assert_eq!(idx.nearest_addition(30), Some(40));
        assert_eq!(idx.nearest_addition(20), Some(12));
        assert_eq!(idx.nearest_valid(20), Some(13));
    }

    #[test]
    fn malformed_patch_fails_to_build() {
        assert!(DiffPositionIndex::build("@@ -a +b @@\n+x\n").is_err());
        assert!(DiffPositionIndex::empty().is_empty());
    }
}
