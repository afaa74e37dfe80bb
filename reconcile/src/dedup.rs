//! Duplicate detection across runs and within a run.
//!
//! Two structures, always updated together:
//! - an exact set of `(fingerprint, path, line)` keys;
//! - a proximity map `(fingerprint, path) -> sorted lines`.
//!
//! Both are seeded from markers of comments already on the PR and extended by
//! [`DedupTracker::record_posted`] right after every `Post` decision, before the
//! next finding is evaluated. Entries are only ever added during a run.
//!
//! Keys are built by exactly one constructor each ([`DedupeKey::new`],
//! [`ProximityKey::new`]); seeding and recording both go through them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::path::CanonicalPath;
use crate::types::{ExistingCommentMarker, PostDecision, ResolvedFinding};

/// Exact-match key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    fingerprint: String,
    path: CanonicalPath,
    line: Option<u32>,
}

impl DedupeKey {
    pub fn new(fingerprint: &str, path: &CanonicalPath, line: Option<u32>) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            path: path.clone(),
            line,
        }
    }

    pub fn for_finding(f: &ResolvedFinding) -> Self {
        Self::new(&f.fingerprint, &f.file, f.line)
    }
}

/// Proximity key, displayed as `fingerprint:path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProximityKey {
    fingerprint: String,
    path: CanonicalPath,
}

impl ProximityKey {
    pub fn new(fingerprint: &str, path: &CanonicalPath) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            path: path.clone(),
        }
    }

    pub fn for_finding(f: &ResolvedFinding) -> Self {
        Self::new(&f.fingerprint, &f.file)
    }
}

impl fmt::Display for ProximityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fingerprint, self.path)
    }
}

/// Per-run dedup state. Build a fresh one for every reconciliation pass.
#[derive(Debug, Clone)]
pub struct DedupTracker {
    existing: HashSet<DedupeKey>,
    proximity: HashMap<ProximityKey, Vec<u32>>,
    threshold: u32,
}

impl DedupTracker {
    pub fn new(proximity_threshold: u32) -> Self {
        Self {
            existing: HashSet::new(),
            proximity: HashMap::new(),
            threshold: proximity_threshold,
        }
    }

    /// Replays markers of existing comments. Returns how many were seeded;
    /// markers with no resolvable path are skipped.
    pub fn seed_from_markers<'a>(
        &mut self,
        markers: impl IntoIterator<Item = &'a ExistingCommentMarker>,
    ) -> usize {
        let mut seeded = 0;
        for m in markers {
            let Some(path) = m.path.as_ref() else {
                debug!(
                    comment = %m.comment_id,
                    fingerprint = %m.fingerprint,
                    "dedup: marker without anchor, not seeded"
                );
                continue;
            };
            self.insert(&m.fingerprint, path, m.line);
            seeded += 1;
        }
        seeded
    }

    /// Decides whether a resolved finding should be posted.
    pub fn decide(&self, f: &ResolvedFinding) -> PostDecision {
        if self.existing.contains(&DedupeKey::for_finding(f)) {
            return PostDecision::SkipExact;
        }
        if let Some(line) = f.line {
            if self.has_line_near(&ProximityKey::for_finding(f), line) {
                return PostDecision::SkipProximity;
            }
        }
        PostDecision::Post
    }

    /// Records a posted finding in both structures. Call immediately after a
    /// `Post` decision.
    pub fn record_posted(&mut self, f: &ResolvedFinding) {
        self.insert(&f.fingerprint, &f.file, f.line);
    }

    /// Recorded lines for a key, ascending.
    pub fn proximity_lines(&self, fingerprint: &str, path: &CanonicalPath) -> &[u32] {
        self.proximity
            .get(&ProximityKey::new(fingerprint, path))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_exact(
        &self,
        fingerprint: &str,
        path: &CanonicalPath,
        line: Option<u32>,
    ) -> bool {
        self.existing
            .contains(&DedupeKey::new(fingerprint, path, line))
    }

    pub fn len(&self) -> usize {
        self.existing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.existing.is_empty()
    }

    fn insert(&mut self, fingerprint: &str, path: &CanonicalPath, line: Option<u32>) {
        self.existing
            .insert(DedupeKey::new(fingerprint, path, line));
        if let Some(line) = line {
            let lines = self
                .proximity
                .entry(ProximityKey::new(fingerprint, path))
                .or_default();
            if let Err(pos) = lines.binary_search(&line) {
                lines.insert(pos, line);
            }
        }
    }

    /// Inclusive: `|recorded - line| <= threshold`.
    fn has_line_near(&self, key: &ProximityKey, line: u32) -> bool {
        let Some(lines) = self.proximity.get(key) else {
            return false;
        };
        let lo = line.saturating_sub(self.threshold);
        let hi = line.saturating_add(self.threshold);
        let idx = lines.partition_point(|&l| l < lo);
        lines.get(idx).is_some_and(|&l| l <= hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn rf(fp: &str, file: &str, line: Option<u32>) -> ResolvedFinding {
        ResolvedFinding {
            severity: Severity::Medium,
            file: CanonicalPath::new(file),
            line,
            end_line: None,
            reported_line: line,
            message: "m".into(),
            suggestion: None,
            rule_id: None,
            source_agent: "a".into(),
            fingerprint: fp.into(),
            was_auto_fixed: false,
            line_fix: None,
        }
    }

    #[test]
    fn proximity_boundary_is_inclusive() {
        let mut t = DedupTracker::new(20);
        t.record_posted(&rf("F", "src/x.ts", Some(10)));
        assert_eq!(t.decide(&rf("F", "src/x.ts", Some(30))), PostDecision::SkipProximity);
        assert_eq!(t.decide(&rf("F", "src/x.ts", Some(31))), PostDecision::Post);
        assert_eq!(t.decide(&rf("F", "src/x.ts", Some(1))), PostDecision::SkipProximity);
    }

    #[test]
    fn exact_wins_over_proximity() {
        let mut t = DedupTracker::new(20);
        t.record_posted(&rf("F", "src/x.ts", Some(10)));
        assert_eq!(t.decide(&rf("F", "./src/x.ts", Some(10))), PostDecision::SkipExact);
    }

    #[test]
    fn other_fingerprint_or_path_is_independent() {
        let mut t = DedupTracker::new(20);
        t.record_posted(&rf("F", "src/x.ts", Some(10)));
        assert_eq!(t.decide(&rf("G", "src/x.ts", Some(10))), PostDecision::Post);
        assert_eq!(t.decide(&rf("F", "src/y.ts", Some(10))), PostDecision::Post);
    }

    #[test]
    fn record_updates_both_structures() {
        let mut t = DedupTracker::new(20);
        let f = rf("F", "src/x.ts", Some(50));
        t.record_posted(&f);
        t.record_posted(&rf("F", "src/x.ts", Some(5)));
        assert!(t.contains_exact("F", &CanonicalPath::new("src/x.ts"), Some(50)));
        assert_eq!(t.proximity_lines("F", &CanonicalPath::new("src/x.ts")), &[5, 50]);
    }

    #[test]
    fn file_level_findings_dedupe_exactly_only() {
        let mut t = DedupTracker::new(20);
        t.record_posted(&rf("F", "src/x.ts", None));
        assert_eq!(t.decide(&rf("F", "src/x.ts", None)), PostDecision::SkipExact);
        assert_eq!(t.decide(&rf("F", "src/x.ts", Some(3))), PostDecision::Post);
        assert!(t.proximity_lines("F", &CanonicalPath::new("src/x.ts")).is_empty());
    }

    #[test]
    fn seeding_uses_same_keys_as_recording() {
        let mut t = DedupTracker::new(20);
        let markers = vec![
            ExistingCommentMarker {
                fingerprint: "F".into(),
                comment_id: "1".into(),
                thread_id: None,
                path: Some(CanonicalPath::new("/src/x.ts")),
                line: Some(10),
            },
            ExistingCommentMarker {
                fingerprint: "G".into(),
                comment_id: "1".into(),
                thread_id: None,
                path: None,
                line: Some(10),
            },
        ];
        assert_eq!(t.seed_from_markers(&markers), 1);
        assert_eq!(t.decide(&rf("F", "a/src/x.ts", Some(10))), PostDecision::SkipExact);
        assert_eq!(t.decide(&rf("F", "src/x.ts", Some(25))), PostDecision::SkipProximity);
    }
}
