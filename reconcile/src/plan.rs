//! One reconciliation pass: findings + diff + existing comments → `PostPlan`.
//!
//! Flow:
//!   1) Canonical set of deleted files; findings on them are dropped;
//!   2) Position index per remaining diff file (malformed → empty + skipped item);
//!   3) Line resolution (files outside the diff keep the reported line) and
//!      fingerprinting, then a stable sort (file, line, agent);
//!   4) Dedup tracker seeded from markers of existing comments;
//!   5) Sequential decisions per anchor group, recording every `Post` at once;
//!   6) Stale evaluation of existing comments against this run's fingerprints.
//!
//! Nothing in here is run-fatal: per-file and per-comment problems become
//! [`SkippedItem`]s and the rest of the batch proceeds.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;
use crate::dedup::DedupTracker;
use crate::diff_index::DiffPositionIndex;
use crate::fingerprint;
use crate::markers::{extract_comment_markers, extract_fingerprints};
use crate::parser::looks_like_binary_patch;
use crate::path::{CanonicalPath, canonicalize};
use crate::render::{remove_blocks, render_comment_body};
use crate::resolve::{resolve, resolve_unindexed};
use crate::stale::evaluate;
use crate::types::{
    CanonicalDiffFile, DiffFileStatus, ExistingComment, Finding, PlanAction, PostDecision,
    PostPlan, ResolvedFinding,
};

/// What a skipped item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    Finding,
    File,
    Comment,
}

/// Why an item was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The finding targets a file deleted by this PR.
    DeletedFile,
    /// The file's patch could not be parsed; its index is empty.
    MalformedDiff { detail: String },
    /// A comment marker has no path, so it cannot seed dedup state.
    UnanchoredMarker { fingerprint: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedItem {
    pub kind: SkipKind,
    /// File path, comment id, or `file:line` of the finding.
    pub reference: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Decision made for one resolved finding, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingDecision {
    pub fingerprint: String,
    pub file: CanonicalPath,
    pub line: Option<u32>,
    pub source_agent: String,
    pub decision: PostDecision,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    pub total_findings: usize,
    pub dropped_deleted: usize,
    pub posted: usize,
    pub skipped_exact: usize,
    pub skipped_proximity: usize,
    pub auto_fixed: usize,
    pub resolved_threads: usize,
    pub updated_comments: usize,
}

/// Full result of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub plan: PostPlan,
    pub decisions: Vec<FindingDecision>,
    pub skipped: Vec<SkippedItem>,
    pub stats: ReconcileStats,
}

/// Runs one reconciliation pass.
///
/// Pure and synchronous: no I/O, no shared state. The dedup tracker lives
/// only for the duration of this call.
pub fn run(
    findings: Vec<Finding>,
    diff_files: &[CanonicalDiffFile],
    existing: &[ExistingComment],
    cfg: &ReconcileConfig,
) -> ReconcileOutcome {
    let t0 = Instant::now();
    let mut out = ReconcileOutcome::default();
    out.stats.total_findings = findings.len();

    // 1) deleted files, same canonicalization as finding paths
    let deleted: HashSet<CanonicalPath> = diff_files
        .iter()
        .filter(|f| f.status == DiffFileStatus::Deleted)
        .map(|f| canonicalize(f.path.as_str()))
        .collect();

    // 2) position indexes
    let indexes = build_indexes(diff_files, &deleted, &mut out.skipped);
    debug!(
        files = indexes.len(),
        deleted = deleted.len(),
        "reconcile: position indexes built"
    );

    // 3) resolve + fingerprint
    let mut resolved: Vec<ResolvedFinding> = Vec::with_capacity(findings.len());
    for finding in findings {
        let path = canonicalize(&finding.file);
        if deleted.contains(&path) {
            debug!(file = %path, "reconcile: finding on deleted file dropped");
            out.stats.dropped_deleted += 1;
            out.skipped.push(SkippedItem {
                kind: SkipKind::Finding,
                reference: finding_ref(&path, finding.line),
                reason: SkipReason::DeletedFile,
            });
            continue;
        }
        let mut rf = match indexes.get(&path) {
            Some(index) => resolve(finding, index, cfg.line_window),
            None => {
                debug!(file = %path, "reconcile: file outside the diff, line kept unvalidated");
                resolve_unindexed(finding)
            }
        };
        fingerprint::ensure(&mut rf, cfg.fingerprint_len);
        if rf.was_auto_fixed {
            out.stats.auto_fixed += 1;
        }
        resolved.push(rf);
    }
    resolved.sort_by(|a, b| {
        (&a.file, a.line, &a.source_agent).cmp(&(&b.file, b.line, &b.source_agent))
    });

    // 4) seed dedup state from existing comments
    let mut tracker = DedupTracker::new(cfg.proximity_threshold);
    for comment in existing {
        let markers = extract_comment_markers(comment);
        for m in markers.iter().filter(|m| m.path.is_none()) {
            out.skipped.push(SkippedItem {
                kind: SkipKind::Comment,
                reference: comment.id.clone(),
                reason: SkipReason::UnanchoredMarker {
                    fingerprint: m.fingerprint.clone(),
                },
            });
        }
        tracker.seed_from_markers(&markers);
    }
    debug!(keys = tracker.len(), "reconcile: dedup tracker seeded");

    // 5) decisions, one anchor group at a time
    for group in resolved.chunk_by(|a, b| a.file == b.file && a.line == b.line) {
        let mut posted: Vec<ResolvedFinding> = Vec::new();
        for rf in group {
            let decision = tracker.decide(rf);
            match decision {
                PostDecision::Post => {
                    tracker.record_posted(rf);
                    out.stats.posted += 1;
                    posted.push(rf.clone());
                }
                PostDecision::SkipExact => out.stats.skipped_exact += 1,
                PostDecision::SkipProximity => out.stats.skipped_proximity += 1,
            }
            debug!(
                fingerprint = %rf.fingerprint,
                file = %rf.file,
                line = ?rf.line,
                ?decision,
                "reconcile: decision"
            );
            out.decisions.push(FindingDecision {
                fingerprint: rf.fingerprint.clone(),
                file: rf.file.clone(),
                line: rf.line,
                source_agent: rf.source_agent.clone(),
                decision,
            });
        }
        if !posted.is_empty() {
            let (path, line) = (posted[0].file.clone(), posted[0].line);
            out.plan.actions.push(PlanAction::Create {
                path,
                line,
                body: render_comment_body(&posted),
                findings: posted,
            });
        }
    }

    // 6) stale evaluation
    let current: HashSet<String> = resolved.iter().map(|f| f.fingerprint.clone()).collect();
    for comment in existing {
        if comment.is_resolved {
            continue;
        }
        let markers = extract_fingerprints(&comment.body);
        if markers.is_empty() {
            continue;
        }
        let outcome = evaluate(&markers, &current);
        if outcome.resolved {
            out.stats.resolved_threads += 1;
            out.plan.actions.push(PlanAction::ResolveThread {
                target_comment_id: comment.id.clone(),
                thread_id: comment.thread_id.clone(),
                stale_count: outcome.stale_count(),
            });
        } else if !outcome.partially_resolved.is_empty() {
            out.stats.updated_comments += 1;
            out.plan.actions.push(PlanAction::Update {
                target_comment_id: comment.id.clone(),
                thread_id: comment.thread_id.clone(),
                body: remove_blocks(&comment.body, &outcome.partially_resolved),
                stale_count: outcome.stale_count(),
                markers_to_remove: outcome.partially_resolved,
            });
        }
    }

    info!(
        findings = out.stats.total_findings,
        posted = out.stats.posted,
        skipped_exact = out.stats.skipped_exact,
        skipped_proximity = out.stats.skipped_proximity,
        dropped_deleted = out.stats.dropped_deleted,
        resolved = out.stats.resolved_threads,
        updated = out.stats.updated_comments,
        skipped_items = out.skipped.len(),
        "reconcile: done in {} ms",
        t0.elapsed().as_millis()
    );

    out
}

fn build_indexes(
    diff_files: &[CanonicalDiffFile],
    deleted: &HashSet<CanonicalPath>,
    skipped: &mut Vec<SkippedItem>,
) -> HashMap<CanonicalPath, DiffPositionIndex> {
    let mut indexes = HashMap::with_capacity(diff_files.len());
    for file in diff_files {
        let path = canonicalize(file.path.as_str());
        if deleted.contains(&path) {
            continue;
        }
        let index = if looks_like_binary_patch(&file.patch) {
            debug!(file = %path, "reconcile: binary patch, no commentable lines");
            DiffPositionIndex::empty()
        } else {
            match DiffPositionIndex::build(&file.patch) {
                Ok(idx) => idx,
                Err(e) => {
                    warn!(
                        file = %path,
                        error = %e,
                        "reconcile: malformed diff, file index left empty"
                    );
                    skipped.push(SkippedItem {
                        kind: SkipKind::File,
                        reference: path.to_string(),
                        reason: SkipReason::MalformedDiff {
                            detail: e.to_string(),
                        },
                    });
                    DiffPositionIndex::empty()
                }
            }
        };
        indexes.insert(path, index);
    }
    indexes
}

fn finding_ref(path: &CanonicalPath, line: Option<u32>) -> String {
    match line {
        Some(l) => format!("{path}:{l}"),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;

    fn diff(path: &str, status: DiffFileStatus, patch: &str) -> CanonicalDiffFile {
        CanonicalDiffFile {
            path: CanonicalPath::new(path),
            status,
            patch: patch.into(),
            additions: 0,
            deletions: 0,
        }
    }

    fn finding(fp: &str, file: &str, line: Option<u32>) -> Finding {
        Finding {
            severity: Severity::Medium,
            file: file.into(),
            line,
            end_line: None,
            message: format!("issue {fp}"),
            suggestion: None,
            rule_id: None,
            source_agent: "llm".into(),
            fingerprint: Some(fp.into()),
        }
    }

    #[test]
    fn malformed_file_is_recorded_and_others_proceed() {
        let files = vec![
            diff("bad.rs", DiffFileStatus::Modified, "@@ nope @@\n+x\n"),
            diff("good.rs", DiffFileStatus::Modified, "@@ -0,0 +1,3 @@\n+a\n+b\n+c\n"),
        ];
        let out = run(
            vec![finding("A", "bad.rs", Some(1)), finding("B", "good.rs", Some(2))],
            &files,
            &[],
            &ReconcileConfig::default(),
        );
        assert!(out.skipped.iter().any(|s| s.kind == SkipKind::File
            && s.reference == "bad.rs"
            && matches!(s.reason, SkipReason::MalformedDiff { .. })));
        assert_eq!(out.stats.posted, 2);
        // finding on the malformed file is demoted to file-level, not dropped
        let bad = out.decisions.iter().find(|d| d.file.as_str() == "bad.rs").unwrap();
        assert_eq!(bad.line, None);
    }

    #[test]
    fn finding_outside_diff_keeps_its_line_and_stays_current() {
        let files = vec![diff("a.rs", DiffFileStatus::Added, "@@ -0,0 +1,1 @@\n+a\n")];
        let out = run(
            vec![finding("A", "elsewhere.rs", Some(7))],
            &files,
            &[],
            &ReconcileConfig::default(),
        );
        assert!(out.skipped.is_empty());
        assert_eq!(out.decisions.len(), 1);
        assert_eq!(out.decisions[0].line, Some(7));
        assert_eq!(out.decisions[0].decision, PostDecision::Post);
        assert_eq!(out.stats.auto_fixed, 0);
    }

    #[test]
    fn still_reported_finding_outside_diff_keeps_its_thread_open() {
        let path = CanonicalPath::new("src/x.ts");
        let comment = ExistingComment {
            id: "c1".into(),
            body: crate::markers::render_marker("F1", Some(&path), Some(10)),
            thread_id: Some("t1".into()),
            path: Some("src/x.ts".into()),
            line: Some(10),
            is_resolved: false,
        };
        let out = run(
            vec![finding("F1", "src/x.ts", Some(10))],
            &[],
            &[comment],
            &ReconcileConfig::default(),
        );
        assert_eq!(out.decisions[0].decision, PostDecision::SkipExact);
        assert!(out.plan.is_empty(), "{:?}", out.plan);
    }

    #[test]
    fn binary_patch_demotes_findings_to_file_level() {
        let files = vec![diff(
            "assets/x.png",
            DiffFileStatus::Modified,
            "Binary files a/assets/x.png and b/assets/x.png differ\n",
        )];
        let out = run(
            vec![finding("IMG", "assets/x.png", Some(3))],
            &files,
            &[],
            &ReconcileConfig::default(),
        );
        assert_eq!(out.decisions.len(), 1);
        assert_eq!(out.decisions[0].line, None);
        assert_eq!(out.stats.auto_fixed, 1);
        assert!(
            !out.skipped
                .iter()
                .any(|s| matches!(s.reason, SkipReason::MalformedDiff { .. }))
        );
        let Some(PlanAction::Create { line, findings, .. }) = out.plan.creates().next() else {
            panic!("expected a create, got {:?}", out.plan);
        };
        assert_eq!(*line, None);
        assert!(findings[0].was_auto_fixed);
    }

    #[test]
    fn already_resolved_threads_are_not_resolved_again() {
        let files = vec![diff("a.rs", DiffFileStatus::Modified, "@@ -0,0 +1,1 @@\n+a\n")];
        let comment = ExistingComment {
            id: "1".into(),
            body: crate::markers::render_marker("OLD", Some(&CanonicalPath::new("a.rs")), Some(1)),
            thread_id: Some("t".into()),
            path: Some("a.rs".into()),
            line: Some(1),
            is_resolved: true,
        };
        let out = run(vec![], &files, &[comment], &ReconcileConfig::default());
        assert!(out.plan.is_empty());
    }

    #[test]
    fn comments_without_markers_are_ignored() {
        let comment = ExistingComment {
            id: "human".into(),
            body: "LGTM".into(),
            thread_id: None,
            path: None,
            line: None,
            is_resolved: false,
        };
        let out = run(vec![], &[], &[comment], &ReconcileConfig::default());
        assert!(out.plan.is_empty());
        assert!(out.skipped.is_empty());
    }
}
