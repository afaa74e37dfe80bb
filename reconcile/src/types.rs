//! Platform-agnostic data model shared by the engine and the adapters.
//!
//! These types are the I/O boundary of the engine: findings and diff files
//! come in from upstream phases, existing comments come from a platform
//! listing, and a [`PostPlan`] goes out to a platform poster. All of them
//! (de)serialize as camelCase JSON.

use serde::{Deserialize, Serialize};

use crate::path::CanonicalPath;
use crate::resolve::LineFix;

/// Normalized severity reported by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "note", alias = "suggestion")]
    Info,
    Low,
    #[serde(alias = "warning")]
    Medium,
    #[serde(alias = "error")]
    High,
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

/// Raw finding produced by an analysis agent (static analyzer or LLM).
///
/// `file` is not guaranteed canonical and `line` may not exist in the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub severity: Severity,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub source_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Finding after path canonicalization, line validation and fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFinding {
    pub severity: Severity,
    pub file: CanonicalPath,
    /// Validated line in the new file; `None` for file-level findings.
    pub line: Option<u32>,
    /// Informational only, never part of a dedupe key.
    pub end_line: Option<u32>,
    /// Line exactly as the agent reported it.
    pub reported_line: Option<u32>,
    pub message: String,
    pub suggestion: Option<String>,
    pub rule_id: Option<String>,
    pub source_agent: String,
    /// Empty until [`crate::fingerprint::ensure`] runs; immutable afterwards.
    pub fingerprint: String,
    pub was_auto_fixed: bool,
    pub line_fix: Option<LineFix>,
}

/// Change status of a diff file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffFileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One file of the PR diff, as produced by diff generation upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDiffFile {
    pub path: CanonicalPath,
    pub status: DiffFileStatus,
    /// Unified diff text for this file (hunks only is fine).
    #[serde(default)]
    pub patch: String,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
}

/// A comment previously posted on the PR, as listed by a platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingComment {
    pub id: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Path as reported by the platform (may carry a leading slash).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Thread already resolved/closed on the platform.
    #[serde(default)]
    pub is_resolved: bool,
}

/// One fingerprint marker extracted from an existing comment, together with
/// the anchor used to reseed dedup state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingCommentMarker {
    pub fingerprint: String,
    pub comment_id: String,
    pub thread_id: Option<String>,
    pub path: Option<CanonicalPath>,
    pub line: Option<u32>,
}

/// Outcome of the dedup decision for one resolved finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostDecision {
    Post,
    SkipExact,
    SkipProximity,
}

/// One action for a platform poster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    /// Post a new (possibly grouped) inline or file-level comment.
    #[serde(rename_all = "camelCase")]
    Create {
        path: CanonicalPath,
        line: Option<u32>,
        findings: Vec<ResolvedFinding>,
        body: String,
    },
    /// Rewrite an existing comment without the blocks of stale findings.
    #[serde(rename_all = "camelCase")]
    Update {
        target_comment_id: String,
        thread_id: Option<String>,
        markers_to_remove: Vec<String>,
        stale_count: usize,
        body: String,
    },
    /// Every finding of the comment is gone: resolve/close its thread.
    #[serde(rename_all = "camelCase")]
    ResolveThread {
        target_comment_id: String,
        thread_id: Option<String>,
        stale_count: usize,
    },
}

/// Ordered list of actions produced by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPlan {
    pub actions: Vec<PlanAction>,
}

impl PostPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn creates(&self) -> impl Iterator<Item = &PlanAction> {
        self.actions
            .iter()
            .filter(|a| matches!(a, PlanAction::Create { .. }))
    }
}
