//! Finding reconciliation engine.
//!
//! Takes raw findings from analysis agents (line numbers fuzzy, output not
//! stable across runs), the PR diff, and the comments already on the PR, and
//! decides deterministically which findings to post, which ones duplicate an
//! existing comment, and which existing comments went stale.
//!
//! Components, leaves first:
//! - [`path`]        canonical file paths
//! - [`parser`]      unified-diff hunks
//! - [`diff_index`]  commentable lines per file
//! - [`resolve`]     line validation and auto-fix
//! - [`fingerprint`] stable finding identity
//! - [`markers`]     hidden markers carrying identity across runs
//! - [`render`]      comment bodies (grouped blocks, block removal)
//! - [`dedup`]       exact and proximity duplicate tracking
//! - [`stale`]       resolved / partially resolved classification
//! - [`plan`]        the orchestrated pass producing a [`PostPlan`]
//!
//! The engine is synchronous and keeps no state across runs; all persistence
//! is the marker text inside posted comments. Platform I/O lives in the
//! `platforms` crate.

pub mod config;
pub mod dedup;
pub mod diff_index;
pub mod errors;
pub mod fingerprint;
pub mod markers;
pub mod parser;
pub mod path;
pub mod plan;
pub mod render;
pub mod resolve;
pub mod stale;
pub mod types;

pub use config::ReconcileConfig;
pub use errors::{Error, ReconcileResult};
pub use path::{CanonicalPath, canonicalize};
pub use plan::{ReconcileOutcome, ReconcileStats, SkipKind, SkipReason, SkippedItem, run};
pub use types::{
    CanonicalDiffFile, DiffFileStatus, ExistingComment, ExistingCommentMarker, Finding,
    PlanAction, PostDecision, PostPlan, ResolvedFinding, Severity,
};

/// Parses JSON inputs and runs one pass. Convenience for runners that read
/// the three inputs from files or stdin.
///
/// # Errors
/// [`Error::Validation`] if any input is not valid JSON of the expected shape.
pub fn run_json(
    findings_json: &str,
    diff_json: &str,
    comments_json: &str,
    cfg: &ReconcileConfig,
) -> ReconcileResult<ReconcileOutcome> {
    let findings: Vec<Finding> = serde_json::from_str(findings_json)?;
    let diff_files: Vec<CanonicalDiffFile> = serde_json::from_str(diff_json)?;
    let comments: Vec<ExistingComment> = serde_json::from_str(comments_json)?;
    Ok(run(findings, &diff_files, &comments, cfg))
}
