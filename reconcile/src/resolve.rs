//! Line validation and auto-fix for agent-reported lines.
//!
//! Agents (LLMs in particular) report lines that drift a few positions from
//! the diff. Resolution order for a finding with a line:
//! 1) line valid in the diff → keep it;
//! 2) nearest valid line within `±window` → adopt it (`LineFix::Window`);
//! 3) nearest added line anywhere in the file, else nearest context line
//!    (`LineFix::Clamped`);
//! 4) no commentable line at all → demote to a file-level finding
//!    (`LineFix::FileLevel`).
//!
//! A finding is never dropped here. Files the diff does not cover have no
//! index; their findings keep the reported line as-is ([`resolve_unindexed`]).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::diff_index::DiffPositionIndex;
use crate::path::{CanonicalPath, canonicalize};
use crate::types::{Finding, ResolvedFinding};

/// How a reported line was changed to a commentable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineFix {
    /// Found inside the symmetric search window.
    Window { reported: u32, resolved: u32 },
    /// Nothing in the window; clamped to the nearest addition (or context line).
    Clamped { reported: u32, resolved: u32 },
    /// The file has no commentable lines; anchored to the file instead.
    FileLevel { reported: u32 },
}

/// Resolves one finding against the position index of its file.
///
/// The returned finding has a canonical path and carries the agent
/// fingerprint if it had a non-blank one; otherwise `fingerprint` is empty.
pub fn resolve(finding: Finding, index: &DiffPositionIndex, window: u32) -> ResolvedFinding {
    let file = canonicalize(&finding.file);
    let reported_line = finding.line;

    let (line, line_fix) = match reported_line {
        None => (None, None),
        Some(l) if index.is_valid(l) => (Some(l), None),
        Some(l) => {
            let fix = fix_line(l, index, window);
            match fix {
                LineFix::Window { resolved, .. } => {
                    debug!(file = %file, reported = l, resolved, "line auto-fixed within window");
                }
                LineFix::Clamped { resolved, .. } => {
                    warn!(file = %file, reported = l, resolved, "no valid line in window; clamped");
                }
                LineFix::FileLevel { .. } => {
                    warn!(file = %file, reported = l, "file has no commentable lines; file-level");
                }
            }
            let line = match fix {
                LineFix::Window { resolved, .. } | LineFix::Clamped { resolved, .. } => {
                    Some(resolved)
                }
                LineFix::FileLevel { .. } => None,
            };
            (line, Some(fix))
        }
    };

    into_resolved(finding, file, line, line_fix)
}

/// Resolution for a finding whose file has no position index (not part of
/// the diff). The reported line cannot be validated and is kept unchanged.
pub fn resolve_unindexed(finding: Finding) -> ResolvedFinding {
    let file = canonicalize(&finding.file);
    let line = finding.line;
    into_resolved(finding, file, line, None)
}

fn into_resolved(
    finding: Finding,
    file: CanonicalPath,
    line: Option<u32>,
    line_fix: Option<LineFix>,
) -> ResolvedFinding {
    ResolvedFinding {
        severity: finding.severity,
        file,
        line,
        end_line: finding.end_line,
        reported_line: finding.line,
        message: finding.message,
        suggestion: finding.suggestion,
        rule_id: finding.rule_id,
        source_agent: finding.source_agent,
        fingerprint: finding
            .fingerprint
            .filter(|fp| !fp.trim().is_empty())
            .unwrap_or_default(),
        was_auto_fixed: line_fix.is_some(),
        line_fix,
    }
}

fn fix_line(reported: u32, index: &DiffPositionIndex, window: u32) -> LineFix {
    if let Some(resolved) = index.nearest_valid_within(reported, window) {
        return LineFix::Window { reported, resolved };
    }
    match index
        .nearest_addition(reported)
        .or_else(|| index.nearest_valid(reported))
    {
        Some(resolved) => LineFix::Clamped { reported, resolved },
        None => LineFix::FileLevel { reported },
    }
}
