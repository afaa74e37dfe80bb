//! Stale comment detection.
//!
//! A marker is stale when its fingerprint is not among the findings of the
//! current run. A comment whose markers are all stale gets its thread
//! resolved; a comment with some stale markers gets those blocks removed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Classification of one existing comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub resolved: bool,
    pub partially_resolved: Vec<String>,
    total_markers: usize,
}

impl ResolutionOutcome {
    /// `total markers` when resolved, else the number of stale markers.
    pub fn stale_count(&self) -> usize {
        if self.resolved {
            self.total_markers
        } else {
            self.partially_resolved.len()
        }
    }

    pub fn total_markers(&self) -> usize {
        self.total_markers
    }

    /// Every marker still matches a current finding.
    pub fn is_active(&self) -> bool {
        !self.resolved && self.partially_resolved.is_empty()
    }
}

/// Compares a comment's markers against the fingerprints of this run.
///
/// An empty marker list classifies as resolved with a stale count of 0;
/// callers skip comments without markers before getting here.
pub fn evaluate(markers: &[String], current: &HashSet<String>) -> ResolutionOutcome {
    let active = markers.iter().filter(|m| current.contains(*m)).count();
    let total_markers = markers.len();

    if active == 0 {
        return ResolutionOutcome {
            resolved: true,
            partially_resolved: Vec::new(),
            total_markers,
        };
    }

    let partially_resolved = if active < total_markers {
        markers
            .iter()
            .filter(|m| !current.contains(*m))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    ResolutionOutcome {
        resolved: false,
        partially_resolved,
        total_markers,
    }
}
