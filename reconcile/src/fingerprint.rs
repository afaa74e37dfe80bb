//! Stable finding identity.
//!
//! Identity fields:
//! - canonical path
//! - rule id (or the source agent when the agent reports no rule)
//! - normalized message
//!
//! Joined with `|`, hashed with SHA-256, lowercase hex, truncated. The line is
//! deliberately not part of the identity: the same issue moving a few lines
//! between pushes must keep its fingerprint.

use sha2::{Digest, Sha256};

use crate::path::CanonicalPath;
use crate::types::ResolvedFinding;

/// Fingerprint for `finding`: the agent-supplied one when non-blank, else a
/// generated one.
pub fn fingerprint(finding: &ResolvedFinding, len: usize) -> String {
    if !finding.fingerprint.trim().is_empty() {
        return finding.fingerprint.clone();
    }
    generate(
        &finding.file,
        finding
            .rule_id
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(&finding.source_agent),
        &finding.message,
        len,
    )
}

/// Fills `finding.fingerprint` if it is still empty. A non-empty fingerprint
/// is never overwritten.
pub fn ensure(finding: &mut ResolvedFinding, len: usize) {
    if finding.fingerprint.trim().is_empty() {
        finding.fingerprint = fingerprint(finding, len);
    }
}

/// Deterministic fingerprint from identity fields.
pub fn generate(path: &CanonicalPath, rule_or_agent: &str, message: &str, len: usize) -> String {
    let canonical = format!(
        "{}|{}|{}",
        path.as_str(),
        rule_or_agent.trim(),
        normalize_message(message)
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(len.clamp(1, 64));
    hex
}

/// Lowercase, collapse whitespace runs, drop trailing `.`, `!` and `:`.
pub fn normalize_message(message: &str) -> String {
    let collapsed = message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(['.', '!', ':'])
        .trim_end()
        .to_string()
}
