//! Comment body rendering shared by every platform adapter.
//!
//! A comment body is an optional free-text header followed by one block per
//! finding. Each block starts with its marker, so a block spans from its
//! marker to the next marker (or the end of the body). Removing stale
//! findings from a grouped comment is therefore a cut along marker spans.

use std::collections::HashSet;

use crate::markers::{render_marker, scan};
use crate::resolve::LineFix;
use crate::types::{ResolvedFinding, Severity};

const BLOCK_SEPARATOR: &str = "\n\n";

/// Renders a (possibly grouped) comment for findings sharing one anchor.
pub fn render_comment_body(findings: &[ResolvedFinding]) -> String {
    findings
        .iter()
        .map(render_block)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

fn render_block(f: &ResolvedFinding) -> String {
    let mut out = render_marker(&f.fingerprint, Some(&f.file), f.line);
    out.push('\n');
    out.push_str(&format!(
        "{} **{}**",
        severity_icon(f.severity),
        f.severity.label()
    ));
    if let Some(rule) = f.rule_id.as_deref().filter(|r| !r.is_empty()) {
        out.push_str(&format!(" · `{rule}`"));
    }
    out.push_str(&format!(" · _{}_\n\n", f.source_agent));
    out.push_str(f.message.trim());

    if let Some(s) = f.suggestion.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        out.push_str("\n\n**Suggestion:**\n");
        out.push_str(s);
    }

    match f.line_fix {
        Some(LineFix::Window { reported, .. }) | Some(LineFix::Clamped { reported, .. }) => {
            out.push_str(&format!("\n\n<sub>Reported at line {reported}; moved to the nearest line in the diff.</sub>"));
        }
        Some(LineFix::FileLevel { reported }) => {
            out.push_str(&format!("\n\n<sub>Reported at line {reported}, which is not part of the diff.</sub>"));
        }
        None => {}
    }
    out
}

fn severity_icon(s: Severity) -> &'static str {
    match s {
        Severity::Critical => "🛑",
        Severity::High => "🔴",
        Severity::Medium => "🟠",
        Severity::Low => "🟡",
        Severity::Info => "🔵",
    }
}

/// Drops the blocks whose marker fingerprint is in `stale`, keeping the
/// header and all other blocks byte-for-byte.
pub fn remove_blocks(body: &str, stale: &[String]) -> String {
    let stale: HashSet<&str> = stale.iter().map(String::as_str).collect();
    let spans = scan(body);
    let Some(first) = spans.first() else {
        return body.to_string();
    };

    let mut out = String::with_capacity(body.len());
    out.push_str(&body[..first.span.start]);
    for (i, m) in spans.iter().enumerate() {
        let block_end = spans.get(i + 1).map_or(body.len(), |next| next.span.start);
        if !stale.contains(m.marker.fingerprint.as_str()) {
            out.push_str(&body[m.span.start..block_end]);
        }
    }
    out.trim_end().to_string()
}
