//! Hidden fingerprint markers embedded into comment bodies.
//!
//! The engine keeps no state between runs: everything it needs to recognize
//! its own comments is round-tripped through these HTML comments.
//!
//! Format (one per finding block, a grouped comment carries several):
//! `<!-- review-sync:fp=<fp>;path=<path>;line=<n>;ver=1 -->`
//!
//! `fp` and `path` are percent-encoded so that `;`, `=` and `-->` inside them
//! cannot break the framing. `path` and `line` are optional.
//!
//! Extraction is a small forward scanner: every byte of the body is visited a
//! bounded number of times and at most [`MAX_MARKERS_PER_COMMENT`] markers
//! are returned. A marker whose fingerprint decodes to an empty string is
//! dropped right here, so markers and finding blocks stay aligned.

use std::ops::Range;

use crate::path::{CanonicalPath, canonicalize};
use crate::types::{ExistingComment, ExistingCommentMarker};

pub const MARKER_OPEN: &str = "<!-- review-sync:";
pub const MARKER_CLOSE: &str = "-->";
pub const MARKER_VERSION: u32 = 1;
pub const MAX_MARKERS_PER_COMMENT: usize = 256;

/// Decoded content of one marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub fingerprint: String,
    pub path: Option<CanonicalPath>,
    pub line: Option<u32>,
}

/// A marker and the byte range it occupies in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSpan {
    pub marker: Marker,
    pub span: Range<usize>,
}

/// Renders a marker for one finding.
pub fn render_marker(fingerprint: &str, path: Option<&CanonicalPath>, line: Option<u32>) -> String {
    let mut inner = format!("fp={}", urlencoding::encode(fingerprint));
    if let Some(p) = path {
        inner.push_str(";path=");
        inner.push_str(&urlencoding::encode(p.as_str()));
    }
    if let Some(l) = line {
        inner.push_str(&format!(";line={l}"));
    }
    format!("{MARKER_OPEN}{inner};ver={MARKER_VERSION} {MARKER_CLOSE}")
}

/// Scans `body` for well-formed markers, in order of appearance.
pub fn scan(body: &str) -> Vec<MarkerSpan> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    while out.len() < MAX_MARKERS_PER_COMMENT {
        let Some(rel_open) = body[pos..].find(MARKER_OPEN) else {
            break;
        };
        let start = pos + rel_open;
        let inner_start = start + MARKER_OPEN.len();
        let Some(rel_close) = body[inner_start..].find(MARKER_CLOSE) else {
            // Unterminated marker: nothing after it can be framed reliably.
            break;
        };
        let inner_end = inner_start + rel_close;
        let end = inner_end + MARKER_CLOSE.len();
        pos = end;

        if let Some(marker) = parse_inner(&body[inner_start..inner_end]) {
            out.push(MarkerSpan {
                marker,
                span: start..end,
            });
        }
    }
    out
}

/// Markers of `body` without position info.
pub fn extract_markers(body: &str) -> Vec<Marker> {
    scan(body).into_iter().map(|m| m.marker).collect()
}

/// Fingerprints of `body`, in order of appearance.
pub fn extract_fingerprints(body: &str) -> Vec<String> {
    scan(body).into_iter().map(|m| m.marker.fingerprint).collect()
}

/// Markers of an existing comment, anchored for dedup seeding.
///
/// The platform-reported path/line win when present; the marker metadata is
/// the fallback (outdated comments, platforms that do not expose anchors).
pub fn extract_comment_markers(comment: &ExistingComment) -> Vec<ExistingCommentMarker> {
    let platform_path = comment
        .path
        .as_deref()
        .map(canonicalize)
        .filter(|p| !p.is_empty());
    extract_markers(&comment.body)
        .into_iter()
        .map(|m| ExistingCommentMarker {
            fingerprint: m.fingerprint,
            comment_id: comment.id.clone(),
            thread_id: comment.thread_id.clone(),
            path: platform_path.clone().or(m.path),
            line: comment.line.or(m.line),
        })
        .collect()
}

fn parse_inner(inner: &str) -> Option<Marker> {
    let mut fingerprint: Option<String> = None;
    let mut path = None;
    let mut line = None;

    for field in inner.trim().split(';') {
        let Some((key, value)) = field.trim().split_once('=') else {
            continue;
        };
        match key {
            "fp" => fingerprint = urlencoding::decode(value).ok().map(|v| v.into_owned()),
            "path" => {
                path = urlencoding::decode(value)
                    .ok()
                    .map(|v| canonicalize(&v))
                    .filter(|p| !p.is_empty());
            }
            "line" => line = value.parse::<u32>().ok(),
            _ => {}
        }
    }

    // Empty captures are rejected here, never pushed.
    let fingerprint = fingerprint.filter(|fp| !fp.trim().is_empty())?;
    Some(Marker {
        fingerprint,
        path,
        line,
    })
}
