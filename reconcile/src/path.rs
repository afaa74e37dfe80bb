//! Path canonicalization.
//!
//! Every path comparison in the engine (finding paths, deleted-file sets,
//! marker metadata, platform-reported comment paths) goes through
//! [`canonicalize`]. There is no second formatting path.
//!
//! Rules, applied until nothing changes:
//! - `\` becomes `/`, runs of `/` collapse to one;
//! - leading `./` and `/` are stripped;
//! - a leading diff prefix `a/` or `b/` is stripped.
//!
//! Running to a fixpoint keeps `canonicalize(canonicalize(p)) == canonicalize(p)`
//! even for inputs such as `./a/src/x.ts`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A repository-relative path in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CanonicalPath(String);

impl CanonicalPath {
    pub fn new(raw: &str) -> Self {
        Self(canonicalize_str(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for CanonicalPath {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for CanonicalPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<CanonicalPath> for String {
    fn from(p: CanonicalPath) -> Self {
        p.0
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalizes a path. Never fails; unrecognized forms pass through.
pub fn canonicalize(raw: &str) -> CanonicalPath {
    CanonicalPath::new(raw)
}

fn canonicalize_str(raw: &str) -> String {
    let mut s = normalize_separators(raw.trim());
    loop {
        let stripped = strip_one_prefix(&s);
        if stripped.len() == s.len() {
            return s;
        }
        s = stripped.to_string();
    }
}

/// `\` → `/` and collapse repeated separators.
fn normalize_separators(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_slash = false;
    for c in s.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(c);
    }
    out
}

fn strip_one_prefix(s: &str) -> &str {
    if let Some(rest) = s.strip_prefix("./") {
        return rest;
    }
    if let Some(rest) = s.strip_prefix('/') {
        return rest;
    }
    for diff_prefix in ["a/", "b/"] {
        if let Some(rest) = s.strip_prefix(diff_prefix) {
            // Keep a bare "a/" alone; it is a directory, not a prefix.
            if !rest.is_empty() {
                return rest;
            }
        }
    }
    s
}
