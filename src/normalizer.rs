//! Path normalization
//! Some origin API pages append a second absolute URL after a
//! `latest-commit` / `tree-commit-info` segment; everything from the
//! embedded URL onward is dropped before forwarding.

use once_cell::sync::Lazy;
use regex::Regex;

static NESTED_URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // percent-encoded scheme separator
        r"(/[^/]+/[^/]+/(?:latest-commit|tree-commit-info)/[^/]+)/https(?:%3A|%3a)//[^/]+.*",
        // plain absolute URL
        r"(/[^/]+/[^/]+/(?:latest-commit|tree-commit-info)/[^/]+)/https://[^/]+.*",
        // single-slash scheme, e.g. /main/https:/host/
        r"(/[^/]+/[^/]+/(?:latest-commit|tree-commit-info)/[^/]+)/https:/[^/]+.*",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Nested URL regex is valid"))
    .collect()
});

/// Repair a request path; paths without the malformed shape are returned as-is
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.to_string();
    for pattern in NESTED_URL_PATTERNS.iter() {
        if pattern.is_match(&normalized) {
            normalized = pattern.replace_all(&normalized, "$1").into_owned();
        }
    }
    normalized
}
