//! Helpers for sanitizing data before it reaches logs, span fields or file
//! names.
//!
//! Job URLs can carry tracking tokens and session ids in their query
//! string, and artifact paths reveal the user's home layout, so neither is
//! logged verbatim.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static RE_UNSAFE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Drops userinfo, query string and fragment from a URL.
///
/// - `https://user:pw@jobs.acme.com/a?token=x` → `https://****@jobs.acme.com/a`
/// - `https://jobs.acme.com/apply#top` → `https://jobs.acme.com/apply`
pub fn redact_url(url: &str) -> String {
    let without_tail = url.split(['?', '#']).next().unwrap_or(url);

    if let Some(scheme_end) = without_tail.find("://") {
        let (scheme, rest) = without_tail.split_at(scheme_end + 3);
        let authority_end = rest.find('/').unwrap_or(rest.len());
        if let Some(at_pos) = rest[..authority_end].rfind('@') {
            return format!("{}****@{}", scheme, &rest[at_pos + 1..]);
        }
    }

    without_tail.to_string()
}

/// File-name-safe slug: runs of anything but ASCII letters and digits
/// become one `_`. Empty input yields `fallback`.
pub fn slugify(text: &str, fallback: &str) -> String {
    let slug = RE_UNSAFE.replace_all(text.trim(), "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        return fallback.to_string();
    }
    slug.chars().take(60).collect()
}
