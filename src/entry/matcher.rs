//! Ignore matching
//!
//! Runs once per observed response, so it only reads the entries and
//! never allocates beyond what the regex engine needs.

use super::{Entry, EntryKind};

/// Check whether a message with `host` and `url_base` belongs to the ignore set.
///
/// `url_base` must already be normalized (see [`super::normalize_url_base`]).
/// An empty host never matches. Hosts compare lower-cased, the form both
/// host entries and message contexts are stored in.
pub fn matches(entries: &[Entry], host: &str, url_base: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    entries.iter().any(|entry| entry_matches(entry, host, url_base))
}

fn entry_matches(entry: &Entry, host: &str, url_base: &str) -> bool {
    match entry.kind() {
        EntryKind::Regex(pattern) => pattern.is_match_any(&[host, url_base]),
        EntryKind::Url { normalized, .. } => url_base == normalized,
        EntryKind::Host { host: ignored } => host_matches(host, ignored),
    }
}

/// Exact host or any subdomain of it
fn host_matches(host: &str, ignored: &str) -> bool {
    if host == ignored {
        return true;
    }
    host.strip_suffix(ignored)
        .map_or(false, |prefix| prefix.ends_with('.'))
}
