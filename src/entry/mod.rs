//! Ignore entries
//!
//! An entry is one operator-declared suppression rule. The raw text decides
//! its kind: a leading `^` makes a regex, an `http://` or `https://` prefix
//! makes an exact URL, anything else is a host (with subdomains).

mod matcher;
mod set;

pub use matcher::matches;
pub use set::{IgnoreSet, Insertion, Replacement};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;
use url::Url;

use crate::error::{ClassificationError, PatternCompileError};

/// A single ignore rule, together with the literal text it was created from
#[derive(Debug, Clone)]
pub struct Entry {
    raw: String,
    kind: EntryKind,
}

/// What an entry matches against
#[derive(Debug, Clone)]
pub enum EntryKind {
    /// Host and all of its subdomains
    Host { host: String },
    /// One exact URL, query ignored
    Url {
        scheme: String,
        host: String,
        port: Option<u16>,
        path: String,
        /// Canonical `scheme://host[:port]/path` form compared at match time
        normalized: String,
    },
    /// Regex searched against host or URL base
    Regex(Pattern),
}

impl Entry {
    /// Classify a raw string. Surrounding whitespace is ignored.
    pub fn classify(raw: &str) -> Result<Self, ClassificationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ClassificationError::Empty);
        }

        let kind = if raw.starts_with('^') {
            EntryKind::Regex(Pattern::compile(raw))
        } else if has_http_prefix(raw) {
            classify_url(raw)
        } else {
            EntryKind::Host {
                host: raw.to_ascii_lowercase(),
            }
        };

        Ok(Self {
            raw: raw.to_string(),
            kind,
        })
    }

    /// The literal text this entry was created from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    /// Short label used in listings
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            EntryKind::Host { .. } => "host",
            EntryKind::Url { .. } => "url",
            EntryKind::Regex(_) => "regex",
        }
    }

}

/// Entries compare by their literal text: classification is a pure function
/// of it, and two spellings of the same rule are kept as distinct entries.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Entry {}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A compiled regex entry.
///
/// Compilation happens once when the entry is classified. A pattern that
/// does not compile stays in the set but never matches; the failure is
/// logged the first time the matcher reaches it.
#[derive(Debug, Clone)]
pub struct Pattern {
    inner: Arc<PatternInner>,
}

#[derive(Debug)]
struct PatternInner {
    compiled: Result<Regex, PatternCompileError>,
    reported: AtomicBool,
}

impl Pattern {
    pub fn compile(source: &str) -> Self {
        let compiled = Regex::new(source).map_err(|e| PatternCompileError {
            pattern: source.to_string(),
            reason: e.to_string(),
        });
        Self {
            inner: Arc::new(PatternInner {
                compiled,
                reported: AtomicBool::new(false),
            }),
        }
    }

    pub fn error(&self) -> Option<&PatternCompileError> {
        self.inner.compiled.as_ref().err()
    }

    /// Search (not full-match) the pattern in any of `haystacks`
    pub fn is_match_any(&self, haystacks: &[&str]) -> bool {
        match &self.inner.compiled {
            Ok(re) => haystacks.iter().any(|h| re.is_match(h)),
            Err(e) => {
                if !self.inner.reported.swap(true, Ordering::Relaxed) {
                    tracing::warn!(pattern = %e.pattern, reason = %e.reason, "Ignoring regex entry that does not compile");
                }
                false
            }
        }
    }
}

fn has_http_prefix(raw: &str) -> bool {
    let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn classify_url(raw: &str) -> EntryKind {
    match Url::parse(raw) {
        Ok(parsed) if parsed.host_str().is_some() => {
            let host = parsed.host_str().unwrap_or_default().to_string();
            let normalized = url_base_of(&parsed);
            EntryKind::Url {
                scheme: parsed.scheme().to_string(),
                host,
                port: parsed.port(),
                path: parsed.path().to_string(),
                normalized,
            }
        }
        _ => {
            tracing::debug!(entry = %raw, "URL entry does not parse, comparing literally");
            let normalized = strip_query(raw).to_string();
            let scheme = normalized
                .split_once("://")
                .map(|(s, _)| s.to_ascii_lowercase())
                .unwrap_or_default();
            EntryKind::Url {
                scheme,
                host: String::new(),
                port: None,
                path: String::new(),
                normalized,
            }
        }
    }
}

/// Cut a URL string at the first `?` or `#`
pub fn strip_query(url: &str) -> &str {
    match url.find(&['?', '#'][..]) {
        Some(idx) => &url[..idx],
        None => url,
    }
}

/// Default port for the schemes a proxy sees
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}

/// Canonical URL base: `scheme://host[:port]/path`.
///
/// Scheme and host are lower-cased, the port is left out when it is the
/// scheme's default and an empty path becomes `/`. Query and fragment are
/// never part of the result.
pub fn normalize_url_base(scheme: &str, host: &str, port: Option<u16>, path: &str) -> String {
    let scheme = scheme.to_ascii_lowercase();
    let path = strip_query(path);

    let mut out = String::with_capacity(scheme.len() + host.len() + path.len() + 10);
    out.push_str(&scheme);
    out.push_str("://");
    out.push_str(&host.to_ascii_lowercase());
    if let Some(port) = port.filter(|p| Some(*p) != default_port(&scheme)) {
        out.push(':');
        out.push_str(&port.to_string());
    }
    if !path.starts_with('/') {
        out.push('/');
    }
    out.push_str(path);
    out
}

/// URL base of an already parsed URL
pub fn url_base_of(url: &Url) -> String {
    normalize_url_base(
        url.scheme(),
        url.host_str().unwrap_or(""),
        url.port(),
        url.path(),
    )
}
