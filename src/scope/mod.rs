//! Scope Management Module
//!
//! The scope engine decides which targets the proxy treats as in scope.
//! OFS Vanisher only ever adds exclusions to it, through the
//! [`ScopeExclusion`] capability.

mod sync;

pub use sync::{exclusion_targets, synchronize, synchronize_all, SyncFailure, SyncReport};

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PersistenceError, ScopeSubmissionError};
use crate::settings::write_atomic;

/// Something that can register a URL as excluded from scope.
///
/// Implementations must be idempotent: excluding an already excluded URL
/// is a no-op that still reports success.
pub trait ScopeExclusion: Send + Sync {
    fn exclude_from_scope(&self, url: &str) -> Result<(), ScopeSubmissionError>;
}

/// Scope configuration for a testing context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    /// Whether scope is enabled
    pub enabled: bool,
    /// Include patterns (URLs/domains that ARE in scope)
    pub include: Vec<ScopePattern>,
    /// Exclude patterns (URLs/domains that are NOT in scope)
    pub exclude: Vec<ScopePattern>,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            enabled: true,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl Scope {
    /// Add an exclude pattern unless an identical one is present.
    /// Returns whether the scope changed.
    pub fn add_exclude(&mut self, pattern: ScopePattern) -> bool {
        if self.exclude.contains(&pattern) {
            return false;
        }
        self.exclude.push(pattern);
        true
    }

    /// Check if a URL is in scope
    pub fn is_in_scope(&self, url: &str) -> bool {
        if !self.enabled {
            return true; // If scope is disabled, everything is in scope
        }

        if self.exclude.iter().any(|p| p.matches(url)) {
            return false;
        }

        // If no includes defined, everything not excluded is in scope
        self.include.is_empty() || self.include.iter().any(|p| p.matches(url))
    }

    /// Get summary string
    pub fn summary(&self) -> String {
        format!(
            "{} include, {} exclude patterns",
            self.include.len(),
            self.exclude.len()
        )
    }
}

/// A pattern for matching URLs/domains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScopePattern {
    /// Match exact URL
    ExactUrl { url: String },
    /// Match URL prefix (what a scope exclusion registers)
    UrlPrefix { prefix: String },
    /// Match domain (with optional subdomain matching)
    Domain {
        domain: String,
        include_subdomains: bool,
    },
    /// Match using regex pattern
    Regex { pattern: String },
}

impl ScopePattern {
    /// Check if this pattern matches a URL
    pub fn matches(&self, url: &str) -> bool {
        match self {
            ScopePattern::ExactUrl { url: pattern_url } => url == pattern_url,

            ScopePattern::UrlPrefix { prefix } => url.starts_with(prefix.as_str()),

            ScopePattern::Domain {
                domain,
                include_subdomains,
            } => Url::parse(url)
                .ok()
                .and_then(|parsed| parsed.host_str().map(str::to_string))
                .map_or(false, |host| {
                    host == *domain
                        || (*include_subdomains && host.ends_with(&format!(".{}", domain)))
                }),

            ScopePattern::Regex { pattern } => Regex::new(pattern)
                .map(|re| re.is_match(url))
                .unwrap_or(false),
        }
    }
}

/// Scope engine that records exclusions in memory and, when given a path,
/// writes the whole scope back as TOML after every change.
pub struct ScopeEngine {
    scope: RwLock<Scope>,
    path: Option<PathBuf>,
}

impl ScopeEngine {
    /// In-memory engine, nothing is persisted
    pub fn new(scope: Scope) -> Self {
        Self {
            scope: RwLock::new(scope),
            path: None,
        }
    }

    /// Load the scope file at `path`, starting empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let scope = if path.exists() {
            let contents =
                std::fs::read_to_string(&path).map_err(|source| PersistenceError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|e| PersistenceError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            Scope::default()
        };

        tracing::debug!(path = %path.display(), summary = %scope.summary(), "Loaded scope");
        Ok(Self {
            scope: RwLock::new(scope),
            path: Some(path),
        })
    }

    /// Copy of the current scope
    pub fn scope(&self) -> Scope {
        self.scope.read().clone()
    }

    pub fn is_in_scope(&self, url: &str) -> bool {
        self.scope.read().is_in_scope(url)
    }

    fn persist(&self, scope: &Scope) -> Result<(), PersistenceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = toml::to_string_pretty(scope).map_err(|e| PersistenceError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        write_atomic(path, contents.as_bytes())
    }
}

impl ScopeExclusion for ScopeEngine {
    fn exclude_from_scope(&self, url: &str) -> Result<(), ScopeSubmissionError> {
        let parsed = Url::parse(url).map_err(|e| ScopeSubmissionError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ScopeSubmissionError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".into(),
            });
        }

        let mut scope = self.scope.write();
        let changed = scope.add_exclude(ScopePattern::UrlPrefix {
            prefix: url.to_string(),
        });
        if changed {
            self.persist(&scope).map_err(|e| ScopeSubmissionError::Rejected {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            tracing::info!(url = %url, "Excluded from scope");
        } else {
            tracing::debug!(url = %url, "Already excluded from scope");
        }
        Ok(())
    }
}
