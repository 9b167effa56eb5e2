//! Scope synchronization
//!
//! Turns ignore entries into scope exclusion submissions. Every submission
//! has its own outcome; one failure never stops the others.

use std::collections::HashSet;
use std::fmt;

use super::ScopeExclusion;
use crate::entry::{Entry, EntryKind};
use crate::error::{ScopeSubmissionError, UserHint};

/// A submission that did not go through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    /// URL submitted, or the entry text when nothing could be submitted
    pub target: String,
    pub error: ScopeSubmissionError,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.target, self.error)
    }
}

/// Per-submission outcomes of one or more synchronizations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<SyncFailure>,
    /// URLs a later entry in the same batch also needed. Each was submitted
    /// once and its outcome is the one listed in `succeeded` or `failed`.
    pub shared: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty() && self.shared.is_empty()
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.shared.extend(other.shared);
    }

    /// Emit one log line per outcome under `label`
    pub fn log(&self, label: &str) {
        for url in &self.succeeded {
            tracing::info!(url = %url, "{}: excluded from scope", label);
        }
        for failure in &self.failed {
            tracing::warn!(
                target_url = %failure.target,
                error = %failure.error,
                hint = %failure.error.user_hint(),
                "{}: not excluded",
                label
            );
        }
    }

    /// Operator-facing summary of the outcomes
    pub fn summary(&self) -> String {
        let mut msg = String::new();
        if !self.succeeded.is_empty() {
            msg.push_str("Excluded from scope:\n");
            msg.push_str(&self.succeeded.join("\n"));
            msg.push_str("\n\n");
        }
        if !self.failed.is_empty() {
            let failed: Vec<String> = self.failed.iter().map(ToString::to_string).collect();
            msg.push_str("Failed / info:\n");
            msg.push_str(&failed.join("\n"));
            msg.push_str("\n\n");
        }
        if !self.shared.is_empty() {
            msg.push_str("Shared with an earlier entry (outcome above):\n");
            msg.push_str(&self.shared.join("\n"));
        }
        if msg.is_empty() {
            msg.push_str("No changes made.");
        }
        msg.trim_end().to_string()
    }
}

/// URLs an entry turns into when excluded from scope.
///
/// Hosts are excluded for any scheme, URLs exactly as typed, and regex
/// entries cannot be expressed as an exclusion at all.
pub fn exclusion_targets(entry: &Entry) -> Result<Vec<String>, ScopeSubmissionError> {
    match entry.kind() {
        EntryKind::Regex(_) => Err(ScopeSubmissionError::Unsupported),
        EntryKind::Url { .. } => Ok(vec![entry.raw().to_string()]),
        EntryKind::Host { host } => Ok(vec![
            format!("http://{}/", host),
            format!("https://{}/", host),
        ]),
    }
}

/// Submit the exclusions for a single entry
pub fn synchronize(entry: &Entry, scope: &dyn ScopeExclusion) -> SyncReport {
    synchronize_all(std::slice::from_ref(entry), scope)
}

/// Submit the exclusions for every entry, each distinct URL at most once
pub fn synchronize_all(entries: &[Entry], scope: &dyn ScopeExclusion) -> SyncReport {
    let mut report = SyncReport::default();
    let mut submitted: HashSet<String> = HashSet::new();

    for entry in entries {
        let targets = match exclusion_targets(entry) {
            Ok(targets) => targets,
            Err(error) => {
                report.failed.push(SyncFailure {
                    target: entry.raw().to_string(),
                    error,
                });
                continue;
            }
        };

        for url in targets {
            if !submitted.insert(url.clone()) {
                if !report.shared.contains(&url) {
                    report.shared.push(url);
                }
                continue;
            }
            match scope.exclude_from_scope(&url) {
                Ok(()) => report.succeeded.push(url),
                Err(error) => report.failed.push(SyncFailure { target: url, error }),
            }
        }
    }

    report
}
