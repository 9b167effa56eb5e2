//! Operation results shown to the operator

use crate::error::{PersistenceError, UserHint};
use crate::scope::SyncReport;

/// Result of loading saved state on start
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Entries restored from settings
    pub loaded: usize,
    pub sync: SyncReport,
    /// Set when settings could not be read and the list started empty
    pub load_error: Option<PersistenceError>,
}

impl StartupReport {
    pub fn summary(&self) -> String {
        let mut msg = format!("Loaded {} entries.", self.loaded);
        if let Some(e) = &self.load_error {
            msg.push_str(&format!("\nCould not load saved entries: {}", e));
        }
        if !self.sync.is_empty() {
            msg.push_str("\n\n");
            msg.push_str(&self.sync.summary());
        }
        msg
    }
}

/// Result of one interactive operation
#[derive(Debug, Default)]
pub struct OperationReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Values already present
    pub skipped: Vec<String>,
    /// Values that could not be captured or classified
    pub invalid: Vec<String>,
    pub sync: SyncReport,
    pub persist_error: Option<PersistenceError>,
}

impl OperationReport {
    pub fn summary(&self) -> String {
        let mut sections = Vec::new();
        if !self.added.is_empty() {
            sections.push(format!("Added:\n{}", self.added.join("\n")));
        }
        if !self.removed.is_empty() {
            sections.push(format!("Removed:\n{}", self.removed.join("\n")));
        }
        if !self.skipped.is_empty() {
            sections.push(format!("Already listed:\n{}", self.skipped.join("\n")));
        }
        if !self.invalid.is_empty() {
            sections.push(format!("Skipped:\n{}", self.invalid.join("\n")));
        }
        if !self.sync.is_empty() {
            sections.push(self.sync.summary());
        }
        if let Some(e) = &self.persist_error {
            sections.push(format!("Save failed: {}\n{}", e, e.user_hint()));
        }
        if sections.is_empty() {
            return "No changes made.".to_string();
        }
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScopeSubmissionError;
    use crate::scope::SyncFailure;

    #[test]
    fn test_empty_report() {
        let report = OperationReport::default();
        assert_eq!(report.summary(), "No changes made.");
    }

    #[test]
    fn test_summary_sections() {
        let report = OperationReport {
            added: vec!["a.test".into()],
            sync: SyncReport {
                succeeded: vec!["http://a.test/".into()],
                failed: vec![SyncFailure {
                    target: "^x".into(),
                    error: ScopeSubmissionError::Unsupported,
                }],
                ..Default::default()
            },
            ..Default::default()
        };
        let summary = report.summary();
        assert!(summary.starts_with("Added:\na.test"));
        assert!(summary.contains("Excluded from scope:\nhttp://a.test/"));
        assert!(summary.contains("^x (cannot be expressed as a scope exclusion)"));
    }

    #[test]
    fn test_startup_summary_reports_load_error() {
        let report = StartupReport {
            loaded: 0,
            sync: SyncReport::default(),
            load_error: Some(PersistenceError::Corrupt {
                path: "s.json".into(),
                reason: "bad".into(),
            }),
        };
        assert!(report.summary().contains("Could not load saved entries"));
    }
}
