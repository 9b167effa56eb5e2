//! Interactive operations on the ignore list
//!
//! Every trigger the operator has (list buttons, context menu, startup)
//! goes through [`Vanisher`], which owns the shared ignore set and the
//! collaborators needed to keep scope and settings in step with it.

use std::sync::Arc;

use parking_lot::Mutex;

use super::report::{OperationReport, StartupReport};
use crate::entry::{Entry, IgnoreSet, Insertion, Replacement};
use crate::error::{ClassificationError, EditError, ExtractionError, PersistenceError};
use crate::http::{HttpAnalyzer, HttpMessage};
use crate::proxy::VanisherHook;
use crate::scope::{synchronize, synchronize_all, ScopeExclusion};
use crate::settings::{load_ignore_set, save_ignore_set, SettingsStore};

/// Reminder shown once on start
pub const BANNER: &str = "\
[OFS Vanisher] Loaded.
IMPORTANT: To prevent NEW out-of-scope items from appearing in HTTP history, enable:
  Proxy > Options > Proxy history logging > \"Don't send items to Proxy history if out of scope\"
(Existing history rows cannot be removed by extensions.)";

/// Owner of the ignore set and its collaborators
pub struct Vanisher {
    ignore_set: Arc<IgnoreSet>,
    settings: Arc<dyn SettingsStore>,
    scope: Arc<dyn ScopeExclusion>,
    analyzer: Arc<dyn HttpAnalyzer>,
    /// Orders saves so the last one written holds the latest list
    persist_lock: Mutex<()>,
}

impl Vanisher {
    /// Load persisted entries and re-exclude all of them from scope.
    ///
    /// A settings load failure is reported and the instance starts with an
    /// empty list rather than failing.
    pub fn start(
        settings: Arc<dyn SettingsStore>,
        scope: Arc<dyn ScopeExclusion>,
        analyzer: Arc<dyn HttpAnalyzer>,
    ) -> (Self, StartupReport) {
        let (ignore_set, load_error) = match load_ignore_set(settings.as_ref()) {
            Ok(set) => (set, None),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load saved entries, starting empty");
                (IgnoreSet::new(), Some(e))
            }
        };

        let vanisher = Self {
            ignore_set: Arc::new(ignore_set),
            settings,
            scope,
            analyzer,
            persist_lock: Mutex::new(()),
        };

        let snapshot = vanisher.ignore_set.snapshot();
        let sync = synchronize_all(&snapshot, vanisher.scope.as_ref());
        sync.log("Auto-exclude on load");

        let report = StartupReport {
            loaded: snapshot.len(),
            sync,
            load_error,
        };
        (vanisher, report)
    }

    /// Shared ignore set
    pub fn ignore_set(&self) -> Arc<IgnoreSet> {
        self.ignore_set.clone()
    }

    /// Current entries
    pub fn entries(&self) -> Arc<Vec<Entry>> {
        self.ignore_set.snapshot()
    }

    /// Hook to register with the proxy pipeline
    pub fn hook(&self) -> VanisherHook {
        VanisherHook::new(self.ignore_set.clone(), self.analyzer.clone())
    }

    /// Add a raw entry, exclude it from scope and save
    pub fn add_entry(&self, raw: &str) -> Result<OperationReport, ClassificationError> {
        let mut report = OperationReport::default();

        match self.ignore_set.append(raw)? {
            Insertion::Duplicate(entry) => {
                report.skipped.push(entry.raw().to_string());
                return Ok(report);
            }
            Insertion::Added(entry) => {
                report.sync = synchronize(&entry, self.scope.as_ref());
                report.added.push(entry.raw().to_string());
            }
        }

        report.persist_error = self.persist().err();
        report.sync.log("Added");
        Ok(report)
    }

    /// Replace the entry at `index`, exclude the new value and save
    pub fn edit_entry(&self, index: usize, raw: &str) -> Result<OperationReport, EditError> {
        let mut report = OperationReport::default();

        match self.ignore_set.replace(index, raw)? {
            Replacement::Unchanged => return Ok(report),
            Replacement::Replaced { old, new } => {
                report.sync = synchronize(&new, self.scope.as_ref());
                report.removed.push(old.raw().to_string());
                report.added.push(new.raw().to_string());
            }
        }

        report.persist_error = self.persist().err();
        report.sync.log("Edited");
        Ok(report)
    }

    /// Remove the entries at `indices` and save.
    /// Scope exclusions already registered stay in place.
    pub fn remove_entries(&self, indices: &[usize]) -> OperationReport {
        let removed = self.ignore_set.remove_at(indices);
        let mut report = OperationReport {
            removed: removed.iter().map(|e| e.raw().to_string()).collect(),
            ..Default::default()
        };
        if !removed.is_empty() {
            report.persist_error = self.persist().err();
        }
        report
    }

    /// Exclude the selected entries from scope again
    pub fn exclude_entries(&self, indices: &[usize]) -> OperationReport {
        let selected = self.ignore_set.select(indices);
        let report = OperationReport {
            sync: synchronize_all(&selected, self.scope.as_ref()),
            persist_error: self.persist().err(),
            ..Default::default()
        };
        report.sync.log("Exclude selected");
        report
    }

    /// Exclude every entry from scope again
    pub fn exclude_all(&self) -> OperationReport {
        let all: Vec<usize> = (0..self.ignore_set.len()).collect();
        self.exclude_entries(&all)
    }

    /// Drop every entry and save the empty list.
    /// Scope exclusions already registered stay in place.
    pub fn clear(&self) -> OperationReport {
        let removed = self.ignore_set.clear();
        let report = OperationReport {
            removed: removed.iter().map(|e| e.raw().to_string()).collect(),
            persist_error: self.persist().err(),
            ..Default::default()
        };
        tracing::info!(count = report.removed.len(), "Cleared all entries (scope excludes remain)");
        report
    }

    /// Save the current list
    pub fn save(&self) -> Result<(), PersistenceError> {
        self.persist()
    }

    /// Context menu: ignore the host of each message, any scheme
    pub fn ignore_hosts(&self, messages: &[&dyn HttpMessage]) -> OperationReport {
        let values = messages
            .iter()
            .map(|m| self.message_host(*m))
            .collect();
        self.capture(values, "host")
    }

    /// Context menu: ignore the URL base (path only) of each message
    pub fn ignore_url_bases(&self, messages: &[&dyn HttpMessage]) -> OperationReport {
        let values = messages
            .iter()
            .map(|m| self.message_url_base(*m))
            .collect();
        self.capture(values, "URL base")
    }

    fn message_host(&self, message: &dyn HttpMessage) -> Result<String, ExtractionError> {
        let service = message.http_service();
        if let Some(host) = service.as_ref().map(|s| s.host.clone()).filter(|h| !h.is_empty()) {
            return Ok(host);
        }
        let request = message.request().ok_or(ExtractionError::MissingRequest)?;
        let info = self.analyzer.analyze_request(service.as_ref(), request)?;
        Ok(info.host().to_string())
    }

    fn message_url_base(&self, message: &dyn HttpMessage) -> Result<String, ExtractionError> {
        let request = message.request().ok_or(ExtractionError::MissingRequest)?;
        let info = self
            .analyzer
            .analyze_request(message.http_service().as_ref(), request)?;
        Ok(info.url_base())
    }

    /// Append captured values, exclude every one of them (even ones already
    /// listed) and save once if anything was added.
    fn capture(&self, values: Vec<Result<String, ExtractionError>>, what: &str) -> OperationReport {
        let mut report = OperationReport::default();
        let mut to_exclude = Vec::new();

        for value in values {
            let value = match value {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping message without a {}", what);
                    report.invalid.push(e.to_string());
                    continue;
                }
            };
            match self.ignore_set.append(&value) {
                Ok(Insertion::Added(entry)) => {
                    report.added.push(entry.raw().to_string());
                    to_exclude.push(entry);
                }
                Ok(Insertion::Duplicate(entry)) => {
                    report.skipped.push(entry.raw().to_string());
                    to_exclude.push(entry);
                }
                Err(e) => report.invalid.push(e.to_string()),
            }
        }

        report.sync = synchronize_all(&to_exclude, self.scope.as_ref());
        if !report.added.is_empty() {
            report.persist_error = self.persist().err();
            tracing::info!(entries = %report.added.join(", "), "Added {}(s)", what);
        }
        report
    }

    /// Save the list as it is now. The snapshot is taken under the lock, so
    /// a slow save can never overwrite a newer one.
    fn persist(&self) -> Result<(), PersistenceError> {
        let _guard = self.persist_lock.lock();
        save_ignore_set(self.settings.as_ref(), &self.ignore_set).map_err(|e| {
            tracing::error!(error = %e, "Save failed");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScopeSubmissionError;
    use crate::http::{Exchange, HttpService, RawHttpAnalyzer};
    use crate::scope::{Scope, ScopeEngine};
    use crate::settings::{MemorySettingsStore, SETTING_KEY};
    use std::sync::mpsc;
    use std::time::Duration;

    /// Store whose saves can be switched off
    #[derive(Default)]
    struct FlakyStore {
        inner: MemorySettingsStore,
        fail_saves: Mutex<bool>,
    }

    impl SettingsStore for FlakyStore {
        fn load_setting(&self, key: &str) -> Result<Option<String>, PersistenceError> {
            self.inner.load_setting(key)
        }

        fn save_setting(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
            if *self.fail_saves.lock() {
                return Err(PersistenceError::Write {
                    path: "memory".into(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.inner.save_setting(key, value)
        }
    }

    struct Fixture {
        vanisher: Vanisher,
        settings: Arc<FlakyStore>,
        scope: Arc<ScopeEngine>,
    }

    fn fixture(saved: &str) -> (Fixture, StartupReport) {
        let settings = Arc::new(FlakyStore::default());
        settings.inner.save_setting(SETTING_KEY, saved).unwrap();
        let scope = Arc::new(ScopeEngine::new(Scope::default()));
        let (vanisher, report) =
            Vanisher::start(settings.clone(), scope.clone(), Arc::new(RawHttpAnalyzer));
        (
            Fixture {
                vanisher,
                settings,
                scope,
            },
            report,
        )
    }

    fn saved(fx: &Fixture) -> String {
        fx.settings.load_setting(SETTING_KEY).unwrap().unwrap_or_default()
    }

    fn excluded(fx: &Fixture) -> usize {
        fx.scope.scope().exclude.len()
    }

    #[test]
    fn test_start_resyncs_saved_entries() {
        let (fx, report) = fixture("a.test\nhttp://b.test/x\n^regex");
        assert_eq!(report.loaded, 3);
        assert_eq!(report.sync.succeeded.len(), 3);
        assert_eq!(report.sync.failed.len(), 1);
        assert!(!fx.scope.is_in_scope("https://a.test/login"));
        assert!(!fx.scope.is_in_scope("http://b.test/x"));
    }

    #[test]
    fn test_add_entry_excludes_and_saves() {
        let (fx, _) = fixture("");
        let report = fx.vanisher.add_entry("example.com").unwrap();

        assert_eq!(report.added, vec!["example.com"]);
        assert_eq!(report.sync.succeeded.len(), 2);
        assert!(report.persist_error.is_none());
        assert_eq!(saved(&fx), "example.com");
        assert_eq!(excluded(&fx), 2);
    }

    #[test]
    fn test_add_duplicate_is_skipped() {
        let (fx, _) = fixture("example.com");
        let report = fx.vanisher.add_entry("example.com").unwrap();
        assert!(report.added.is_empty());
        assert_eq!(report.skipped, vec!["example.com"]);
        assert_eq!(fx.vanisher.entries().len(), 1);
    }

    #[test]
    fn test_add_empty_is_rejected() {
        let (fx, _) = fixture("");
        assert!(matches!(
            fx.vanisher.add_entry(" "),
            Err(ClassificationError::Empty)
        ));
    }

    #[test]
    fn test_save_failure_keeps_memory_authoritative() {
        let (fx, _) = fixture("");
        *fx.settings.fail_saves.lock() = true;

        let report = fx.vanisher.add_entry("ads.test").unwrap();
        assert!(report.persist_error.is_some());
        assert!(report.summary().contains("Save failed"));
        assert!(fx.vanisher.ignore_set().matches("x.ads.test", ""));
        assert_eq!(saved(&fx), "");

        *fx.settings.fail_saves.lock() = false;
        fx.vanisher.save().unwrap();
        assert_eq!(saved(&fx), "ads.test");
    }

    /// Store that stalls while saving `a.test` alone
    struct SlowStore {
        inner: MemorySettingsStore,
        stalled: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl SettingsStore for SlowStore {
        fn load_setting(&self, key: &str) -> Result<Option<String>, PersistenceError> {
            self.inner.load_setting(key)
        }

        fn save_setting(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
            if value == "a.test" {
                if let Some(tx) = self.stalled.lock().take() {
                    tx.send(()).unwrap();
                }
                std::thread::sleep(Duration::from_millis(150));
            }
            self.inner.save_setting(key, value)
        }
    }

    #[test]
    fn test_concurrent_adds_persist_latest_list() {
        let (tx, rx) = mpsc::channel();
        let store = Arc::new(SlowStore {
            inner: MemorySettingsStore::new(),
            stalled: Mutex::new(Some(tx)),
        });
        let scope = Arc::new(ScopeEngine::new(Scope::default()));
        let (vanisher, _) = Vanisher::start(store.clone(), scope, Arc::new(RawHttpAnalyzer));
        let vanisher = Arc::new(vanisher);

        let first = {
            let vanisher = vanisher.clone();
            std::thread::spawn(move || vanisher.add_entry("a.test").unwrap())
        };
        rx.recv().unwrap();
        vanisher.add_entry("b.test").unwrap();
        first.join().unwrap();

        let persisted = store.load_setting(SETTING_KEY).unwrap().unwrap_or_default();
        assert_eq!(persisted, "a.test\nb.test");
        assert_eq!(persisted, vanisher.ignore_set().to_blob());
    }

    #[test]
    fn test_edit_entry() {
        let (fx, _) = fixture("a.test\nb.test");
        let report = fx.vanisher.edit_entry(1, "https://c.test/login").unwrap();

        assert_eq!(report.removed, vec!["b.test"]);
        assert_eq!(report.added, vec!["https://c.test/login"]);
        assert_eq!(report.sync.succeeded, vec!["https://c.test/login"]);
        assert_eq!(saved(&fx), "a.test\nhttps://c.test/login");

        let unchanged = fx.vanisher.edit_entry(0, "a.test").unwrap();
        assert!(unchanged.added.is_empty());
        assert!(matches!(
            fx.vanisher.edit_entry(5, "x"),
            Err(EditError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_remove_and_clear_keep_scope() {
        let (fx, _) = fixture("a.test\nb.test\nc.test");
        let before = excluded(&fx);

        let report = fx.vanisher.remove_entries(&[0, 2]);
        assert_eq!(report.removed, vec!["a.test", "c.test"]);
        assert_eq!(saved(&fx), "b.test");

        let report = fx.vanisher.clear();
        assert_eq!(report.removed, vec!["b.test"]);
        assert_eq!(saved(&fx), "");
        assert_eq!(excluded(&fx), before);
    }

    #[test]
    fn test_exclude_selected_reports_regex() {
        let (fx, _) = fixture("^x\nhttp://y.test/");
        let report = fx.vanisher.exclude_entries(&[0, 1, 7]);
        assert_eq!(report.sync.succeeded, vec!["http://y.test/"]);
        assert_eq!(report.sync.failed.len(), 1);
        assert_eq!(report.sync.failed[0].error, ScopeSubmissionError::Unsupported);
    }

    #[test]
    fn test_context_menu_captures() {
        let (fx, _) = fixture("api.example.com");
        let a = Exchange::new(
            HttpService::new("api.example.com", 443, "https"),
            b"GET /v1/users?id=7 HTTP/1.1\r\n\r\n".to_vec(),
            Vec::new(),
        );
        let b = Exchange::new(
            HttpService::new("cdn.test", 8080, "http"),
            b"GET /lib.js HTTP/1.1\r\n\r\n".to_vec(),
            Vec::new(),
        );

        let report = fx.vanisher.ignore_hosts(&[&a, &b]);
        assert_eq!(report.added, vec!["cdn.test"]);
        assert_eq!(report.skipped, vec!["api.example.com"]);
        // Both hosts are excluded, including the one already listed
        assert_eq!(report.sync.succeeded.len(), 4);

        let report = fx.vanisher.ignore_url_bases(&[&a, &b]);
        assert_eq!(
            report.added,
            vec!["https://api.example.com/v1/users", "http://cdn.test:8080/lib.js"]
        );
        assert_eq!(
            saved(&fx),
            "api.example.com\ncdn.test\nhttps://api.example.com/v1/users\nhttp://cdn.test:8080/lib.js"
        );
    }

    #[test]
    fn test_captured_url_base_matches_its_own_traffic() {
        let (fx, _) = fixture("");
        let mut msg = Exchange::new(
            HttpService::new("shop.test", 443, "https"),
            b"GET /cart?item=1 HTTP/1.1\r\n\r\n".to_vec(),
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n".to_vec(),
        );
        fx.vanisher.ignore_url_bases(&[&msg]);

        let outcome = fx.vanisher.hook().process_http_message(false, &mut msg);
        assert!(matches!(outcome, crate::proxy::HookOutcome::Rewritten(_)));
    }

    #[test]
    fn test_capture_skips_unusable_messages() {
        let (fx, _) = fixture("");
        let broken = Exchange::default();
        let report = fx.vanisher.ignore_hosts(&[&broken]);
        assert!(report.added.is_empty());
        assert_eq!(report.invalid.len(), 1);
        assert_eq!(saved(&fx), "");
    }
}
