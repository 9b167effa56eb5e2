//! OFS Vanisher - keep out-of-scope traffic out of proxy history
//!
//! Operators declare hosts, URLs and regexes they never want to see. Each
//! entry is excluded from the proxy's target scope, and every response that
//! still reaches the pipeline for an ignored target is rewritten so history
//! filters can hide it.

pub mod app;
pub mod entry;
pub mod error;
pub mod http;
pub mod proxy;
pub mod scope;
pub mod settings;

pub use app::{Config, OperationReport, StartupReport, Vanisher};
pub use entry::{Entry, EntryKind, IgnoreSet};
pub use error::*;
pub use proxy::{HookOutcome, VanisherHook};
pub use scope::{ScopeEngine, ScopeExclusion};
pub use settings::{FileSettingsStore, MemorySettingsStore, SettingsStore};
