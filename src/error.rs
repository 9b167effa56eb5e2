//! Custom error types for OFS Vanisher
//!
//! Every failure the core can hit has its own type so call sites can
//! decide whether to surface it, log it, or treat it as a non-match.

use thiserror::Error;

/// Main error type for OFS Vanisher operations
#[derive(Error, Debug)]
pub enum VanisherError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Entry classification errors
    #[error("Entry error: {0}")]
    Classification(#[from] ClassificationError),

    /// In-place edit errors
    #[error("Edit error: {0}")]
    Edit(#[from] EditError),

    /// Message extraction errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Settings persistence errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {path}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Could not determine a directory for {0}")]
    NoProjectDir(String),
}

/// Raised when a raw entry cannot become an ignore entry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("entry is empty")]
    Empty,
}

/// Editing an entry in place failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("no entry at position {index} (list has {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("entry already exists: {0}")]
    Duplicate(String),
}

/// A regex entry that does not compile
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid pattern '{pattern}': {reason}")]
pub struct PatternCompileError {
    pub pattern: String,
    pub reason: String,
}

/// A single scope exclusion submission that did not go through
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeSubmissionError {
    #[error("cannot be expressed as a scope exclusion")]
    Unsupported,

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("scope engine rejected '{url}': {reason}")]
    Rejected { url: String, reason: String },
}

/// Host or URL could not be derived from a message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("message has no request")]
    MissingRequest,

    #[error("message has no response")]
    MissingResponse,

    #[error("malformed HTTP message: {0}")]
    Malformed(String),

    #[error("could not determine URL: {0}")]
    Url(String),
}

/// Loading or saving the settings blob failed
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to read settings from {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings to {path}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

impl VanisherError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            VanisherError::Config(e) => format!("Configuration problem: {}", e.user_hint()),
            VanisherError::Classification(e) => format!("Entry rejected: {}", e.user_hint()),
            VanisherError::Edit(e) => format!("Edit rejected: {}", e.user_hint()),
            VanisherError::Extraction(e) => format!("Message issue: {}", e),
            VanisherError::Persistence(e) => format!("Save issue: {}", e.user_hint()),
        }
    }
}

/// Trait for providing user-friendly hints
pub trait UserHint {
    fn user_hint(&self) -> String;
}

impl UserHint for ConfigError {
    fn user_hint(&self) -> String {
        match self {
            ConfigError::ReadError { path, .. } => {
                format!("Could not read '{}'. Check if the file exists and you have read permissions.", path)
            }
            ConfigError::ParseError(_) => {
                "The configuration file has invalid syntax. Check for TOML formatting errors.".into()
            }
            ConfigError::ValidationError { field, reason } => {
                format!("Invalid value for '{}': {}", field, reason)
            }
            ConfigError::NoProjectDir(what) => {
                format!("No home directory available for the {}. Pass an explicit path.", what)
            }
        }
    }
}

impl UserHint for ClassificationError {
    fn user_hint(&self) -> String {
        match self {
            ClassificationError::Empty => {
                "Enter an entry (host, http(s) URL, or regex starting with ^)".into()
            }
        }
    }
}

impl UserHint for EditError {
    fn user_hint(&self) -> String {
        match self {
            EditError::Classification(e) => e.user_hint(),
            EditError::OutOfRange { len, .. } => {
                format!("Pick a position between 0 and {}. Run 'list' to see them.", len.saturating_sub(1))
            }
            EditError::Duplicate(raw) => format!("'{}' is already in the list.", raw),
        }
    }
}

impl UserHint for ScopeSubmissionError {
    fn user_hint(&self) -> String {
        match self {
            ScopeSubmissionError::Unsupported => {
                "Regex entries only mark responses; they cannot be added to the scope exclude list.".into()
            }
            ScopeSubmissionError::InvalidUrl { url, .. } => {
                format!("'{}' is not an absolute URL. Use scheme://host/path.", url)
            }
            _ => self.to_string(),
        }
    }
}

impl UserHint for PersistenceError {
    fn user_hint(&self) -> String {
        match self {
            PersistenceError::Write { path, .. } => {
                format!("Could not save to '{}'. Entries stay active until restart.", path)
            }
            PersistenceError::Corrupt { path, .. } => {
                format!("Settings file '{}' could not be parsed. Fix or remove it.", path)
            }
            _ => self.to_string(),
        }
    }
}
