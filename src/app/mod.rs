//! Application core

mod config;
mod report;
mod vanisher;

pub use config::{Config, GeneralConfig, LoggingConfig};
pub use report::{OperationReport, StartupReport};
pub use vanisher::{Vanisher, BANNER};
