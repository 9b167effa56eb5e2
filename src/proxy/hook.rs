//! Per-response hook
//!
//! Called by the proxy for every exchange, from many worker threads at
//! once. It never fails outward: anything that goes wrong is logged and
//! the message passes through unmodified.

use std::sync::Arc;

use super::rewrite::rewrite;
use crate::entry::IgnoreSet;
use crate::error::ExtractionError;
use crate::http::{HttpAnalyzer, HttpMessage};

/// Host and URL base derived from one exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContext {
    pub host: String,
    pub url_base: String,
}

/// What the hook did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Requests are never touched
    Request,
    /// Not ignored, or context could not be derived
    PassedThrough,
    /// Response replaced with the marked version
    Rewritten(MessageContext),
    /// Matched, but the response could not be rewritten
    Failed(ExtractionError),
}

/// The hook registered with the proxy pipeline
#[derive(Clone)]
pub struct VanisherHook {
    ignore_set: Arc<IgnoreSet>,
    analyzer: Arc<dyn HttpAnalyzer>,
}

impl VanisherHook {
    pub fn new(ignore_set: Arc<IgnoreSet>, analyzer: Arc<dyn HttpAnalyzer>) -> Self {
        Self {
            ignore_set,
            analyzer,
        }
    }

    /// Derive host and URL base. A missing host comes back empty, which
    /// never matches. The host is lower-cased like the one in the URL base.
    pub fn context(&self, message: &dyn HttpMessage) -> MessageContext {
        let service = message.http_service();
        let info = message
            .request()
            .ok_or(ExtractionError::MissingRequest)
            .and_then(|req| self.analyzer.analyze_request(service.as_ref(), req));

        let url_base = match &info {
            Ok(info) => info.url_base(),
            Err(e) => {
                tracing::debug!(error = %e, "Could not derive URL base");
                String::new()
            }
        };
        let host = service
            .map(|svc| svc.host.to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .or_else(|| info.as_ref().ok().map(|i| i.host().to_string()))
            .unwrap_or_default();

        MessageContext { host, url_base }
    }

    /// Whether the exchange belongs to the ignore set
    pub fn is_ignored(&self, context: &MessageContext) -> bool {
        self.ignore_set.matches(&context.host, &context.url_base)
    }

    /// Entry point for every observed exchange
    pub fn process_http_message(
        &self,
        is_request: bool,
        message: &mut dyn HttpMessage,
    ) -> HookOutcome {
        if is_request {
            return HookOutcome::Request;
        }

        let context = self.context(message);
        if !self.is_ignored(&context) {
            return HookOutcome::PassedThrough;
        }

        match self.mark_response(message) {
            Ok(()) => {
                tracing::debug!(host = %context.host, url = %context.url_base, "Marked ignored response");
                HookOutcome::Rewritten(context)
            }
            Err(e) => {
                tracing::warn!(host = %context.host, url = %context.url_base, error = %e, "Could not mark ignored response");
                HookOutcome::Failed(e)
            }
        }
    }

    fn mark_response(&self, message: &mut dyn HttpMessage) -> Result<(), ExtractionError> {
        let response = message.response().ok_or(ExtractionError::MissingResponse)?;
        let info = self.analyzer.analyze_response(response)?;
        let rewritten = rewrite(response, &info.headers, info.body_offset);
        message.set_response(rewritten);
        Ok(())
    }
}
