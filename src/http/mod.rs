//! HTTP message plumbing
//!
//! The proxy hands every exchange to the hook as an opaque [`HttpMessage`]
//! handle. Parsing is delegated to an [`HttpAnalyzer`].

mod analyzer;

pub use analyzer::{build_message, HttpAnalyzer, RawHttpAnalyzer, RequestInfo, ResponseInfo};

use serde::{Deserialize, Serialize};

/// Target service of an exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpService {
    pub host: String,
    pub port: u16,
    /// `http` or `https`
    pub protocol: String,
}

impl HttpService {
    pub fn new(host: &str, port: u16, protocol: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            protocol: protocol.to_ascii_lowercase(),
        }
    }

    /// `host[:port]` suitable for building a URL, IPv6 hosts bracketed
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Handle on one observed request/response pair
pub trait HttpMessage {
    fn http_service(&self) -> Option<HttpService>;
    fn request(&self) -> Option<&[u8]>;
    fn response(&self) -> Option<&[u8]>;
    fn set_response(&mut self, response: Vec<u8>);
}

/// Owned exchange, used for replayed traffic and in tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exchange {
    pub service: Option<HttpService>,
    pub request: Option<Vec<u8>>,
    pub response: Option<Vec<u8>>,
}

impl Exchange {
    pub fn new(service: HttpService, request: Vec<u8>, response: Vec<u8>) -> Self {
        Self {
            service: Some(service),
            request: Some(request),
            response: Some(response),
        }
    }
}

impl HttpMessage for Exchange {
    fn http_service(&self) -> Option<HttpService> {
        self.service.clone()
    }

    fn request(&self) -> Option<&[u8]> {
        self.request.as_deref()
    }

    fn response(&self) -> Option<&[u8]> {
        self.response.as_deref()
    }

    fn set_response(&mut self, response: Vec<u8>) {
        self.response = Some(response);
    }
}
