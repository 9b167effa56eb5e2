//! Raw HTTP/1.x message analysis

use url::Url;

use super::HttpService;
use crate::entry::url_base_of;
use crate::error::ExtractionError;

/// Parsed request line and URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub url: Url,
}

impl RequestInfo {
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    /// Scheme, host, port and path only
    pub fn url_base(&self) -> String {
        url_base_of(&self.url)
    }
}

/// Header lines (start line first) and where the body begins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    pub headers: Vec<String>,
    pub body_offset: usize,
}

/// Splits raw messages into their parts
pub trait HttpAnalyzer: Send + Sync {
    fn analyze_request(
        &self,
        service: Option<&HttpService>,
        request: &[u8],
    ) -> Result<RequestInfo, ExtractionError>;

    fn analyze_response(&self, response: &[u8]) -> Result<ResponseInfo, ExtractionError>;
}

/// Analyzer for HTTP/1.x messages as they appear on the wire
#[derive(Debug, Clone, Copy, Default)]
pub struct RawHttpAnalyzer;

impl HttpAnalyzer for RawHttpAnalyzer {
    fn analyze_request(
        &self,
        service: Option<&HttpService>,
        request: &[u8],
    ) -> Result<RequestInfo, ExtractionError> {
        let (headers, _) = split_head(request);
        let request_line = headers
            .first()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ExtractionError::Malformed("empty request".into()))?;

        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| ExtractionError::Malformed("missing method".into()))?
            .to_string();
        let target = parts
            .next()
            .ok_or_else(|| ExtractionError::Malformed(format!("missing target in '{}'", request_line)))?;

        let url = if target.starts_with("http://") || target.starts_with("https://") {
            Url::parse(target).map_err(|e| ExtractionError::Url(e.to_string()))?
        } else {
            let (scheme, authority) = match service {
                Some(svc) => (svc.protocol.clone(), svc.authority()),
                None => {
                    let host = header_value(&headers, "host").ok_or_else(|| {
                        ExtractionError::Url("no service and no Host header".into())
                    })?;
                    ("http".to_string(), host.to_string())
                }
            };
            let path = if target.starts_with('/') { target } else { "/" };
            Url::parse(&format!("{}://{}{}", scheme, authority, path))
                .map_err(|e| ExtractionError::Url(e.to_string()))?
        };

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ExtractionError::Url(format!("no host in {}", url)));
        }

        Ok(RequestInfo { method, url })
    }

    fn analyze_response(&self, response: &[u8]) -> Result<ResponseInfo, ExtractionError> {
        let (headers, body_offset) = split_head(response);
        match headers.first() {
            Some(status) if status.starts_with("HTTP/") => Ok(ResponseInfo {
                headers,
                body_offset,
            }),
            _ => Err(ExtractionError::Malformed("missing status line".into())),
        }
    }
}

/// Header lines of a message and the offset of its body.
///
/// Accepts CRLF or bare LF line endings. Without a blank line the whole
/// message is treated as head and the body is empty. Bytes are decoded as
/// Latin-1 so obs-text in header values survives [`build_message`].
fn split_head(message: &[u8]) -> (Vec<String>, usize) {
    let crlf = find(message, b"\r\n\r\n").map(|i| (i, i + 4));
    let lf = find(message, b"\n\n").map(|i| (i, i + 2));
    let (head_end, body_offset) = match (crlf, lf) {
        (Some(c), Some(l)) => c.min(l),
        (Some(found), None) | (None, Some(found)) => found,
        (None, None) => (message.len(), message.len()),
    };

    let headers = message[..head_end]
        .split(|&b| b == b'\n')
        .map(|line| latin1_decode(line.strip_suffix(b"\r").unwrap_or(line)))
        .collect();
    (headers, body_offset)
}

fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`latin1_decode`]. Characters above U+00FF cannot come from a
/// parsed message; they are written as UTF-8.
fn latin1_encode(line: &str, out: &mut Vec<u8>) {
    for c in line.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(b) => out.push(b),
            Err(_) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn header_value<'a>(headers: &'a [String], name: &str) -> Option<&'a str> {
    headers.iter().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
    })
}

/// Assemble a message from header lines (start line first) and a body.
/// Header text is written back as Latin-1, matching how it was parsed.
pub fn build_message(headers: &[String], body: &[u8]) -> Vec<u8> {
    let head_len: usize = headers.iter().map(|h| h.len() + 2).sum();
    let mut out = Vec::with_capacity(head_len + 2 + body.len());
    for header in headers {
        latin1_encode(header, &mut out);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_form_request_uses_service() {
        let svc = HttpService::new("api.example.com", 8443, "https");
        let req = b"GET /v1/items?page=2 HTTP/1.1\r\nHost: ignored.test\r\n\r\n";
        let info = RawHttpAnalyzer.analyze_request(Some(&svc), req).unwrap();

        assert_eq!(info.method, "GET");
        assert_eq!(info.host(), "api.example.com");
        assert_eq!(info.url_base(), "https://api.example.com:8443/v1/items");
    }

    #[test]
    fn test_default_port_is_elided() {
        let svc = HttpService::new("example.com", 80, "http");
        let req = b"GET /login?x=1 HTTP/1.1\r\n\r\n";
        let info = RawHttpAnalyzer.analyze_request(Some(&svc), req).unwrap();
        assert_eq!(info.url_base(), "http://example.com/login");
    }

    #[test]
    fn test_absolute_form_request() {
        let req = b"POST http://Example.com/a/b?c=d#frag HTTP/1.1\r\n\r\nbody";
        let info = RawHttpAnalyzer.analyze_request(None, req).unwrap();
        assert_eq!(info.url_base(), "http://example.com/a/b");
    }

    #[test]
    fn test_host_header_fallback() {
        let req = b"GET /x HTTP/1.1\nHost: fallback.test:8080\n\n";
        let info = RawHttpAnalyzer.analyze_request(None, req).unwrap();
        assert_eq!(info.url_base(), "http://fallback.test:8080/x");
    }

    #[test]
    fn test_request_without_host_fails() {
        let req = b"GET /x HTTP/1.1\r\n\r\n";
        assert!(RawHttpAnalyzer.analyze_request(None, req).is_err());
        assert!(RawHttpAnalyzer.analyze_request(None, b"").is_err());
    }

    #[test]
    fn test_analyze_response() {
        let resp = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nX-Foo: 1\r\n\r\n<p>hi</p>";
        let info = RawHttpAnalyzer.analyze_response(resp).unwrap();
        assert_eq!(
            info.headers,
            vec!["HTTP/1.1 200 OK", "Content-Type: text/html", "X-Foo: 1"]
        );
        assert_eq!(&resp[info.body_offset..], b"<p>hi</p>");
    }

    #[test]
    fn test_response_without_body() {
        let resp = b"HTTP/1.1 204 No Content\r\nX-A: 1";
        let info = RawHttpAnalyzer.analyze_response(resp).unwrap();
        assert_eq!(info.headers.len(), 2);
        assert_eq!(info.body_offset, resp.len());
    }

    #[test]
    fn test_obs_text_header_bytes_round_trip() {
        let resp = b"HTTP/1.1 200 OK\r\nContent-Disposition: attachment; filename=\"caf\xE9.txt\"\r\n\r\nx";
        let info = RawHttpAnalyzer.analyze_response(resp).unwrap();
        assert_eq!(info.headers[1], "Content-Disposition: attachment; filename=\"caf\u{e9}.txt\"");
        assert_eq!(build_message(&info.headers, b"x"), resp.to_vec());
    }

    #[test]
    fn test_build_message() {
        let headers = vec!["HTTP/1.1 200 OK".to_string(), "A: b".to_string()];
        assert_eq!(
            build_message(&headers, b"xyz"),
            b"HTTP/1.1 200 OK\r\nA: b\r\n\r\nxyz".to_vec()
        );
    }
}
