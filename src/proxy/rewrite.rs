//! Response marking
//!
//! Matched responses get their content type forced to CSS and a marker
//! header appended so the proxy's MIME filter can hide them. Everything
//! else in the message is kept as is.

use crate::http::build_message;

/// Content type every vanished response is given
pub const CONTENT_TYPE_HEADER: &str = "Content-Type: text/css; charset=UTF-8";

/// Marker header for downstream filters
pub const MARKER_HEADER: &str = "X-OFS-Vanisher: ignored";

const CONTENT_TYPE: &str = "content-type";
const MARKER_NAME: &str = "x-ofs-vanisher";

/// Rewrite the header lines of a matched response.
///
/// Existing `Content-Type` and marker headers are dropped, the remaining
/// lines keep their order, and the two vanisher headers are appended.
pub fn rewrite_headers(headers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = headers
        .iter()
        .filter(|line| !is_header(line, CONTENT_TYPE) && !is_header(line, MARKER_NAME))
        .cloned()
        .collect();
    out.push(CONTENT_TYPE_HEADER.to_string());
    out.push(MARKER_HEADER.to_string());
    out
}

/// Rebuild `raw` with rewritten headers and its body untouched
pub fn rewrite(raw: &[u8], headers: &[String], body_offset: usize) -> Vec<u8> {
    let body = raw.get(body_offset..).unwrap_or_default();
    build_message(&rewrite_headers(headers), body)
}

fn is_header(line: &str, name: &str) -> bool {
    line.split_once(':')
        .map_or(false, |(key, _)| key.trim().eq_ignore_ascii_case(name))
}
