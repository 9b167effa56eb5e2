//! HAR (HTTP Archive) replay
//!
//! Feeds every recorded exchange of an archive through the hook, the same
//! way a live proxy would, and writes the marked archive back.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use url::Url;

use super::hook::{HookOutcome, VanisherHook};
use super::rewrite::{rewrite_headers, CONTENT_TYPE_HEADER};
use crate::http::{Exchange, HttpService};

/// Counts from one replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub total: usize,
    pub rewritten: usize,
    pub passed_through: usize,
    /// Entries without a response, or whose response could not be rebuilt
    pub skipped: usize,
    /// URLs of the rewritten entries, in archive order
    pub vanished: Vec<String>,
}

/// Replay a HAR document, returning the marked document and the counts
pub async fn replay(content: &str, hook: Arc<VanisherHook>) -> Result<(String, ReplayReport)> {
    let mut har: HarFile = serde_json::from_str(content).context("Failed to parse HAR file")?;
    let mut report = ReplayReport {
        total: har.log.entries.len(),
        ..Default::default()
    };

    let mut tasks = JoinSet::new();
    for (index, entry) in har.log.entries.iter().enumerate() {
        let Some(exchange) = to_exchange(entry) else {
            report.skipped += 1;
            continue;
        };
        let hook = hook.clone();
        tasks.spawn_blocking(move || {
            let mut exchange = exchange;
            let outcome = hook.process_http_message(false, &mut exchange);
            (index, outcome)
        });
    }

    let mut results = Vec::with_capacity(report.total);
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.context("Replay worker panicked")?);
    }
    results.sort_by_key(|(index, _)| *index);

    for (index, outcome) in results {
        match outcome {
            HookOutcome::Rewritten(_) => {
                let entry = &mut har.log.entries[index];
                if apply_response(entry) {
                    report.rewritten += 1;
                    report.vanished.push(entry.request.url.clone());
                } else {
                    report.skipped += 1;
                }
            }
            HookOutcome::Failed(e) => {
                tracing::warn!(index, error = %e, "Replay could not mark entry");
                report.skipped += 1;
            }
            HookOutcome::PassedThrough | HookOutcome::Request => report.passed_through += 1,
        }
    }

    tracing::info!(
        total = report.total,
        rewritten = report.rewritten,
        "HAR replay complete"
    );

    let output = serde_json::to_string_pretty(&har).context("Failed to serialize HAR file")?;
    Ok((output, report))
}

fn to_exchange(entry: &HarEntry) -> Option<Exchange> {
    let response = entry.response.as_ref()?;
    let url = Url::parse(&entry.request.url).ok()?;
    let service = HttpService::new(
        url.host_str()?,
        url.port_or_known_default()?,
        url.scheme(),
    );

    let mut request = format!("{} {} HTTP/1.1\r\n", entry.request.method, entry.request.url);
    for header in &entry.request.headers {
        request.push_str(&format!("{}: {}\r\n", header.name, header.value));
    }
    request.push_str("\r\n");
    if let Some(post) = &entry.request.post_data {
        request.push_str(&post.text);
    }

    let version = if response.http_version.starts_with("HTTP/") {
        response.http_version.as_str()
    } else {
        "HTTP/1.1"
    };
    let mut raw = format!("{} {} {}\r\n", version, response.status, response.status_text);
    for header in &response.headers {
        raw.push_str(&format!("{}: {}\r\n", header.name, header.value));
    }
    raw.push_str("\r\n");
    if let Some(text) = &response.content.text {
        raw.push_str(text);
    }

    Some(Exchange::new(service, request.into_bytes(), raw.into_bytes()))
}

/// Apply the header rewrite to the archive entry. The body in the archive is
/// left alone; only headers and MIME type change. Retained headers keep any
/// extra fields they carried.
fn apply_response(entry: &mut HarEntry) -> bool {
    let Some(response) = entry.response.as_mut() else {
        return false;
    };

    let lines: Vec<String> = response.headers.iter().map(HarHeader::line).collect();
    let mut originals = std::mem::take(&mut response.headers).into_iter();
    response.headers = rewrite_headers(&lines)
        .into_iter()
        .map(|line| {
            // Retained headers keep their relative order
            originals
                .by_ref()
                .find(|h| h.line() == line)
                .unwrap_or_else(|| HarHeader::from_line(&line))
        })
        .collect();

    if let Some((_, mime)) = CONTENT_TYPE_HEADER.split_once(':') {
        response.content.mime_type = mime.trim().to_string();
    }
    true
}

// HAR file structures. Unknown fields are carried through untouched.

#[derive(Debug, Serialize, Deserialize)]
struct HarFile {
    log: HarLog,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HarLog {
    entries: Vec<HarEntry>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HarEntry {
    request: HarRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<HarResponse>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HarRequest {
    method: String,
    url: String,
    #[serde(default)]
    headers: Vec<HarHeader>,
    #[serde(rename = "postData", default, skip_serializing_if = "Option::is_none")]
    post_data: Option<HarPostData>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HarResponse {
    status: u16,
    #[serde(rename = "statusText", default)]
    status_text: String,
    #[serde(rename = "httpVersion", default)]
    http_version: String,
    #[serde(default)]
    headers: Vec<HarHeader>,
    #[serde(default)]
    content: HarContent,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HarContent {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HarHeader {
    name: String,
    value: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl HarHeader {
    fn line(&self) -> String {
        format!("{}: {}", self.name, self.value)
    }

    fn from_line(line: &str) -> Self {
        let (name, value) = line.split_once(':').unwrap_or((line, ""));
        Self {
            name: name.trim().to_string(),
            value: value.trim().to_string(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HarPostData {
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    text: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::IgnoreSet;
    use crate::http::RawHttpAnalyzer;

    const HAR: &str = r#"{
      "log": {
        "version": "1.2",
        "creator": {"name": "test", "version": "1"},
        "entries": [
          {
            "startedDateTime": "2024-01-01T00:00:00Z",
            "request": {"method": "GET", "url": "https://ads.example.com/pixel?id=1", "headers": [{"name": "Host", "value": "ads.example.com"}]},
            "response": {
              "status": 200, "statusText": "OK", "httpVersion": "HTTP/1.1",
              "headers": [{"name": "Content-Type", "value": "image/gif"}, {"name": "Cache-Control", "value": "no-store"}],
              "content": {"size": 3, "mimeType": "image/gif", "text": "GIF"}
            }
          },
          {
            "request": {"method": "GET", "url": "https://app.test/", "headers": []},
            "response": {
              "status": 200, "statusText": "OK", "httpVersion": "HTTP/2",
              "headers": [{"name": "Content-Type", "value": "text/html"}],
              "content": {"mimeType": "text/html", "text": "<html></html>"}
            }
          },
          {
            "request": {"method": "GET", "url": "https://example.com/pending", "headers": []}
          }
        ]
      }
    }"#;

    fn hook(entries: &str) -> Arc<VanisherHook> {
        Arc::new(VanisherHook::new(
            Arc::new(IgnoreSet::from_blob(entries)),
            Arc::new(RawHttpAnalyzer),
        ))
    }

    #[tokio::test]
    async fn test_replay_marks_matching_entries() {
        let (output, report) = replay(HAR, hook("example.com")).await.unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.rewritten, 1);
        assert_eq!(report.passed_through, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.vanished, vec!["https://ads.example.com/pixel?id=1"]);

        let doc: Value = serde_json::from_str(&output).unwrap();
        let first = &doc["log"]["entries"][0];
        assert_eq!(first["response"]["content"]["mimeType"], "text/css; charset=UTF-8");
        assert_eq!(first["response"]["content"]["text"], "GIF");
        assert_eq!(first["startedDateTime"], "2024-01-01T00:00:00Z");
        let headers: Vec<String> = first["response"]["headers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| format!("{}: {}", h["name"].as_str().unwrap(), h["value"].as_str().unwrap()))
            .collect();
        assert_eq!(
            headers,
            vec![
                "Cache-Control: no-store",
                "Content-Type: text/css; charset=UTF-8",
                "X-OFS-Vanisher: ignored"
            ]
        );

        let second = &doc["log"]["entries"][1];
        assert_eq!(second["response"]["content"]["mimeType"], "text/html");
        assert_eq!(doc["log"]["creator"]["name"], "test");
    }

    #[tokio::test]
    async fn test_unmatched_entries_round_trip_unchanged() {
        let input = r#"{
          "log": {
            "version": "1.2",
            "entries": [
              {
                "request": {
                  "method": "POST", "url": "https://app.test/login", "httpVersion": "HTTP/1.1",
                  "headers": [{"name": "Content-Type", "value": "application/x-www-form-urlencoded", "comment": "form"}],
                  "postData": {"mimeType": "application/x-www-form-urlencoded", "text": "u=a&p=b",
                               "params": [{"name": "u", "value": "a"}, {"name": "p", "value": "b"}]}
                },
                "response": {
                  "status": 302, "statusText": "Found", "httpVersion": "HTTP/1.1",
                  "headers": [{"name": "Location", "value": "/home", "comment": "redirect"}],
                  "content": {"size": 0, "mimeType": "text/html"},
                  "redirectURL": "/home"
                }
              },
              {
                "request": {"method": "GET", "url": "https://ads.example.com/p", "headers": []},
                "response": {
                  "status": 200, "statusText": "OK", "httpVersion": "HTTP/1.1",
                  "headers": [{"name": "ETag", "value": "\"1\"", "comment": "kept"}],
                  "content": {"mimeType": "image/gif"}
                }
              }
            ]
          }
        }"#;

        let (output, report) = replay(input, hook("example.com")).await.unwrap();
        assert_eq!(report.passed_through, 1);
        assert_eq!(report.rewritten, 1);

        let before: Value = serde_json::from_str(input).unwrap();
        let after: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(after["log"]["entries"][0], before["log"]["entries"][0]);

        let marked = &after["log"]["entries"][1]["response"]["headers"];
        assert_eq!(marked[0]["name"], "ETag");
        assert_eq!(marked[0]["comment"], "kept");
    }

    #[tokio::test]
    async fn test_replay_rejects_invalid_json() {
        assert!(replay("not json", hook("example.com")).await.is_err());
    }
}
