//! Record source adapter: the remote attendance-log API.
//!
//! One call to [`RecordSource::fetch_page`] is one HTTP request. Use
//! [`collect_pages`] to follow `links.next` across a whole window.

use std::error::Error as StdError;
use std::io::ErrorKind as IoErrorKind;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use attendsync_core::{Criteria, ProjectDescriptor, SourceConfig, TimeWindow};

use crate::error::SourceError;

const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One record as upstream sent it. Every field is optional here; the
/// validator decides what is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub uid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sync_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub logged_time: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_id: Option<String>,
    #[serde(alias = "person_id", default, deserialize_with = "lenient_string")]
    pub person_identifier: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub rfid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub primary_display_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub secondary_display_text: Option<String>,
    /// Decode error for a `data` element that is not a record object.
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl RawRecord {
    /// Decode one `data` element. Anything that does not decode comes back
    /// as a placeholder carrying the error, for the validator to drop.
    pub fn from_value(value: Value) -> Self {
        let uid = value.get("uid").and_then(|uid| match uid {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        serde_json::from_value(value).unwrap_or_else(|err| RawRecord {
            uid,
            malformed: Some(err.to_string()),
            ..RawRecord::default()
        })
    }
}

/// Pagination links as returned by upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub first: Option<String>,
    #[serde(default)]
    pub last: Option<String>,
    #[serde(default)]
    pub prev: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogsResponse {
    #[serde(default)]
    data: Option<Vec<Value>>,
    #[serde(default)]
    meta: Option<Value>,
    #[serde(default)]
    project: Option<ProjectDescriptor>,
    #[serde(default)]
    links: Option<PageLinks>,
}

/// Records plus the source-side metadata that came with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchBatch {
    pub records: Vec<RawRecord>,
    pub project: ProjectDescriptor,
    pub meta: Value,
    pub links: PageLinks,
    pub pages: u32,
}

/// What to ask the source for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchQuery {
    pub window: TimeWindow,
    pub criteria: Criteria,
    pub page_size: u32,
    pub max_pages: u32,
}

impl FetchQuery {
    pub fn new(window: TimeWindow, config: &SourceConfig) -> Self {
        Self {
            window,
            criteria: config.criteria,
            page_size: config.page_size,
            max_pages: config.max_pages,
        }
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Data-fetch capability. Implementations block the calling thread.
pub trait RecordSource: Send + Sync {
    /// Fetch one page (1-based) of records for `query`.
    fn fetch_page(&self, query: &FetchQuery, page: u32) -> Result<FetchBatch, SourceError>;
}

/// Fetch every page of `query`, following `links.next` up to `max_pages`.
///
/// Project and meta come from the first page.
pub fn collect_pages(
    source: &dyn RecordSource,
    query: &FetchQuery,
) -> Result<FetchBatch, SourceError> {
    let max_pages = query.max_pages.max(1);
    let mut batch = source.fetch_page(query, 1)?;
    batch.pages = 1;

    let mut page = 1;
    while batch.links.next.is_some() {
        if page >= max_pages {
            tracing::warn!(
                "stopping after {max_pages} pages for window {}; more records pending upstream",
                query.window
            );
            break;
        }
        page += 1;
        let next = source.fetch_page(query, page)?;
        batch.records.extend(next.records);
        batch.links = next.links;
        batch.pages = page;
    }
    Ok(batch)
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Bearer-token HTTP client for the attendance-log API.
pub struct HttpRecordSource {
    agent: ureq::Agent,
    url: String,
    token: String,
    timeout: Duration,
    last_fetch_at: Mutex<Option<DateTime<Utc>>>,
}

impl HttpRecordSource {
    pub fn new(config: &SourceConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self::with_timeout(config, timeout)
    }

    /// Like [`HttpRecordSource::new`] but with an explicit timeout, so tests
    /// can use sub-second values.
    pub fn with_timeout(config: &SourceConfig, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.endpoint.trim_start_matches('/')
        );
        Self {
            agent,
            url,
            token: config.api_token.clone(),
            timeout,
            last_fetch_at: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// When the last successful page was received; diagnostics only.
    pub fn last_fetch_at(&self) -> Option<DateTime<Utc>> {
        self.last_fetch_at.lock().map(|g| *g).unwrap_or(None)
    }

    fn timeout_error(&self) -> SourceError {
        SourceError::Timeout {
            timeout_secs: self.timeout.as_secs().max(1),
        }
    }
}

impl RecordSource for HttpRecordSource {
    fn fetch_page(&self, query: &FetchQuery, page: u32) -> Result<FetchBatch, SourceError> {
        tracing::debug!("GET {} window={} page={page}", self.url, query.window);

        let response = self
            .agent
            .get(&self.url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/json")
            .query("start_time", &format_timestamp(query.window.start))
            .query("end_time", &format_timestamp(query.window.end))
            .query("criteria", query.criteria.as_str())
            .query("per_page", &query.page_size.to_string())
            .query("page", &page.to_string())
            .call();

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                return Err(SourceError::Upstream {
                    status,
                    message: error_message(response),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(self.classify_transport(&transport));
            }
        };

        let body: LogsResponse = response.into_json().map_err(|err| {
            if is_timeout(&err) {
                self.timeout_error()
            } else {
                SourceError::Request(format!("invalid response body: {err}"))
            }
        })?;

        if let Ok(mut last) = self.last_fetch_at.lock() {
            *last = Some(Utc::now());
        }

        Ok(FetchBatch {
            records: body
                .data
                .unwrap_or_default()
                .into_iter()
                .map(RawRecord::from_value)
                .collect(),
            project: body.project.unwrap_or_default(),
            meta: body.meta.unwrap_or(Value::Null),
            links: body.links.unwrap_or_default(),
            pages: 1,
        })
    }
}

impl HttpRecordSource {
    fn classify_transport(&self, transport: &ureq::Transport) -> SourceError {
        if is_timeout(transport) {
            return self.timeout_error();
        }
        match transport.kind() {
            ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Io => {
                SourceError::Unreachable(transport.to_string())
            }
            _ => SourceError::Request(transport.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// RFC 3339, UTC, second precision: `2024-05-01T08:00:00Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(io.kind(), IoErrorKind::TimedOut | IoErrorKind::WouldBlock) {
                return true;
            }
        }
        current = err.source();
    }
    false
}

/// Pull a human-readable message out of an error response body.
fn error_message(response: ureq::Response) -> String {
    let status_text = response.status_text().to_string();
    let body = response.into_string().unwrap_or_default();
    if let Ok(json) = serde_json::from_str::<Value>(&body) {
        for key in ["message", "error"] {
            if let Some(message) = json.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status_text;
    }
    truncate(trimmed, MAX_ERROR_BODY)
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
