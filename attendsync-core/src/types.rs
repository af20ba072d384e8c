//! Domain types for attendance synchronisation.
//!
//! Timestamps that come from upstream (`sync_time`, `logged_time`) are kept as
//! the strings the source sent; only values produced locally (sync windows,
//! attempt start times) are `DateTime<Utc>`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How an access event was captured at the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceType {
    Card,
    Fingerprint,
    Face,
}

impl AttendanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceType::Card => "card",
            AttendanceType::Fingerprint => "fingerprint",
            AttendanceType::Face => "face",
        }
    }
}

impl fmt::Display for AttendanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" => Ok(Self::Card),
            "fingerprint" => Ok(Self::Fingerprint),
            "face" => Ok(Self::Face),
            other => Err(format!(
                "unknown attendance type '{other}'; expected: card, fingerprint, face"
            )),
        }
    }
}

/// Which upstream timestamp the query window applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criteria {
    #[default]
    SyncTime,
    LoggedTime,
}

impl Criteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criteria::SyncTime => "sync_time",
            Criteria::LoggedTime => "logged_time",
        }
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Criteria {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sync_time" | "sync" => Ok(Self::SyncTime),
            "logged_time" | "logged" => Ok(Self::LoggedTime),
            other => Err(format!(
                "unknown criteria '{other}'; expected: sync_time, logged_time"
            )),
        }
    }
}

/// Classification attached to a failed operation.
///
/// Serialises to the bare variant name (`"UpstreamTimeout"`), which is the
/// string callers see in the `error` field of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    UpstreamTimeout,
    UpstreamError,
    UpstreamUnreachable,
    RequestError,
    StoreError,
    AlreadyRunning,
    InvalidSchedule,
    /// Manual sync or query with `start >= end`.
    InvalidWindow,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UpstreamTimeout => "UpstreamTimeout",
            FailureKind::UpstreamError => "UpstreamError",
            FailureKind::UpstreamUnreachable => "UpstreamUnreachable",
            FailureKind::RequestError => "RequestError",
            FailureKind::StoreError => "StoreError",
            FailureKind::AlreadyRunning => "AlreadyRunning",
            FailureKind::InvalidSchedule => "InvalidSchedule",
            FailureKind::InvalidWindow => "InvalidWindow",
            FailureKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which entry point started a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Auto,
    Manual,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Manual => write!(f, "manual"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Batch-level project metadata the source attaches to every response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    #[serde(default, deserialize_with = "lenient_text")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub organization: String,
}

/// Scalar upstream value accepted where text is expected.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Other(serde::de::IgnoredAny),
}

/// Strings pass through, numbers and booleans are rendered, `null` and
/// structured values become empty.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Text(s)) => s,
        Some(Scalar::Int(n)) => n.to_string(),
        Some(Scalar::UInt(n)) => n.to_string(),
        Some(Scalar::Float(n)) => n.to_string(),
        Some(Scalar::Bool(b)) => b.to_string(),
        Some(Scalar::Other(_)) | None => String::new(),
    })
}

/// One validated, normalised access event. `uid` is the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub uid: String,
    pub sync_time: String,
    pub logged_time: String,
    #[serde(rename = "type")]
    pub kind: AttendanceType,
    pub device_id: String,
    pub person_id: String,
    pub rfid: String,
    pub location: String,
    pub primary_display_text: String,
    pub secondary_display_text: String,
    pub project: ProjectDescriptor,
}

/// Half-open time range `[start, end)` used to query the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `[end - hours, end)`.
    pub fn trailing_hours(end: DateTime<Utc>, hours: u32) -> Self {
        Self {
            start: end - Duration::hours(i64::from(hours)),
            end,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.start < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Outcome record of one sync attempt, retained as the orchestrator's
/// last result until the next attempt replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    pub mode: SyncMode,
    pub window: TimeWindow,
    pub records_fetched: usize,
    pub records_dropped: usize,
    pub records_added: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureKind>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
