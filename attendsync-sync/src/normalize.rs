//! Record validator / normaliser.
//!
//! A raw record is kept only if `uid`, `sync_time`, `logged_time`, `type`,
//! `device_id` and `person_identifier` are all present and non-blank and
//! `type` is one of `card | fingerprint | face`. Optional text fields default
//! to empty strings. Dropping a record never fails the batch.

use std::fmt;

use attendsync_core::{AttendanceRecord, AttendanceType, ProjectDescriptor};

use crate::source::RawRecord;

/// Why a record was excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingField(&'static str),
    UnknownType(String),
    /// The upstream element was not a record object at all.
    Malformed(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingField(field) => write!(f, "missing required field `{field}`"),
            DropReason::UnknownType(kind) => write!(f, "unknown type `{kind}`"),
            DropReason::Malformed(detail) => write!(f, "malformed record: {detail}"),
        }
    }
}

/// A record excluded by validation. Counted and logged, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDrop {
    pub uid: Option<String>,
    pub reason: DropReason,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub records: Vec<AttendanceRecord>,
    pub dropped: Vec<ValidationDrop>,
}

/// Validate and normalise `raw`, attaching `project` to every kept record.
/// Input order is preserved.
pub fn normalize(raw: Vec<RawRecord>, project: &ProjectDescriptor) -> Normalized {
    let mut out = Normalized::default();
    for record in raw {
        match normalize_one(record, project) {
            Ok(record) => out.records.push(record),
            Err(drop) => {
                tracing::warn!(
                    "dropping record uid={}: {}",
                    drop.uid.as_deref().unwrap_or("<none>"),
                    drop.reason
                );
                out.dropped.push(drop);
            }
        }
    }
    if !out.dropped.is_empty() {
        tracing::info!(
            "validation kept {} record(s), dropped {}",
            out.records.len(),
            out.dropped.len()
        );
    }
    out
}

fn normalize_one(
    raw: RawRecord,
    project: &ProjectDescriptor,
) -> Result<AttendanceRecord, ValidationDrop> {
    let uid = present(raw.uid.clone());
    if let Some(detail) = raw.malformed {
        return Err(ValidationDrop {
            uid,
            reason: DropReason::Malformed(detail),
        });
    }
    let reject = |reason: DropReason| ValidationDrop {
        uid: uid.clone(),
        reason,
    };

    let Some(uid_value) = uid.clone() else {
        return Err(reject(DropReason::MissingField("uid")));
    };
    let sync_time = required(raw.sync_time, "sync_time").map_err(&reject)?;
    let logged_time = required(raw.logged_time, "logged_time").map_err(&reject)?;
    let kind_text = required(raw.kind, "type").map_err(&reject)?;
    let device_id = required(raw.device_id, "device_id").map_err(&reject)?;
    let person_id = required(raw.person_identifier, "person_identifier").map_err(&reject)?;

    let kind: AttendanceType = kind_text
        .parse()
        .map_err(|_| reject(DropReason::UnknownType(kind_text.clone())))?;

    Ok(AttendanceRecord {
        uid: uid_value,
        sync_time,
        logged_time,
        kind,
        device_id,
        person_id,
        rfid: raw.rfid.unwrap_or_default(),
        location: raw.location.unwrap_or_default(),
        primary_display_text: raw.primary_display_text.unwrap_or_default(),
        secondary_display_text: raw.secondary_display_text.unwrap_or_default(),
        project: project.clone(),
    })
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DropReason> {
    present(value).ok_or(DropReason::MissingField(field))
}
