//! attendsync core library: domain types, failure taxonomy, configuration.
//!
//! - [`types`]: attendance records, windows, sync results
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save / init / env overrides

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, SourceConfig, StoreConfig, StoreKind, SyncSettings};
pub use error::ConfigError;
pub use types::{
    AttendanceRecord, AttendanceType, Criteria, FailureKind, ProjectDescriptor, SyncMode,
    SyncResult, TimeWindow,
};
