//! YAML configuration file with environment overrides.
//!
//! # Storage layout
//!
//! ```text
//! ~/.attendsync/
//!   config.yaml   (mode 0600, directory mode 0700)
//! ```
//!
//! # API pattern
//!
//! Every file function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Criteria;

pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// 1. Shape
// ---------------------------------------------------------------------------

/// Remote attendance-log API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub criteria: Criteria,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            endpoint: default_endpoint(),
            api_token: String::new(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            criteria: Criteria::default(),
        }
    }
}

/// Which table backend receives appended rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sheets,
    /// In-process table; nothing survives a restart. Useful for dry runs.
    Memory,
}

/// Tabular store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_sheets_api_base")]
    pub api_base: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            spreadsheet_id: String::new(),
            sheet_name: default_sheet_name(),
            access_token: String::new(),
            api_base: default_sheets_api_base(),
        }
    }
}

/// Scheduling and window settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
            lookback_hours: default_lookback_hours(),
            autostart: default_autostart(),
        }
    }
}

/// Root of `~/.attendsync/config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_endpoint() -> String {
    "/api/v1/logs".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_page_size() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    50
}
fn default_sheet_name() -> String {
    "Sheet1".to_string()
}
fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com".to_string()
}
fn default_schedule() -> String {
    "*/5 * * * *".to_string()
}
fn default_lookback_hours() -> u32 {
    24
}
fn default_autostart() -> bool {
    true
}

// ---------------------------------------------------------------------------
// 2. Overrides + validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply `ATTENDSYNC_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ATTENDSYNC_API_URL") {
            self.source.base_url = v;
        }
        if let Some(v) = get("ATTENDSYNC_API_TOKEN") {
            self.source.api_token = v;
        }
        if let Some(v) = get("ATTENDSYNC_SPREADSHEET_ID") {
            self.store.spreadsheet_id = v;
        }
        if let Some(v) = get("ATTENDSYNC_SHEET_NAME") {
            self.store.sheet_name = v;
        }
        if let Some(v) = get("ATTENDSYNC_SHEETS_TOKEN") {
            self.store.access_token = v;
        }
        if let Some(v) = get("ATTENDSYNC_SCHEDULE") {
            self.sync.schedule = v;
        }
        if let Some(v) = get("ATTENDSYNC_TIMEOUT_SECS") {
            self.source.timeout_secs = v.trim().parse().map_err(|e| ConfigError::Invalid {
                field: "source.timeout_secs",
                reason: format!("{e}"),
            })?;
        }
        Ok(())
    }

    /// Fail fast on settings the daemon cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.base_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "source.base_url",
            });
        }
        if self.source.api_token.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "source.api_token",
            });
        }
        if self.source.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "source.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.source.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "source.page_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.store.kind == StoreKind::Sheets {
            if self.store.spreadsheet_id.trim().is_empty() {
                return Err(ConfigError::Missing {
                    field: "store.spreadsheet_id",
                });
            }
            if self.store.access_token.trim().is_empty() {
                return Err(ConfigError::Missing {
                    field: "store.access_token",
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 3. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.attendsync/`: pure, no I/O.
pub fn config_dir_at(home: &Path) -> PathBuf {
    home.join(".attendsync")
}

/// `<home>/.attendsync/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    config_dir_at(home).join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

/// Load the config file as written, without env overrides.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<AppConfig, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<AppConfig, ConfigError> {
    load_at(&home()?)
}

/// Load, apply env overrides, validate. This is what the daemon runs on.
pub fn resolve_at(home: &Path) -> Result<AppConfig, ConfigError> {
    let mut config = load_at(home)?;
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// `resolve_at` convenience wrapper.
pub fn resolve() -> Result<AppConfig, ConfigError> {
    resolve_at(&home()?)
}

// ---------------------------------------------------------------------------
// 5. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config to `<home>/.attendsync/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let dir = config_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &AppConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 6. Init
// ---------------------------------------------------------------------------

/// Write `config` unless a config file already exists.
///
/// Idempotent: if the file already exists, loads and returns it unchanged
/// together with `false`.
pub fn init_at(home: &Path, config: AppConfig) -> Result<(AppConfig, bool), ConfigError> {
    if config_path_at(home).exists() {
        return Ok((load_at(home)?, false));
    }
    save_at(home, &config)?;
    Ok((config, true))
}

/// `init_at` convenience wrapper.
pub fn init(config: AppConfig) -> Result<(AppConfig, bool), ConfigError> {
    init_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
