//! Application configuration for orgscan.
//!
//! User config lives at `~/.orgscan/orgscan.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OrgScanError, Result};
use crate::types::TopicProfile;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "orgscan.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".orgscan";

/// Default journal database file name inside the config directory.
const JOURNAL_FILE_NAME: &str = "journal.db";

// ---------------------------------------------------------------------------
// Config structs (matching orgscan.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run policy defaults.
    #[serde(default)]
    pub run: RunDefaults,

    /// Search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Spreadsheet backend settings.
    #[serde(default)]
    pub sheet: SheetConfig,

    /// Run journal settings.
    #[serde(default)]
    pub journal: JournalConfig,

    /// Additional or overriding topic profiles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<TopicProfile>,
}

/// `[run]` section. Caps of 0 mean "unlimited".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDefaults {
    #[serde(default)]
    pub skip_existing: bool,

    #[serde(default)]
    pub max_rows_examined: usize,

    #[serde(default)]
    pub max_new_rows: usize,

    /// Pause after every provider call, in seconds.
    #[serde(default = "default_request_delay")]
    pub request_delay_seconds: f64,

    /// Items fetched per query.
    #[serde(default = "default_result_count")]
    pub result_count: u32,

    /// Hard limit on a single provider call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Extra attempts after a provider error before the row is recorded as failed.
    #[serde(default = "default_provider_retries")]
    pub provider_retries: u32,

    /// First retry backoff in seconds; doubles on each further attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: f64,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            skip_existing: false,
            max_rows_examined: 0,
            max_new_rows: 0,
            request_delay_seconds: default_request_delay(),
            result_count: default_result_count(),
            request_timeout_secs: default_request_timeout(),
            provider_retries: default_provider_retries(),
            retry_backoff_seconds: default_retry_backoff(),
        }
    }
}

fn default_request_delay() -> f64 {
    1.0
}
fn default_result_count() -> u32 {
    10
}
fn default_request_timeout() -> u64 {
    60
}
fn default_provider_retries() -> u32 {
    1
}
fn default_retry_backoff() -> f64 {
    2.0
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Provider endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Provider engine parameter.
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Interface language (`hl`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Result age filter (`tbs`), e.g. `qdr:y8` for the last eight years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            endpoint: default_search_endpoint(),
            engine: default_engine(),
            locale: Some("en".into()),
            time_window: None,
        }
    }
}

fn default_search_key_env() -> String {
    "SERPAPI_API_KEY".into()
}
fn default_search_endpoint() -> String {
    "https://serpapi.com/search".into()
}
fn default_engine() -> String {
    "google".into()
}

/// Which spreadsheet implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetBackend {
    #[default]
    Csv,
    Google,
}

/// `[sheet]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetConfig {
    #[serde(default)]
    pub backend: SheetBackend,

    /// CSV file path (csv backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Spreadsheet ID from the sheet URL (google backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,

    /// Worksheet (tab) name (google backend).
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Header of the column holding organization names.
    #[serde(default = "default_name_column")]
    pub name_column: String,

    /// Name of the env var holding an OAuth access token (google backend).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Sheets API base URL.
    #[serde(default = "default_sheets_endpoint")]
    pub endpoint: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            backend: SheetBackend::default(),
            path: None,
            spreadsheet_id: None,
            sheet_name: default_sheet_name(),
            name_column: default_name_column(),
            token_env: default_token_env(),
            endpoint: default_sheets_endpoint(),
        }
    }
}

fn default_sheet_name() -> String {
    "Sheet1".into()
}
fn default_name_column() -> String {
    "Name".into()
}
fn default_token_env() -> String {
    "GOOGLE_ACCESS_TOKEN".into()
}
fn default_sheets_endpoint() -> String {
    "https://sheets.googleapis.com/v4/spreadsheets".into()
}

/// `[journal]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database path (defaults to `~/.orgscan/journal.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Immutable run policy, built once at startup and passed into the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Skip rows whose verdict cell is already filled.
    pub skip_existing: bool,
    /// Stop once this many rows have been examined (skips included).
    pub max_rows_examined: Option<usize>,
    /// Stop once this many rows have been newly classified.
    pub max_new_rows: Option<usize>,
    /// Pause after every provider call.
    pub request_delay: Duration,
    /// Items fetched per query.
    pub result_count: u32,
    /// Hard limit on a single provider call.
    pub request_timeout: Duration,
    /// Extra attempts after a provider error.
    pub provider_retries: u32,
    /// First retry backoff; doubles per attempt.
    pub retry_backoff: Duration,
    /// Interface language passed to the provider.
    pub locale: Option<String>,
    /// Result age filter passed to the provider.
    pub time_window: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        let run = &config.run;
        Self {
            skip_existing: run.skip_existing,
            max_rows_examined: cap(run.max_rows_examined),
            max_new_rows: cap(run.max_new_rows),
            request_delay: seconds(run.request_delay_seconds),
            result_count: run.result_count.max(1),
            request_timeout: Duration::from_secs(run.request_timeout_secs.max(1)),
            provider_retries: run.provider_retries,
            retry_backoff: seconds(run.retry_backoff_seconds),
            locale: config.search.locale.clone(),
            time_window: config.search.time_window.clone(),
        }
    }
}

/// Convert a "0 means unlimited" count into an optional cap.
pub fn cap(value: usize) -> Option<usize> {
    (value > 0).then_some(value)
}

/// Longest accepted delay or backoff, in seconds (one day).
const MAX_PAUSE_SECONDS: f64 = 86_400.0;

/// Convert fractional seconds to a `Duration`, clamping negatives and NaN to
/// zero and saturating values too large to represent.
pub fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

impl RunDefaults {
    /// Reject pause settings that are not a finite number of seconds in
    /// `0..=86400`.
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("request_delay_seconds", self.request_delay_seconds),
            ("retry_backoff_seconds", self.retry_backoff_seconds),
        ] {
            if !value.is_finite() || !(0.0..=MAX_PAUSE_SECONDS).contains(&value) {
                return Err(OrgScanError::config(format!(
                    "[run] {key} must be between 0 and {MAX_PAUSE_SECONDS} seconds, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.orgscan/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| OrgScanError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.orgscan/orgscan.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the journal database path from config, falling back to the config dir.
pub fn journal_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.journal.path {
        Some(path) => Ok(path.clone()),
        None => Ok(config_dir()?.join(JOURNAL_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| OrgScanError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        OrgScanError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.run.validate()?;
    for topic in &config.topics {
        topic.validate()?;
    }
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| OrgScanError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| OrgScanError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| OrgScanError::io(path, e))?;
    tracing::info!(?path, "created default config file");
    Ok(())
}

/// Read a secret from the named env var; missing or blank is an auth error.
pub fn read_secret(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(OrgScanError::Auth(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}
