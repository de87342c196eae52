//! Configuration module for the bridge.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.ccb/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CCB_` and use double underscores
//! to separate nested levels:
//! - `CCB_ASK__TIMEOUT_ACTION=background` sets `ask.timeout_action`
//! - `CCB_WATCH__POLL_INTERVAL_MS=20` sets `watch.poll_interval_ms`
//! - `CCB_GEMINI__CATCH_UP_SECS=120` sets `gemini.catch_up_secs`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backoff::Backoff;
use crate::comm::TimeoutAction;
use crate::types::Provider;

/// Directory holding the project configuration.
pub const CONFIG_DIR: &str = ".ccb";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .ccb is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// File change detection
    #[serde(default)]
    pub watch: WatchConfig,

    /// End-of-turn markers
    #[serde(default)]
    pub reply: ReplyConfig,

    /// Append-only record provider
    #[serde(default)]
    pub codex: CodexConfig,

    /// Mutable document provider
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Synchronous ask behaviour
    #[serde(default)]
    pub ask: AskConfig,

    /// Fan-out behaviour
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all modules (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `ccbridge::reader = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

/// Which change detection mechanism the watcher uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchBackend {
    /// Kernel notification when available, polling otherwise.
    Auto,
    /// Kernel notification only (falls back to polling on setup failure).
    Notify,
    /// Timed polling.
    Poll,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_watch_backend")]
    pub backend: WatchBackend,

    /// Poll interval in milliseconds, clamped to 10..=500
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReplyConfig {
    /// Marker the assistant writes at the end of a turn
    #[serde(default = "default_end_marker")]
    pub end_marker: String,

    /// Older markers that are stripped but do not complete a turn
    #[serde(default = "default_legacy_markers")]
    pub legacy_markers: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CodexConfig {
    /// Root of the newline-delimited session logs
    #[serde(default = "default_codex_root")]
    pub session_root: PathBuf,

    /// Timeout used when `send --wait` gives none
    #[serde(default = "default_codex_timeout")]
    pub default_timeout_secs: u64,

    /// Upper bound on bytes read backwards by `latest_reply`
    #[serde(default = "default_tail_scan_bytes")]
    pub tail_scan_bytes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeminiConfig {
    /// Root holding `<project_hash>/chats/session-*.json`
    #[serde(default = "default_gemini_root")]
    pub root: PathBuf,

    /// Force a project hash instead of hashing the work dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_hash: Option<String>,

    #[serde(default = "default_gemini_timeout")]
    pub default_timeout_secs: u64,

    /// Re-read the document at least this often even if stat looks unchanged
    #[serde(default = "default_force_read_interval_ms")]
    pub force_read_interval_ms: u64,

    #[serde(default = "default_rescan_interval_ms")]
    pub rescan_interval_ms: u64,

    /// Grace window for a streaming turn to reach its end marker
    #[serde(default = "default_catch_up_secs")]
    pub catch_up_secs: u64,

    /// Never let the grace window outlive the caller's timeout
    #[serde(default = "default_true")]
    pub cap_catch_up_to_timeout: bool,

    /// Attempts to parse a document that is mid-rewrite
    #[serde(default = "default_parse_retries")]
    pub parse_retries: u32,

    /// First delay between parse attempts
    #[serde(default = "default_parse_backoff_floor_ms")]
    pub parse_backoff_floor_ms: u64,

    /// Longest delay between parse attempts
    #[serde(default = "default_parse_backoff_ceiling_ms")]
    pub parse_backoff_ceiling_ms: u64,

    #[serde(default = "default_parse_backoff_multiplier")]
    pub parse_backoff_multiplier: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AskConfig {
    /// Choice taken on timeout when stdin is not a terminal
    #[serde(default = "default_timeout_action")]
    pub timeout_action: TimeoutAction,

    /// How long the interactive timeout prompt waits for input
    #[serde(default = "default_prompt_timeout_secs")]
    pub prompt_timeout_secs: u64,

    /// Wait slice length for unlimited waits
    #[serde(default = "default_unlimited_slice_secs")]
    pub unlimited_slice_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatchConfig {
    /// Effective timeout when a fan-out is asked to wait forever
    #[serde(default = "default_unlimited_cap_secs")]
    pub unlimited_cap_secs: u64,

    /// Providers used when none are named
    #[serde(default = "default_providers")]
    pub default_providers: Vec<Provider>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_watch_backend() -> WatchBackend {
    WatchBackend::Auto
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_end_marker() -> String {
    "[CCB_REPLY_END]".to_string()
}
fn default_legacy_markers() -> Vec<String> {
    vec!["[GEMINI_TURN_END]".to_string()]
}
fn default_codex_root() -> PathBuf {
    if let Ok(root) = std::env::var("CODEX_SESSION_ROOT") {
        return PathBuf::from(root);
    }
    home_dir().join(".codex").join("sessions")
}
fn default_gemini_root() -> PathBuf {
    if let Ok(root) = std::env::var("GEMINI_ROOT") {
        return PathBuf::from(root);
    }
    home_dir().join(".gemini").join("tmp")
}
fn default_codex_timeout() -> u64 {
    30
}
fn default_gemini_timeout() -> u64 {
    60
}
fn default_rescan_interval_ms() -> u64 {
    1000
}
fn default_tail_scan_bytes() -> u64 {
    256 * 1024
}
fn default_force_read_interval_ms() -> u64 {
    1000
}
fn default_catch_up_secs() -> u64 {
    600
}
fn default_parse_backoff_floor_ms() -> u64 {
    50
}

fn default_parse_backoff_ceiling_ms() -> u64 {
    250
}

fn default_parse_backoff_multiplier() -> f64 {
    2.0
}

fn default_parse_retries() -> u32 {
    10
}
fn default_timeout_action() -> TimeoutAction {
    TimeoutAction::Cancel
}
fn default_prompt_timeout_secs() -> u64 {
    10
}
fn default_unlimited_slice_secs() -> u64 {
    30
}
fn default_unlimited_cap_secs() -> u64 {
    600
}
fn default_providers() -> Vec<Provider> {
    Provider::ALL.to_vec()
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            logging: LoggingConfig::default(),
            watch: WatchConfig::default(),
            reply: ReplyConfig::default(),
            codex: CodexConfig::default(),
            gemini: GeminiConfig::default(),
            ask: AskConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            backend: default_watch_backend(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            end_marker: default_end_marker(),
            legacy_markers: default_legacy_markers(),
        }
    }
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            session_root: default_codex_root(),
            default_timeout_secs: default_codex_timeout(),
            tail_scan_bytes: default_tail_scan_bytes(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            root: default_gemini_root(),
            project_hash: None,
            default_timeout_secs: default_gemini_timeout(),
            force_read_interval_ms: default_force_read_interval_ms(),
            rescan_interval_ms: default_rescan_interval_ms(),
            catch_up_secs: default_catch_up_secs(),
            cap_catch_up_to_timeout: true,
            parse_retries: default_parse_retries(),
            parse_backoff_floor_ms: default_parse_backoff_floor_ms(),
            parse_backoff_ceiling_ms: default_parse_backoff_ceiling_ms(),
            parse_backoff_multiplier: default_parse_backoff_multiplier(),
        }
    }
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            timeout_action: default_timeout_action(),
            prompt_timeout_secs: default_prompt_timeout_secs(),
            unlimited_slice_secs: default_unlimited_slice_secs(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            unlimited_cap_secs: default_unlimited_cap_secs(),
            default_providers: default_providers(),
        }
    }
}

impl WatchConfig {
    /// Poll interval clamped to the 10ms..=500ms window.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(10, 500))
    }
}

impl GeminiConfig {
    pub fn force_read_interval(&self) -> Duration {
        Duration::from_millis(self.force_read_interval_ms.clamp(200, 5000))
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms.clamp(200, 2000))
    }

    pub fn catch_up(&self) -> Duration {
        Duration::from_secs(self.catch_up_secs)
    }

    /// Delays between attempts to parse a document caught mid-rewrite.
    pub fn parse_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.parse_backoff_floor_ms.max(1)),
            Duration::from_millis(self.parse_backoff_ceiling_ms),
            self.parse_backoff_multiplier,
        )
    }
}

impl Settings {
    /// Default wait for a provider when the caller gives none.
    pub fn default_timeout(&self, provider: Provider) -> u64 {
        match provider {
            Provider::Codex => self.codex.default_timeout_secs,
            Provider::Gemini => self.gemini.default_timeout_secs,
        }
    }

    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .ccb directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore stays
            .merge(Env::prefixed("CCB_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the workspace config by looking for a .ccb directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .ccb is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Directory session side files live in.
    pub fn project_dir(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.reply.end_marker, "[CCB_REPLY_END]");
        assert_eq!(settings.ask.timeout_action, TimeoutAction::Cancel);
        assert_eq!(settings.dispatch.default_providers, Provider::ALL.to_vec());
        assert!(settings.gemini.cap_catch_up_to_timeout);
    }

    #[test]
    fn test_parse_backoff_from_settings() {
        let mut gemini = GeminiConfig::default();
        assert_eq!(
            gemini.parse_backoff(),
            Backoff::new(Duration::from_millis(50), Duration::from_millis(250), 2.0)
        );

        gemini.parse_backoff_floor_ms = 0;
        gemini.parse_backoff_ceiling_ms = 20;
        gemini.parse_backoff_multiplier = 3.0;
        let backoff = gemini.parse_backoff();
        assert_eq!(backoff.floor, Duration::from_millis(1));
        assert_eq!(backoff.ceiling, Duration::from_millis(20));
        assert_eq!(backoff.multiplier, 3.0);
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        let mut watch = WatchConfig::default();
        watch.poll_interval_ms = 1;
        assert_eq!(watch.poll_interval(), Duration::from_millis(10));
        watch.poll_interval_ms = 10_000;
        assert_eq!(watch.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[watch]
backend = "poll"
poll_interval_ms = 20

[ask]
timeout_action = "background"

[gemini]
catch_up_secs = 30
cap_catch_up_to_timeout = false
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.watch.backend, WatchBackend::Poll);
        assert_eq!(settings.watch.poll_interval_ms, 20);
        assert_eq!(settings.ask.timeout_action, TimeoutAction::Background);
        assert_eq!(settings.gemini.catch_up_secs, 30);
        assert!(!settings.gemini.cap_catch_up_to_timeout);
        // Untouched sections keep their defaults
        assert_eq!(settings.codex.default_timeout_secs, 30);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.ask.prompt_timeout_secs = 3;
        settings.dispatch.unlimited_cap_secs = 90;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.ask.prompt_timeout_secs, 3);
        assert_eq!(loaded.dispatch.unlimited_cap_secs, 90);
    }
}
