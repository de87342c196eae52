//! Session discovery and the per-project binding side file.
//!
//! A provider session is described either by environment variables (when
//! the bridge runs inside the provider's pane) or by a JSON side file such
//! as `.codex-session` in the project directory. The side file also records
//! which record file the session was last bound to, so later invocations
//! start from the right log.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::error::{SessionError, SessionResult};
use crate::types::{Provider, RecordFormat};

/// Terminal multiplexer hosting the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminal {
    Tmux,
    Wezterm,
}

impl Terminal {
    pub fn parse(value: &str) -> SessionResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "tmux" => Ok(Terminal::Tmux),
            "wezterm" => Ok(Terminal::Wezterm),
            other => Err(SessionError::UnsupportedTerminal(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Terminal::Tmux => "tmux",
            Terminal::Wezterm => "wezterm",
        }
    }
}

/// Everything needed to reach one provider session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub provider: Provider,
    pub session_id: String,
    pub runtime_dir: PathBuf,
    pub terminal: Terminal,
    /// WezTerm pane id or tmux target.
    pub pane_id: Option<String>,
    /// Input pipe, when the provider reads from a FIFO.
    pub input_fifo: Option<PathBuf>,
    /// Record file the session was last bound to.
    pub preferred_log: Option<PathBuf>,
    pub provider_session_id: Option<String>,
    pub work_dir: Option<PathBuf>,
    pub project_hash: Option<String>,
    /// Side file this was loaded from; `None` for environment sessions.
    pub session_file: Option<PathBuf>,
}

impl SessionInfo {
    /// Load from the environment if the provider's session id is exported,
    /// otherwise from the side file in `project_dir`.
    pub fn load(provider: Provider, project_dir: &Path) -> SessionResult<Self> {
        let prefix = env_prefix(provider);
        if let Ok(session_id) = std::env::var(format!("{prefix}_SESSION_ID")) {
            return Self::from_env(provider, session_id, |name| std::env::var(name).ok());
        }
        Self::from_file(provider, &project_dir.join(provider.session_file_name()))
    }

    /// Build from environment lookups. `lookup` returns `None` for unset keys.
    pub fn from_env(
        provider: Provider,
        session_id: String,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> SessionResult<Self> {
        let prefix = env_prefix(provider);
        let var = |suffix: &str| lookup(&format!("{prefix}_{suffix}")).filter(|v| !v.is_empty());

        let runtime_dir = var("RUNTIME_DIR").ok_or_else(|| SessionError::MissingEnv {
            provider,
            name: format!("{prefix}_RUNTIME_DIR"),
        })?;
        let terminal = Terminal::parse(&var("TERMINAL").unwrap_or_default())?;
        let pane_id = match terminal {
            Terminal::Wezterm => var("WEZTERM_PANE"),
            Terminal::Tmux => var("TMUX_SESSION"),
        };

        Ok(Self {
            provider,
            session_id,
            runtime_dir: PathBuf::from(runtime_dir),
            terminal,
            pane_id,
            input_fifo: var("INPUT_FIFO").map(PathBuf::from),
            preferred_log: None,
            provider_session_id: None,
            work_dir: None,
            project_hash: None,
            session_file: None,
        })
    }

    /// Load an active session from a side file.
    pub fn from_file(provider: Provider, path: &Path) -> SessionResult<Self> {
        if !path.exists() {
            return Err(SessionError::NotFound { provider });
        }
        let data = read_object(path)?;

        if !data.get("active").and_then(Value::as_bool).unwrap_or(false) {
            return Err(SessionError::NotFound { provider });
        }
        let runtime_dir = PathBuf::from(string_field(&data, "runtime_dir").unwrap_or_default());
        if runtime_dir.as_os_str().is_empty() || !runtime_dir.exists() {
            return Err(SessionError::NotFound { provider });
        }

        let terminal = Terminal::parse(&string_field(&data, "terminal").unwrap_or_default())?;
        let pane_id = string_field(&data, "pane_id").or_else(|| match terminal {
            Terminal::Tmux => string_field(&data, "tmux_session"),
            Terminal::Wezterm => None,
        });
        let name = provider.as_str();

        Ok(Self {
            provider,
            session_id: string_field(&data, "session_id").unwrap_or_default(),
            runtime_dir,
            terminal,
            pane_id,
            input_fifo: string_field(&data, "input_fifo").map(PathBuf::from),
            preferred_log: string_field(&data, &format!("{name}_session_path"))
                .or_else(|| string_field(&data, "session_path"))
                .map(PathBuf::from),
            provider_session_id: string_field(&data, &format!("{name}_session_id")),
            work_dir: string_field(&data, "work_dir").map(PathBuf::from),
            project_hash: string_field(&data, &format!("{name}_project_hash")),
            session_file: Some(path.to_path_buf()),
        })
    }

    /// Whether input goes through a FIFO rather than a terminal pane.
    pub fn uses_fifo(&self) -> bool {
        self.terminal == Terminal::Tmux && self.input_fifo.is_some()
    }

    /// Record the binding in memory and, for file-backed sessions, on disk.
    pub fn bind(&mut self, binding: &SessionBinding) -> SessionResult<bool> {
        self.preferred_log = Some(binding.log_path.clone());
        if binding.provider_session_id.is_some() {
            self.provider_session_id = binding.provider_session_id.clone();
        }
        if binding.project_hash.is_some() {
            self.project_hash = binding.project_hash.clone();
        }

        match self.session_file.as_deref() {
            Some(path) if path.exists() => BindingStore::new(path).update(self.provider, binding),
            _ => Ok(false),
        }
    }
}

fn env_prefix(provider: Provider) -> &'static str {
    match provider {
        Provider::Codex => "CODEX",
        Provider::Gemini => "GEMINI",
    }
}

fn string_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn read_object(path: &Path) -> SessionResult<Map<String, Value>> {
    let invalid = |reason: String| SessionError::InvalidFile {
        path: path.to_path_buf(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let raw = raw.trim_start_matches('\u{feff}');
    match serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))? {
        Value::Object(map) => Ok(map),
        _ => Err(invalid("expected a JSON object".to_string())),
    }
}

/// A record file a session is bound to, plus ids derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    pub log_path: PathBuf,
    pub provider_session_id: Option<String>,
    pub project_hash: Option<String>,
}

impl SessionBinding {
    /// Derive the binding for `log_path`, extracting ids where the format allows.
    pub fn for_log(provider: Provider, log_path: &Path) -> Self {
        let project_hash = match provider.record_format() {
            RecordFormat::MutableDocument => log_path
                .parent()
                .and_then(Path::parent)
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned()),
            RecordFormat::AppendOnly => None,
        };

        Self {
            log_path: log_path.to_path_buf(),
            provider_session_id: extract_session_id(provider, log_path),
            project_hash,
        }
    }
}

fn uuid_pattern() -> Option<&'static regex::Regex> {
    static PATTERN: OnceLock<Option<regex::Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            regex::Regex::new(
                r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
            )
            .ok()
        })
        .as_ref()
}

/// Provider-side session id for a record file.
///
/// Append-only logs carry a UUID in the file name or the first line;
/// documents carry a `sessionId` field.
pub fn extract_session_id(provider: Provider, path: &Path) -> Option<String> {
    match provider.record_format() {
        RecordFormat::AppendOnly => {
            let pattern = uuid_pattern()?;
            let name = path.file_name()?.to_string_lossy();
            if let Some(found) = pattern.find(&name) {
                return Some(found.as_str().to_string());
            }
            let file = std::fs::File::open(path).ok()?;
            let mut first_line = String::new();
            BufReader::new(file).read_line(&mut first_line).ok()?;
            pattern.find(&first_line).map(|found| found.as_str().to_string())
        }
        RecordFormat::MutableDocument => {
            let bytes = std::fs::read(path).ok()?;
            let value: Value = serde_json::from_slice(&bytes).ok()?;
            value
                .get("sessionId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        }
    }
}

/// Atomic read-modify-write access to a session side file.
pub struct BindingStore {
    path: PathBuf,
}

impl BindingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge `binding` into the file, keeping every key it does not own.
    ///
    /// Returns whether anything changed.
    pub fn update(&self, provider: Provider, binding: &SessionBinding) -> SessionResult<bool> {
        let mut data = read_object(&self.path)?;
        let name = provider.as_str();
        let mut changed = false;

        let mut set = |key: String, value: &str| {
            if data.get(&key).and_then(Value::as_str) != Some(value) {
                data.insert(key, Value::String(value.to_string()));
                changed = true;
            }
        };

        set(format!("{name}_session_path"), &binding.log_path.to_string_lossy());
        if let Some(id) = binding.provider_session_id.as_deref() {
            set(format!("{name}_session_id"), id);
        }
        if let Some(hash) = binding.project_hash.as_deref() {
            set(format!("{name}_project_hash"), hash);
        }

        if changed {
            self.write_atomic(&data)?;
            crate::debug_event!(provider, "binding updated", "{}", binding.log_path.display());
        }
        Ok(changed)
    }

    /// Write through a temp file in the same directory, then rename over.
    fn write_atomic(&self, data: &Map<String, Value>) -> SessionResult<()> {
        let write_err = |source: std::io::Error| SessionError::BindingWrite {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let json = serde_json::to_string_pretty(data).map_err(|e| write_err(e.into()))?;
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        temp.write_all(json.as_bytes()).map_err(write_err)?;
        temp.flush().map_err(write_err)?;
        temp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn write_side_file(dir: &Path, provider: Provider, value: Value) -> PathBuf {
        let path = dir.join(provider.session_file_name());
        fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_load_active_side_file() {
        let temp = TempDir::new().unwrap();
        let runtime = temp.path().join("run");
        fs::create_dir_all(&runtime).unwrap();
        write_side_file(
            temp.path(),
            Provider::Gemini,
            json!({
                "active": true,
                "session_id": "ccb-1",
                "runtime_dir": runtime,
                "terminal": "wezterm",
                "pane_id": "42",
                "gemini_session_path": "/tmp/x/chats/session-1.json",
            }),
        );

        let info = SessionInfo::from_file(
            Provider::Gemini,
            &temp.path().join(Provider::Gemini.session_file_name()),
        )
        .unwrap();
        assert_eq!(info.terminal, Terminal::Wezterm);
        assert_eq!(info.pane_id.as_deref(), Some("42"));
        assert_eq!(
            info.preferred_log.as_deref(),
            Some(Path::new("/tmp/x/chats/session-1.json"))
        );
        assert!(!info.uses_fifo());
    }

    #[test]
    fn test_inactive_or_missing_runtime_is_no_session() {
        let temp = TempDir::new().unwrap();
        let path = write_side_file(
            temp.path(),
            Provider::Codex,
            json!({"active": false, "runtime_dir": temp.path()}),
        );
        assert!(matches!(
            SessionInfo::from_file(Provider::Codex, &path),
            Err(SessionError::NotFound { .. })
        ));

        let path = write_side_file(
            temp.path(),
            Provider::Codex,
            json!({"active": true, "runtime_dir": temp.path().join("gone")}),
        );
        assert!(matches!(
            SessionInfo::from_file(Provider::Codex, &path),
            Err(SessionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_from_env() {
        let vars: HashMap<&str, &str> = [
            ("CODEX_RUNTIME_DIR", "/run/codex"),
            ("CODEX_INPUT_FIFO", "/run/codex/input.fifo"),
            ("CODEX_TMUX_SESSION", "codex-1"),
        ]
        .into_iter()
        .collect();

        let info = SessionInfo::from_env(Provider::Codex, "s".into(), |key| {
            vars.get(key).map(|v| v.to_string())
        })
        .unwrap();
        assert_eq!(info.terminal, Terminal::Tmux);
        assert_eq!(info.pane_id.as_deref(), Some("codex-1"));
        assert!(info.uses_fifo());

        let missing = SessionInfo::from_env(Provider::Gemini, "s".into(), |_| None);
        assert!(matches!(missing, Err(SessionError::MissingEnv { .. })));
    }

    #[test]
    fn test_update_preserves_unknown_keys() {
        let temp = TempDir::new().unwrap();
        let path = write_side_file(
            temp.path(),
            Provider::Codex,
            json!({"active": true, "custom": {"keep": 1}}),
        );
        let store = BindingStore::new(&path);
        let binding = SessionBinding {
            log_path: PathBuf::from("/logs/rollout.jsonl"),
            provider_session_id: Some("abc".into()),
            project_hash: None,
        };

        assert!(store.update(Provider::Codex, &binding).unwrap());
        assert!(!store.update(Provider::Codex, &binding).unwrap());

        let data: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(data["custom"]["keep"], 1);
        assert_eq!(data["codex_session_path"], "/logs/rollout.jsonl");
        assert_eq!(data["codex_session_id"], "abc");
    }

    #[test]
    fn test_extract_session_ids() {
        let temp = TempDir::new().unwrap();
        let log = temp
            .path()
            .join("rollout-2025-01-01T00-00-00-0199a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b.jsonl");
        fs::write(&log, "{}\n").unwrap();
        assert_eq!(
            extract_session_id(Provider::Codex, &log).as_deref(),
            Some("0199a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b")
        );

        let doc = temp.path().join("session-1.json");
        fs::write(&doc, r#"{"sessionId":"g-1","messages":[]}"#).unwrap();
        assert_eq!(extract_session_id(Provider::Gemini, &doc).as_deref(), Some("g-1"));
    }
}
