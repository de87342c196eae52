//! Delivery of a prompt into the provider's input channel.

use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::binding::{SessionInfo, Terminal};
use super::error::TransmitError;

/// Correlation marker for one outgoing message: `ask-<unix secs>-<pid>`.
pub fn correlation_marker() -> String {
    format!("ask-{}-{}", chrono::Utc::now().timestamp(), std::process::id())
}

/// Capability to push text into a provider session.
pub trait Transmit: Send {
    /// Deliver `text`; `marker` correlates it when the channel carries metadata.
    fn send(&self, text: &str, marker: &str) -> Result<(), TransmitError>;

    /// Whether the target can currently receive input.
    fn is_alive(&self) -> bool {
        true
    }

    /// Short description for status output, e.g. `tmux:codex-1`.
    fn describe(&self) -> String;
}

/// Pick the channel a session is configured for.
pub fn transmit_for(info: &SessionInfo) -> Result<Box<dyn Transmit>, TransmitError> {
    if info.uses_fifo() {
        if let Some(path) = info.input_fifo.clone() {
            return Ok(Box::new(FifoTransmit::new(path)));
        }
    }

    let pane = info.pane_id.clone().ok_or_else(|| {
        TransmitError::NotConfigured(format!("{} pane id not found", info.terminal.as_str()))
    })?;
    Ok(match info.terminal {
        Terminal::Tmux => Box::new(TmuxTransmit::new(pane)),
        Terminal::Wezterm => Box::new(WeztermTransmit::new(pane)),
    })
}

#[derive(Serialize)]
struct FifoMessage<'a> {
    content: &'a str,
    timestamp: String,
    marker: &'a str,
}

/// Writes one JSON line per message into a named pipe.
pub struct FifoTransmit {
    path: PathBuf,
}

impl FifoTransmit {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Transmit for FifoTransmit {
    fn send(&self, text: &str, marker: &str) -> Result<(), TransmitError> {
        if !self.path.exists() {
            return Err(TransmitError::FifoMissing {
                path: self.path.clone(),
            });
        }
        let io_err = |source: std::io::Error| TransmitError::Io {
            path: self.path.clone(),
            source,
        };

        let message = FifoMessage {
            content: text,
            timestamp: chrono::Local::now().to_rfc3339(),
            marker,
        };
        let mut line = serde_json::to_string(&message).map_err(|e| io_err(e.into()))?;
        line.push('\n');

        let mut pipe = std::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(io_err)?;
        pipe.write_all(line.as_bytes()).map_err(io_err)?;
        pipe.flush().map_err(io_err)
    }

    fn is_alive(&self) -> bool {
        self.path.exists()
    }

    fn describe(&self) -> String {
        format!("fifo:{}", self.path.display())
    }
}

/// Types into a tmux target with `send-keys`.
pub struct TmuxTransmit {
    target: String,
}

impl TmuxTransmit {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Transmit for TmuxTransmit {
    fn send(&self, text: &str, _marker: &str) -> Result<(), TransmitError> {
        run("tmux", &["send-keys", "-t", &self.target, "-l", text])?;
        run("tmux", &["send-keys", "-t", &self.target, "Enter"])
    }

    fn is_alive(&self) -> bool {
        run("tmux", &["has-session", "-t", &self.target]).is_ok()
    }

    fn describe(&self) -> String {
        format!("tmux:{}", self.target)
    }
}

/// Types into a WezTerm pane with `wezterm cli send-text`.
pub struct WeztermTransmit {
    pane_id: String,
}

impl WeztermTransmit {
    pub fn new(pane_id: impl Into<String>) -> Self {
        Self {
            pane_id: pane_id.into(),
        }
    }
}

impl Transmit for WeztermTransmit {
    fn send(&self, text: &str, _marker: &str) -> Result<(), TransmitError> {
        let pane = self.pane_id.as_str();
        run("wezterm", &["cli", "send-text", "--pane-id", pane, "--no-paste", text])?;
        run("wezterm", &["cli", "send-text", "--pane-id", pane, "--no-paste", "\r"])
    }

    fn is_alive(&self) -> bool {
        let output = Command::new("wezterm")
            .args(["cli", "list", "--format", "json"])
            .stderr(Stdio::null())
            .output();
        let Ok(output) = output else {
            return false;
        };
        if !output.status.success() {
            return false;
        }
        serde_json::from_slice::<serde_json::Value>(&output.stdout)
            .ok()
            .and_then(|panes| panes.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .any(|pane| pane["pane_id"].to_string() == self.pane_id)
    }

    fn describe(&self) -> String {
        format!("wezterm:{}", self.pane_id)
    }
}

fn run(program: &str, args: &[&str]) -> Result<(), TransmitError> {
    let command = format!("{program} {}", args.first().copied().unwrap_or_default());
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| TransmitError::Command {
            command: command.clone(),
            details: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(TransmitError::Command {
            command,
            details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_marker_format() {
        let marker = correlation_marker();
        let parts: Vec<&str> = marker.splitn(3, '-').collect();
        assert_eq!(parts[0], "ask");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2], std::process::id().to_string());
    }

    #[test]
    fn test_fifo_missing() {
        let temp = TempDir::new().unwrap();
        let transmit = FifoTransmit::new(temp.path().join("input.fifo"));
        assert!(!transmit.is_alive());
        assert!(matches!(
            transmit.send("hi", "m"),
            Err(TransmitError::FifoMissing { .. })
        ));
    }

    #[test]
    fn test_fifo_writes_json_line() {
        // A regular file stands in for the pipe
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("input.fifo");
        std::fs::write(&path, "").unwrap();

        FifoTransmit::new(&path).send("hello\nworld", "ask-1-2").unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(value["content"], "hello\nworld");
        assert_eq!(value["marker"], "ask-1-2");
    }

    #[test]
    fn test_transmit_for_requires_pane() {
        let info = SessionInfo {
            provider: crate::types::Provider::Gemini,
            session_id: "s".into(),
            runtime_dir: PathBuf::from("/tmp"),
            terminal: Terminal::Wezterm,
            pane_id: None,
            input_fifo: None,
            preferred_log: None,
            provider_session_id: None,
            work_dir: None,
            project_hash: None,
            session_file: None,
        };
        assert!(matches!(
            transmit_for(&info),
            Err(TransmitError::NotConfigured(_))
        ));
    }
}
