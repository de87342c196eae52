//! Liveness checks run before a prompt is sent.

use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::binding::SessionInfo;
use super::transmit::{Transmit, transmit_for};

/// Outcome of a health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub status: String,
}

impl HealthStatus {
    pub fn ok(status: impl Into<String>) -> Self {
        Self {
            healthy: true,
            status: status.into(),
        }
    }

    pub fn failed(status: impl Into<String>) -> Self {
        Self {
            healthy: false,
            status: status.into(),
        }
    }
}

/// Capability to judge whether a provider session can take input.
pub trait HealthCheck: Send {
    /// `probe_live` additionally asks the terminal whether the pane exists.
    fn check(&self, probe_live: bool) -> HealthStatus;
}

/// Health of a session described by a [`SessionInfo`].
///
/// FIFO sessions need a live provider process (`<runtime>/<provider>.pid`)
/// and an existing pipe; pane sessions need a pane id and, when probed, a
/// live pane.
pub struct SessionHealth {
    info: SessionInfo,
    probe: Option<Box<dyn Transmit>>,
}

impl SessionHealth {
    pub fn new(info: SessionInfo) -> Self {
        let probe = transmit_for(&info).ok();
        Self { info, probe }
    }

    /// Use `probe` to answer live pane checks.
    pub fn with_probe(info: SessionInfo, probe: Box<dyn Transmit>) -> Self {
        Self {
            info,
            probe: Some(probe),
        }
    }

    fn check_fifo(&self) -> HealthStatus {
        let pid_file = self
            .info
            .runtime_dir
            .join(format!("{}.pid", self.info.provider.as_str()));
        if !pid_file.exists() {
            return HealthStatus::failed(format!(
                "{} process PID file not found",
                self.info.provider.display_name()
            ));
        }

        let pid = std::fs::read_to_string(&pid_file)
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok());
        if !pid.is_some_and(process_alive) {
            return HealthStatus::failed(format!(
                "{} process has exited",
                self.info.provider.display_name()
            ));
        }

        match self.info.input_fifo.as_deref() {
            Some(fifo) if fifo.exists() => HealthStatus::ok("Session healthy"),
            _ => HealthStatus::failed("Communication pipe does not exist"),
        }
    }

    fn check_pane(&self, probe_live: bool) -> HealthStatus {
        let terminal = self.info.terminal.as_str();
        let Some(pane) = self.info.pane_id.as_deref() else {
            return HealthStatus::failed(format!("{terminal} pane id not found"));
        };
        if probe_live && !self.probe.as_ref().is_some_and(|probe| probe.is_alive()) {
            return HealthStatus::failed(format!("{terminal} pane does not exist: {pane}"));
        }
        HealthStatus::ok("Session healthy")
    }
}

impl HealthCheck for SessionHealth {
    fn check(&self, probe_live: bool) -> HealthStatus {
        if !self.info.runtime_dir.exists() {
            return HealthStatus::failed("Runtime directory not found");
        }
        if self.info.uses_fifo() {
            self.check_fifo()
        } else {
            self.check_pane(probe_live)
        }
    }
}

/// Whether a process with this pid is running.
pub fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    sys.process(pid).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::binding::Terminal;
    use crate::types::Provider;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn fifo_session(runtime: &Path) -> SessionInfo {
        SessionInfo {
            provider: Provider::Codex,
            session_id: "s".into(),
            runtime_dir: runtime.to_path_buf(),
            terminal: Terminal::Tmux,
            pane_id: Some("codex".into()),
            input_fifo: Some(runtime.join("input.fifo")),
            preferred_log: None,
            provider_session_id: None,
            work_dir: None,
            project_hash: None,
            session_file: None,
        }
    }

    #[test]
    fn test_own_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }

    #[test]
    fn test_fifo_session_health() {
        let temp = TempDir::new().unwrap();
        let health = SessionHealth::new(fifo_session(temp.path()));

        let status = health.check(false);
        assert!(!status.healthy);
        assert!(status.status.contains("PID file"));

        fs::write(temp.path().join("codex.pid"), std::process::id().to_string()).unwrap();
        assert_eq!(health.check(false).status, "Communication pipe does not exist");

        fs::write(temp.path().join("input.fifo"), "").unwrap();
        assert!(health.check(false).healthy);
    }

    #[test]
    fn test_missing_runtime_dir() {
        let mut info = fifo_session(Path::new("/"));
        info.runtime_dir = PathBuf::from("/definitely/not/here");
        let status = SessionHealth::new(info).check(true);
        assert_eq!(status, HealthStatus::failed("Runtime directory not found"));

        let mut pane = fifo_session(Path::new("/"));
        pane.input_fifo = None;
        pane.pane_id = None;
        let status = SessionHealth::new(pane).check(false);
        assert_eq!(status.status, "tmux pane id not found");
    }
}
