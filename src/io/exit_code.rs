//! Process exit codes, grouped by family.
//!
//! - 0: success
//! - 1-9: general
//! - 10-19: configuration
//! - 20-29: session
//! - 40-49: terminal and provider backend

use serde::Serialize;

use crate::comm::AskError;
use crate::session::{SessionError, TransmitError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    UsageError = 2,
    Interrupted = 3,

    ConfigNotFound = 10,
    ConfigInvalid = 11,
    ConfigPermission = 12,
    MissingDependency = 13,

    SessionNotFound = 20,
    SessionAlreadyExists = 21,
    SessionInvalid = 22,
    SessionWriteError = 23,
    NoRecoverableHistory = 24,

    TerminalNotDetected = 40,
    TerminalNotSupported = 41,
    BackendStartFailed = 42,
    BackendNotRunning = 43,
}

impl ExitCode {
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unexpected error occurred",
            ExitCode::UsageError => "Invalid command or arguments",
            ExitCode::Interrupted => "Operation was interrupted",
            ExitCode::ConfigNotFound => "Configuration file not found",
            ExitCode::ConfigInvalid => "Configuration file is invalid",
            ExitCode::ConfigPermission => "Cannot read or write configuration file",
            ExitCode::MissingDependency => "Required dependency is missing",
            ExitCode::SessionNotFound => "Session file not found",
            ExitCode::SessionAlreadyExists => "Session already exists and is running",
            ExitCode::SessionInvalid => "Session file is invalid or corrupted",
            ExitCode::SessionWriteError => "Cannot write session file",
            ExitCode::NoRecoverableHistory => "No recoverable session history found",
            ExitCode::TerminalNotDetected => "Could not detect terminal environment",
            ExitCode::TerminalNotSupported => "Terminal is not supported",
            ExitCode::BackendStartFailed => "Failed to reach the provider",
            ExitCode::BackendNotRunning => "Provider is not running",
        }
    }

    /// What the user can do about it; empty when there is nothing to suggest.
    pub fn suggestion(&self) -> &'static str {
        match self {
            ExitCode::UsageError => "Run 'ccb --help' for usage information",
            ExitCode::ConfigNotFound | ExitCode::ConfigInvalid => {
                "Run 'ccb init --force' to recreate .ccb/settings.toml"
            }
            ExitCode::ConfigPermission => "Check file permissions for .ccb/settings.toml",
            ExitCode::MissingDependency => "Install tmux or wezterm and make sure it is on PATH",
            ExitCode::SessionNotFound | ExitCode::BackendNotRunning => {
                "Start the provider pane, then retry"
            }
            ExitCode::SessionInvalid => "Delete the .<provider>-session file and start a new session",
            ExitCode::SessionWriteError => "Check write permissions in the project directory",
            ExitCode::NoRecoverableHistory => "Ask the provider something first",
            ExitCode::TerminalNotDetected | ExitCode::TerminalNotSupported => {
                "Run the provider inside tmux or WezTerm"
            }
            _ => "",
        }
    }

    pub fn from_u8(code: u8) -> Self {
        match code {
            0 => ExitCode::Success,
            2 => ExitCode::UsageError,
            3 => ExitCode::Interrupted,
            10 => ExitCode::ConfigNotFound,
            11 => ExitCode::ConfigInvalid,
            12 => ExitCode::ConfigPermission,
            13 => ExitCode::MissingDependency,
            20 => ExitCode::SessionNotFound,
            21 => ExitCode::SessionAlreadyExists,
            22 => ExitCode::SessionInvalid,
            23 => ExitCode::SessionWriteError,
            24 => ExitCode::NoRecoverableHistory,
            40 => ExitCode::TerminalNotDetected,
            41 => ExitCode::TerminalNotSupported,
            42 => ExitCode::BackendStartFailed,
            43 => ExitCode::BackendNotRunning,
            _ => ExitCode::GeneralError,
        }
    }

    /// Exit code family for a failed exchange.
    pub fn from_ask_error(error: &AskError) -> Self {
        match error {
            AskError::Session(SessionError::NotFound { .. }) => ExitCode::SessionNotFound,
            AskError::Session(SessionError::InvalidFile { .. })
            | AskError::Session(SessionError::MissingEnv { .. }) => ExitCode::SessionInvalid,
            AskError::Session(SessionError::UnsupportedTerminal(_)) => {
                ExitCode::TerminalNotSupported
            }
            AskError::Session(SessionError::BindingWrite { .. }) => ExitCode::SessionWriteError,
            AskError::Unhealthy { .. } => ExitCode::BackendNotRunning,
            AskError::Transmit { source, .. } => match source {
                TransmitError::NotConfigured(_) => ExitCode::TerminalNotDetected,
                TransmitError::Command { .. } => ExitCode::BackendStartFailed,
                TransmitError::FifoMissing { .. } | TransmitError::Io { .. } => {
                    ExitCode::BackendNotRunning
                }
            },
            AskError::Reader(_) => ExitCode::GeneralError,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == ExitCode::Success
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;

    #[test]
    fn test_round_trip_codes() {
        for code in [ExitCode::UsageError, ExitCode::SessionInvalid, ExitCode::BackendNotRunning] {
            assert_eq!(ExitCode::from_u8(code as u8), code);
        }
        assert_eq!(ExitCode::from_u8(99), ExitCode::GeneralError);
    }

    #[test]
    fn test_ask_error_families() {
        let missing = AskError::Session(SessionError::NotFound {
            provider: Provider::Codex,
        });
        assert_eq!(ExitCode::from_ask_error(&missing), ExitCode::SessionNotFound);

        let unhealthy = AskError::Unhealthy {
            provider: Provider::Gemini,
            status: "gone".into(),
        };
        assert_eq!(ExitCode::from_ask_error(&unhealthy) as u8, 43);
    }
}
