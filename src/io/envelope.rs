//! JSON output envelope shared by every command.
//!
//! With `--json` each command prints exactly one envelope on stdout, so
//! callers can pipe `ccb` output straight into other tools.

use serde::Serialize;

use super::ExitCode;
use crate::types::Provider;

/// Schema version for this envelope format.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Operation outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Operation succeeded with results
    Success,
    /// Operation succeeded but found nothing
    NotFound,
    /// Some providers succeeded, some failed
    PartialSuccess,
    /// Operation failed
    Error,
}

/// Machine-readable result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Ok,
    NotFound,
    Timeout,
    Backgrounded,
    Cancelled,
    NoSession,
    Unhealthy,
    SendFailed,
    InvalidInput,
    InternalError,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::Backgrounded => "BACKGROUNDED",
            Self::Cancelled => "CANCELLED",
            Self::NoSession => "NO_SESSION",
            Self::Unhealthy => "UNHEALTHY",
            Self::SendFailed => "SEND_FAILED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Result code for an exit code family.
    pub fn for_exit(code: ExitCode) -> Self {
        match code {
            ExitCode::Success => Self::Ok,
            ExitCode::UsageError => Self::InvalidInput,
            ExitCode::SessionNotFound | ExitCode::SessionInvalid => Self::NoSession,
            ExitCode::BackendNotRunning => Self::Unhealthy,
            ExitCode::BackendStartFailed | ExitCode::TerminalNotDetected => Self::SendFailed,
            ExitCode::NoRecoverableHistory => Self::NotFound,
            _ => Self::InternalError,
        }
    }
}

/// Unified JSON output envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T = serde_json::Value> {
    /// Operation outcome
    pub status: Status,

    /// Machine-readable result code
    pub code: ResultCode,

    /// Process exit code (0-255)
    pub exit_code: u8,

    /// Human-readable message
    pub message: String,

    /// Next step for the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Result payload (null on error)
    pub data: Option<T>,

    /// Recovery suggestions (omitted on success)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,

    /// Response metadata
    pub meta: Meta,
}

/// Response metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    /// Schema version (semver)
    pub schema_version: String,

    /// Provider the command addressed, if exactly one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,

    /// Number of items in data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    /// Execution time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            provider: None,
            count: None,
            duration_ms: None,
        }
    }
}

impl<T> Envelope<T> {
    /// Create a success envelope with data.
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            code: ResultCode::Ok,
            exit_code: ExitCode::Success as u8,
            message: "Operation completed successfully".to_string(),
            hint: None,
            data: Some(data),
            suggestions: Vec::new(),
            meta: Meta::default(),
        }
    }

    /// Create a not-found envelope.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: Status::NotFound,
            code: ResultCode::NotFound,
            exit_code: ExitCode::GeneralError as u8,
            message: message.into(),
            hint: None,
            data: None,
            suggestions: Vec::new(),
            meta: Meta::default(),
        }
    }

    /// Create an error envelope carrying the exit code's suggestion.
    pub fn error(exit: ExitCode, message: impl Into<String>) -> Self {
        let suggestions = match exit.suggestion() {
            "" => Vec::new(),
            suggestion => vec![suggestion.to_string()],
        };
        Self {
            status: Status::Error,
            code: ResultCode::for_exit(exit),
            exit_code: exit as u8,
            message: message.into(),
            hint: None,
            data: None,
            suggestions,
            meta: Meta::default(),
        }
    }

    /// Data with a non-success status, e.g. a fan-out where some providers failed.
    pub fn partial(data: T, exit: ExitCode) -> Self {
        Self {
            status: Status::PartialSuccess,
            code: ResultCode::for_exit(exit),
            exit_code: exit as u8,
            message: "Some operations failed".to_string(),
            hint: None,
            data: Some(data),
            suggestions: Vec::new(),
            meta: Meta::default(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_code(mut self, code: ResultCode) -> Self {
        self.code = code;
        self
    }

    /// Report `exit` instead of the current exit code; failures flip the status.
    pub fn with_exit(mut self, exit: ExitCode) -> Self {
        self.exit_code = exit as u8;
        if !exit.is_success() {
            self.status = Status::Error;
            self.code = ResultCode::for_exit(exit);
        }
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.meta.provider = Some(provider);
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.meta.count = Some(count);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.meta.duration_ms = Some(duration_ms);
        self
    }

    /// Exit code this envelope reports.
    pub fn exit(&self) -> ExitCode {
        ExitCode::from_u8(self.exit_code)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error>
    where
        T: Serialize,
    {
        serde_json::to_string_pretty(self)
    }

    /// Print to stdout and return the exit code.
    pub fn emit(&self) -> ExitCode
    where
        T: Serialize,
    {
        match self.to_json() {
            Ok(json) => {
                println!("{json}");
                self.exit()
            }
            Err(e) => {
                eprintln!("Failed to serialize output: {e}");
                ExitCode::GeneralError
            }
        }
    }
}
