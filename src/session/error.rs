use std::path::PathBuf;
use thiserror::Error;

use crate::types::Provider;

/// Errors loading or updating a provider session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No active {provider} session found. Start the {provider} pane first")]
    NotFound { provider: Provider },

    #[error("Session file {path} is invalid: {reason}")]
    InvalidFile { path: PathBuf, reason: String },

    #[error("Environment variable {name} is required when {provider} runs from the environment")]
    MissingEnv {
        provider: Provider,
        name: String,
    },

    #[error("Unsupported terminal '{0}' (expected tmux or wezterm)")]
    UnsupportedTerminal(String),

    #[error("Failed to update session file {path}: {source}")]
    BindingWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Errors delivering a message into a provider's input channel.
#[derive(Error, Debug)]
pub enum TransmitError {
    #[error("Input pipe {path} does not exist")]
    FifoMissing { path: PathBuf },

    #[error("Failed to write to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {details}")]
    Command { command: String, details: String },

    #[error("Terminal session not configured: {0}")]
    NotConfigured(String),
}
