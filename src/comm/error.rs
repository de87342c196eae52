use thiserror::Error;

use crate::reader::ReaderError;
use crate::session::{SessionError, TransmitError};
use crate::types::Provider;

/// Errors from a single provider exchange.
///
/// A timeout is not an error; it surfaces as an [`AskOutcome`](super::AskOutcome).
#[derive(Error, Debug)]
pub enum AskError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Session unhealthy: {status}")]
    Unhealthy { provider: Provider, status: String },

    #[error("Send to {provider} failed: {source}")]
    Transmit {
        provider: Provider,
        #[source]
        source: TransmitError,
    },

    #[error(transparent)]
    Reader(#[from] ReaderError),
}

impl AskError {
    /// Whether the error means there is no usable session at all.
    pub fn is_no_session(&self) -> bool {
        matches!(self, AskError::Session(SessionError::NotFound { .. }))
    }
}
