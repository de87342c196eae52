use thiserror::Error;

/// Errors rejecting a fan-out before any provider is contacted.
///
/// Per-provider failures are never errors here; they land in the report.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No providers selected")]
    EmptyProviders,

    #[error("Message is empty")]
    EmptyMessage,
}
