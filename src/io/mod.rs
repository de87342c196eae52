//! Output handling for the CLI.
//!
//! This module provides:
//! - The JSON envelope printed with `--json`
//! - Plain-text rendering for terminals
//! - Exit codes grouped by failure family
//! - A status line spinner for long waits

pub mod envelope;
pub mod exit_code;
pub mod format;
pub mod status_line;

pub use envelope::{Envelope, Meta, ResultCode, SCHEMA_VERSION, Status};
pub use exit_code::ExitCode;
pub use status_line::{Options as StatusLineOptions, Spinner, StatusLine};
