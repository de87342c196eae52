//! Command implementations for the CLI.
//!
//! Each command returns the [`ExitCode`](crate::io::ExitCode) the process
//! should exit with.

pub mod ask;
mod common;
pub mod init;
pub mod send;
pub mod session;

pub use common::read_message;
