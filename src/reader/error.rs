use thiserror::Error;

use crate::types::RecordFormat;

/// Errors surfaced by reply readers.
///
/// Transient I/O and parse failures are retried inside the readers and never
/// appear here.
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Checkpoint for {found:?} records handed to a {expected:?} reader")]
    CheckpointMismatch {
        expected: RecordFormat,
        found: RecordFormat,
    },
}

pub type ReaderResult<T> = Result<T, ReaderError>;
