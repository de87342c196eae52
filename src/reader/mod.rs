//! Reply readers for the two on-disk record formats.
//!
//! Both readers implement [`ReplyReader`]. A reader owns its watcher and its
//! sticky target preference; checkpoints are plain values passed back and forth
//! so one reader can serve several waits in sequence.
//!
//! ```text
//! capture_baseline ──► Checkpoint ──► wait_for_reply ──► (Reply?, Checkpoint)
//!                                         │
//!                                 ChangeWatcher between attempts
//! ```

mod append;
mod document;
mod error;
mod markers;
mod target;

pub use append::AppendOnlyReader;
pub use document::{MutableDocumentReader, project_hash};
pub use error::{ReaderError, ReaderResult};
pub use markers::Markers;
pub use target::PreferredTarget;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{Conversation, Provider, RecordFormat, Reply};

/// Resume point for an append-only record file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendCheckpoint {
    pub path: Option<PathBuf>,
    pub byte_offset: u64,
    /// Assistant fragments seen since the last completed turn.
    pub pending_fragments: Vec<String>,
}

/// Snapshot of a mutable document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCheckpoint {
    pub path: Option<PathBuf>,
    /// `None` when the document could not be parsed at capture time.
    pub message_count: Option<usize>,
    pub mtime_nanos: u128,
    pub size_bytes: u64,
    pub last_reply_id: Option<String>,
    pub last_reply_hash: Option<String>,
}

/// Opaque per-reader progress marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Checkpoint {
    AppendOffset(AppendCheckpoint),
    DocumentSnapshot(DocumentCheckpoint),
}

impl Checkpoint {
    pub fn format(&self) -> RecordFormat {
        match self {
            Checkpoint::AppendOffset(_) => RecordFormat::AppendOnly,
            Checkpoint::DocumentSnapshot(_) => RecordFormat::MutableDocument,
        }
    }

    /// Record file this checkpoint refers to, if one was resolved.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Checkpoint::AppendOffset(cp) => cp.path.as_deref(),
            Checkpoint::DocumentSnapshot(cp) => cp.path.as_deref(),
        }
    }

    pub(crate) fn into_append(self) -> ReaderResult<AppendCheckpoint> {
        match self {
            Checkpoint::AppendOffset(cp) => Ok(cp),
            other => Err(ReaderError::CheckpointMismatch {
                expected: RecordFormat::AppendOnly,
                found: other.format(),
            }),
        }
    }

    pub(crate) fn into_document(self) -> ReaderResult<DocumentCheckpoint> {
        match self {
            Checkpoint::DocumentSnapshot(cp) => Ok(cp),
            other => Err(ReaderError::CheckpointMismatch {
                expected: RecordFormat::MutableDocument,
                found: other.format(),
            }),
        }
    }
}

/// Outcome of one wait or poll: the reply, if any, and where to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled {
    pub reply: Option<Reply>,
    pub checkpoint: Checkpoint,
}

impl Polled {
    pub fn nothing(checkpoint: Checkpoint) -> Self {
        Self {
            reply: None,
            checkpoint,
        }
    }

    pub fn replied(reply: Reply, checkpoint: Checkpoint) -> Self {
        Self {
            reply: Some(reply),
            checkpoint,
        }
    }
}

/// Classification of one parsed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Input,
    Output,
    Other,
}

/// One parsed unit from a provider's record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub kind: RecordKind,
    pub text: Option<String>,
}

impl LogRecord {
    pub fn other() -> Self {
        Self {
            kind: RecordKind::Other,
            text: None,
        }
    }
}

/// Capability shared by every provider's reader.
pub trait ReplyReader: Send {
    /// Provider this reader serves.
    fn provider(&self) -> Provider;

    /// Resolve the record file currently in use, keeping a sticky preference.
    fn current_target(&mut self) -> Option<PathBuf>;

    /// Adopt a record file supplied by the session binding.
    fn set_preferred(&mut self, path: &Path);

    /// Checkpoint meaning "nothing new yet". Take it before transmitting.
    fn capture_baseline(&mut self) -> Checkpoint;

    /// Block until a reply past `checkpoint` is complete or `timeout` elapses.
    fn wait_for_reply(&mut self, checkpoint: Checkpoint, timeout: Duration) -> ReaderResult<Polled>;

    /// One non-blocking attempt.
    fn try_reply(&mut self, checkpoint: Checkpoint) -> ReaderResult<Polled>;

    /// Most recent reply without a checkpoint.
    fn latest_reply(&mut self) -> Option<Reply>;

    /// Last `n` question/answer pairs; `n == 0` returns all of them.
    fn latest_conversations(&mut self, n: usize) -> Vec<Conversation>;
}

/// Keep the last `n` items (`n == 0` keeps everything).
pub(crate) fn keep_last<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    if n > 0 && items.len() > n {
        items.drain(..items.len() - n);
    }
    items
}
