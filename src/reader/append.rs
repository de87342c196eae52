//! Reader for append-only, newline-delimited session logs.
//!
//! Each line is an independent JSON record. Assistant output arrives as one
//! or more `response_item` message records; the turn ends when a fragment
//! carries the end marker.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use walkdir::WalkDir;

use super::markers::Markers;
use super::target::{PreferredTarget, newest};
use super::{
    AppendCheckpoint, Checkpoint, LogRecord, Polled, ReaderResult, RecordKind, ReplyReader,
    keep_last,
};
use crate::config::Settings;
use crate::types::{Conversation, Provider, Reply};
use crate::watcher::ChangeWatcher;

/// Chunk size for the backward tail scan.
const TAIL_CHUNK: u64 = 4096;
/// Stop the tail scan once this many complete lines are buffered.
const TAIL_LINES: usize = 50;
/// Longest single block on the change watcher before re-checking state.
const MAX_WATCH_SLICE: Duration = Duration::from_secs(1);

/// Reads replies from a growing newline-delimited log.
pub struct AppendOnlyReader {
    provider: Provider,
    root: PathBuf,
    session_filter: Option<String>,
    target: PreferredTarget,
    markers: Markers,
    watcher: ChangeWatcher,
    tail_scan_bytes: u64,
}

impl AppendOnlyReader {
    pub fn new(provider: Provider, settings: &Settings) -> Self {
        Self {
            provider,
            root: settings.codex.session_root.clone(),
            session_filter: None,
            target: PreferredTarget::default(),
            markers: Markers::from_config(&settings.reply),
            watcher: ChangeWatcher::new(&settings.watch),
            tail_scan_bytes: settings.codex.tail_scan_bytes.max(TAIL_CHUNK),
        }
    }

    /// Prefer log files whose name contains this session id.
    pub fn with_session_filter(mut self, session_id: Option<String>) -> Self {
        self.session_filter = session_id.filter(|id| !id.is_empty());
        self
    }

    pub fn with_watcher(mut self, watcher: ChangeWatcher) -> Self {
        self.watcher = watcher;
        self
    }

    /// Newest `*.jsonl` under the root, honouring the session filter when it matches anything.
    fn scan_latest(&self) -> Option<PathBuf> {
        if !self.root.exists() {
            return None;
        }

        let logs: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();

        if let Some(filter) = self.session_filter.as_deref() {
            let matching = logs.iter().filter(|path| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy().contains(filter))
            });
            if let Some(found) = newest(matching.cloned()) {
                return Some(found);
            }
        }

        newest(logs)
    }

    /// Read complete lines from the checkpoint offset until a turn completes.
    fn extract(&self, path: &Path, mut cp: AppendCheckpoint) -> (Option<String>, AppendCheckpoint) {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => return (None, cp),
        };

        if cp.byte_offset > size {
            crate::debug_event!(
                self.provider,
                "log shrank, rereading from start",
                "{} ({} > {size})",
                path.display(),
                cp.byte_offset
            );
            cp.byte_offset = 0;
            cp.pending_fragments.clear();
        }
        if cp.byte_offset == size {
            return (None, cp);
        }

        let Ok(mut file) = File::open(path) else {
            return (None, cp);
        };
        if file.seek(SeekFrom::Start(cp.byte_offset)).is_err() {
            return (None, cp);
        }

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(read) => read,
            };
            // Partial write in progress: leave it for the next attempt
            if !line.ends_with(b"\n") {
                break;
            }
            cp.byte_offset += read as u64;

            let text = String::from_utf8_lossy(&line);
            let Some(record) = parse_record(text.trim()) else {
                continue;
            };
            let (RecordKind::Output, Some(fragment)) = (record.kind, record.text) else {
                continue;
            };

            if self.markers.is_complete(&fragment) {
                cp.pending_fragments.push(self.markers.strip(&fragment));
                let merged = join_fragments(&cp.pending_fragments);
                cp.pending_fragments.clear();
                return (Some(merged), cp);
            }
            cp.pending_fragments.push(fragment);
        }

        (None, cp)
    }

    /// Re-resolve the log when the checkpoint has none or it vanished.
    fn refresh_path(&mut self, cp: &mut AppendCheckpoint) {
        if cp.path.as_deref().is_some_and(Path::exists) {
            return;
        }
        let resolved = self.current_target();
        if resolved != cp.path {
            if let Some(path) = resolved.as_ref() {
                crate::debug_event!(self.provider, "following log", "{}", path.display());
            }
            cp.path = resolved;
            cp.byte_offset = 0;
            cp.pending_fragments.clear();
        }
    }

    fn attempt(&mut self, cp: AppendCheckpoint) -> (Option<Reply>, AppendCheckpoint) {
        let Some(path) = cp.path.clone().filter(|path| path.exists()) else {
            return (None, cp);
        };
        let (text, cp) = self.extract(&path, cp);
        (text.map(|text| Reply::new(text, path)), cp)
    }

    fn read_tail(&self, path: &Path) -> Option<String> {
        let mut file = File::open(path).ok()?;
        let mut position = file.metadata().ok()?.len();
        let mut buffer: Vec<u8> = Vec::new();

        while position > 0 && (buffer.len() as u64) < self.tail_scan_bytes {
            let read_size = TAIL_CHUNK.min(position);
            position -= read_size;
            file.seek(SeekFrom::Start(position)).ok()?;
            let mut chunk = vec![0u8; read_size as usize];
            file.read_exact(&mut chunk).ok()?;
            chunk.extend_from_slice(&buffer);
            buffer = chunk;
            if buffer.iter().filter(|&&b| b == b'\n').count() >= TAIL_LINES {
                break;
            }
        }

        Some(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl ReplyReader for AppendOnlyReader {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn current_target(&mut self) -> Option<PathBuf> {
        let latest = self.scan_latest();
        self.target.resolve(latest)
    }

    fn set_preferred(&mut self, path: &Path) {
        self.target.set(path);
    }

    fn capture_baseline(&mut self) -> Checkpoint {
        let path = self.current_target();
        let byte_offset = path
            .as_deref()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .unwrap_or(0);

        Checkpoint::AppendOffset(AppendCheckpoint {
            path,
            byte_offset,
            pending_fragments: Vec::new(),
        })
    }

    fn wait_for_reply(&mut self, checkpoint: Checkpoint, timeout: Duration) -> ReaderResult<Polled> {
        let mut cp = checkpoint.into_append()?;
        let deadline = Instant::now() + timeout;

        loop {
            self.refresh_path(&mut cp);
            let (reply, next) = self.attempt(cp);
            cp = next;
            if let Some(reply) = reply {
                crate::log_event!(self.provider, "reply", "{} chars", reply.text.len());
                return Ok(Polled::replied(reply, Checkpoint::AppendOffset(cp)));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Polled::nothing(Checkpoint::AppendOffset(cp)));
            }

            match cp.path.as_deref() {
                Some(path) if path.exists() => {
                    self.watcher
                        .wait_for_change(path, remaining.min(MAX_WATCH_SLICE));
                }
                _ => thread::sleep(remaining.min(self.watcher.poll_interval())),
            }
        }
    }

    fn try_reply(&mut self, checkpoint: Checkpoint) -> ReaderResult<Polled> {
        let mut cp = checkpoint.into_append()?;
        self.refresh_path(&mut cp);
        let (reply, cp) = self.attempt(cp);
        Ok(Polled {
            reply,
            checkpoint: Checkpoint::AppendOffset(cp),
        })
    }

    fn latest_reply(&mut self) -> Option<Reply> {
        let path = self.current_target()?;
        let tail = self.read_tail(&path)?;

        tail.lines()
            .rev()
            .filter_map(|line| parse_record(line.trim()))
            .filter(|record| record.kind == RecordKind::Output)
            .filter_map(|record| record.text)
            .map(|text| self.markers.strip(&text).trim().to_string())
            .find(|text| !text.is_empty())
            .map(|text| Reply::new(text, path))
    }

    fn latest_conversations(&mut self, n: usize) -> Vec<Conversation> {
        let Some(path) = self.current_target() else {
            return Vec::new();
        };
        let Ok(bytes) = std::fs::read(&path) else {
            return Vec::new();
        };
        let content = String::from_utf8_lossy(&bytes);

        let mut conversations = Vec::new();
        let mut question: Option<String> = None;
        for record in content.lines().filter_map(|line| parse_record(line.trim())) {
            match (record.kind, record.text) {
                (RecordKind::Input, Some(text)) => question = Some(text),
                (RecordKind::Output, Some(text)) => {
                    let answer = self.markers.strip(&text).trim().to_string();
                    if answer.is_empty() {
                        continue;
                    }
                    if let Some(question) = question.take() {
                        conversations.push(Conversation { question, answer });
                    }
                }
                _ => {}
            }
        }

        keep_last(conversations, n)
    }
}

/// Join non-empty fragments with a blank line.
fn join_fragments(fragments: &[String]) -> String {
    fragments
        .iter()
        .filter(|fragment| !fragment.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse one log line. Returns `None` for lines that are not JSON objects.
pub(crate) fn parse_record(line: &str) -> Option<LogRecord> {
    if line.is_empty() {
        return None;
    }
    let entry: Value = serde_json::from_str(line).ok()?;
    if !entry.is_object() {
        return None;
    }
    Some(classify(&entry))
}

fn classify(entry: &Value) -> LogRecord {
    let payload = &entry["payload"];

    match entry["type"].as_str() {
        Some("input") => {
            let text = payload["content"]
                .as_str()
                .map(str::trim)
                .filter(|text| !text.is_empty());
            match text {
                Some(text) => LogRecord {
                    kind: RecordKind::Input,
                    text: Some(text.to_string()),
                },
                None => LogRecord::other(),
            }
        }
        Some("response_item") if payload["type"].as_str() == Some("message") => {
            if payload["role"].as_str() == Some("user") {
                return match segments(payload, "input_text") {
                    Some(text) => LogRecord {
                        kind: RecordKind::Input,
                        text: Some(text),
                    },
                    None => LogRecord::other(),
                };
            }

            let text = segments(payload, "output_text").or_else(|| {
                payload["message"]
                    .as_str()
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string)
            });
            match text {
                Some(text) => LogRecord {
                    kind: RecordKind::Output,
                    text: Some(text),
                },
                None => LogRecord::other(),
            }
        }
        _ => LogRecord::other(),
    }
}

/// Join the `text` of every content item of the given type.
fn segments(payload: &Value, item_type: &str) -> Option<String> {
    let items = payload["content"].as_array()?;
    let texts: Vec<&str> = items
        .iter()
        .filter(|item| item["type"].as_str() == Some(item_type))
        .filter_map(|item| item["text"].as_str())
        .filter(|text| !text.is_empty())
        .collect();

    if texts.is_empty() {
        return None;
    }
    let joined = texts.join("\n").trim().to_string();
    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_record() {
        let line = r#"{"type":"response_item","payload":{"type":"message","role":"assistant","content":[{"type":"output_text","text":"first"},{"type":"output_text","text":"second"}]}}"#;
        let record = parse_record(line).unwrap();
        assert_eq!(record.kind, RecordKind::Output);
        assert_eq!(record.text.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn test_parse_message_fallback() {
        let line = r#"{"type":"response_item","payload":{"type":"message","message":"  plain  "}}"#;
        assert_eq!(parse_record(line).unwrap().text.as_deref(), Some("plain"));
    }

    #[test]
    fn test_parse_inputs() {
        let legacy = r#"{"type":"input","payload":{"content":" what? "}}"#;
        let record = parse_record(legacy).unwrap();
        assert_eq!(record.kind, RecordKind::Input);
        assert_eq!(record.text.as_deref(), Some("what?"));

        let user = r#"{"type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"hi"}]}}"#;
        assert_eq!(parse_record(user).unwrap().kind, RecordKind::Input);
    }

    #[test]
    fn test_parse_ignores_noise() {
        assert!(parse_record("not json").is_none());
        assert!(parse_record("[1,2]").is_none());
        let reasoning = r#"{"type":"response_item","payload":{"type":"reasoning"}}"#;
        assert_eq!(parse_record(reasoning).unwrap().kind, RecordKind::Other);
    }

    #[test]
    fn test_join_fragments_skips_empty() {
        let fragments = vec!["a".to_string(), String::new(), "b".to_string()];
        assert_eq!(join_fragments(&fragments), "a\n\nb");
    }
}
