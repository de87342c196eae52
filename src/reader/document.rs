//! Reader for a single JSON document that the provider rewrites in place.
//!
//! The document is `{"sessionId": …, "messages": [{"id", "type", "content"}, …]}`.
//! Growth is detected from stat changes plus a periodic forced read, since
//! some filesystems report mtimes at one-second granularity.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::markers::Markers;
use super::target::{PreferredTarget, newest};
use super::{Checkpoint, DocumentCheckpoint, Polled, ReaderResult, ReplyReader, keep_last};
use crate::backoff::Backoff;
use crate::config::Settings;
use crate::types::{Conversation, Provider, Reply};
use crate::watcher::ChangeWatcher;

/// Re-check interval while a streaming turn is being caught up.
const CATCH_UP_CHECK: Duration = Duration::from_secs(2);

/// Hash identifying a project directory: SHA-256 of its absolute path.
///
/// Symlinks are deliberately not resolved so the value matches what the
/// provider computes.
pub fn project_hash(work_dir: &Path) -> String {
    let absolute = std::path::absolute(work_dir).unwrap_or_else(|_| work_dir.to_path_buf());
    format!("{:x}", Sha256::digest(absolute.to_string_lossy().as_bytes()))
}

fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    User,
    Assistant,
    Other,
}

#[derive(Debug, Clone)]
struct Message {
    id: Option<String>,
    role: Role,
    content: String,
}

impl Message {
    fn from_value(value: &Value) -> Self {
        let role = match value.get("type").or_else(|| value.get("role")).and_then(Value::as_str) {
            Some("user") => Role::User,
            Some("gemini" | "assistant" | "model") => Role::Assistant,
            _ => Role::Other,
        };
        let id = match value.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        let content = match value.get("content") {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
                .trim()
                .to_string(),
            None | Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
        };
        Self { id, role, content }
    }

    fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

#[derive(Debug, Clone)]
struct Document {
    messages: Vec<Message>,
}

impl Document {
    fn parse(bytes: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(bytes).ok()?;
        let object = value.as_object()?;
        let messages = match object.get("messages") {
            Some(Value::Array(items)) => items.iter().map(Message::from_value).collect(),
            _ => Vec::new(),
        };
        Some(Self { messages })
    }

    fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|msg| msg.is_assistant())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Stat {
    mtime_nanos: u128,
    size: u64,
}

impl Stat {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        let mtime_nanos = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|since| since.as_nanos())
            .unwrap_or(0);
        Some(Self {
            mtime_nanos,
            size: meta.len(),
        })
    }

    fn advanced_from(&self, cp: &DocumentCheckpoint) -> bool {
        self.mtime_nanos > cp.mtime_nanos || self.size != cp.size_bytes
    }
}

/// Assistant output collected after a baseline.
#[derive(Debug, Clone, Default)]
struct Turn {
    contents: Vec<String>,
    last_id: Option<String>,
    last_hash: Option<String>,
    /// Messages consumed from the slice, up to and including a marker message.
    consumed: usize,
    complete: bool,
}

/// Result of inspecting one successful read.
enum Inspect {
    Reply(Reply, DocumentCheckpoint),
    /// The capped catch-up window closed; hand back the untouched checkpoint.
    Abandoned(DocumentCheckpoint),
    Pending,
}

/// Reads replies from a provider's session document.
pub struct MutableDocumentReader {
    provider: Provider,
    root: PathBuf,
    project_hash: String,
    target: PreferredTarget,
    markers: Markers,
    watcher: ChangeWatcher,
    retry: Backoff,
    parse_retries: u32,
    force_read_interval: Duration,
    rescan_interval: Duration,
    catch_up: Duration,
    cap_catch_up: bool,
}

impl MutableDocumentReader {
    pub fn new(provider: Provider, settings: &Settings, work_dir: &Path) -> Self {
        let gemini = &settings.gemini;
        let project_hash = gemini
            .project_hash
            .clone()
            .filter(|hash| !hash.trim().is_empty())
            .unwrap_or_else(|| project_hash(work_dir));

        Self {
            provider,
            root: gemini.root.clone(),
            project_hash,
            target: PreferredTarget::default(),
            markers: Markers::from_config(&settings.reply),
            watcher: ChangeWatcher::new(&settings.watch),
            retry: gemini.parse_backoff(),
            parse_retries: gemini.parse_retries.max(1),
            force_read_interval: gemini.force_read_interval(),
            rescan_interval: gemini.rescan_interval(),
            catch_up: gemini.catch_up(),
            cap_catch_up: gemini.cap_catch_up_to_timeout,
        }
    }

    pub fn with_watcher(mut self, watcher: ChangeWatcher) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn project_hash(&self) -> &str {
        &self.project_hash
    }

    fn chats_dir(&self) -> PathBuf {
        self.root.join(&self.project_hash).join("chats")
    }

    /// Newest session document for this project, else for any project.
    fn scan_latest(&self) -> Option<PathBuf> {
        if !self.root.exists() {
            return None;
        }
        let escaped_root = glob::Pattern::escape(&self.root.to_string_lossy());
        let escaped_hash = glob::Pattern::escape(&self.project_hash);

        let project = format!("{escaped_root}/{escaped_hash}/chats/session-*.json");
        if let Some(found) = newest(glob_files(&project)) {
            return Some(found);
        }

        // The hash can differ when the provider normalised the path differently
        newest(glob_files(&format!("{escaped_root}/*/chats/session-*.json")))
    }

    fn adopt_project_of(&mut self, path: &Path) {
        let hash = path
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned());
        if let Some(hash) = hash.filter(|hash| !hash.is_empty()) {
            self.project_hash = hash;
        }
    }

    /// Parse the document, retrying while it is mid-rewrite.
    ///
    /// Retries stop at `deadline`; a deadline already passed allows one attempt.
    fn read_document(&self, path: &Path, deadline: Option<Instant>) -> Option<Document> {
        if !path.exists() {
            return None;
        }
        let document = self.retry.retry(self.parse_retries, deadline, |_| {
            let bytes = std::fs::read(path).ok()?;
            Document::parse(&bytes)
        });
        if document.is_none() {
            crate::debug_event!(self.provider, "unreadable document", "{}", path.display());
        }
        document
    }

    /// Assistant output in `messages`, de-duplicated against `seed`.
    ///
    /// Stops right after the first message carrying the end marker.
    fn collect(&self, messages: &[Message], seed: Option<&str>) -> Turn {
        let mut seen: HashSet<String> = seed.map(str::to_string).into_iter().collect();
        let mut turn = Turn::default();

        for (index, message) in messages.iter().enumerate() {
            turn.consumed = index + 1;
            if !message.is_assistant() || message.content.is_empty() {
                continue;
            }
            let hash = content_hash(&message.content);
            if !seen.insert(hash.clone()) {
                continue;
            }
            turn.contents.push(message.content.clone());
            turn.last_id = message.id.clone();
            turn.last_hash = Some(hash);
            if self.markers.is_complete(&message.content) {
                turn.complete = true;
                break;
            }
        }

        turn
    }

    fn merge(&self, contents: &[String]) -> String {
        contents
            .iter()
            .map(|content| self.markers.strip(content))
            .filter(|content| !content.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Pick up a newer or first session document; counters restart at zero.
    fn rescan(&mut self, cp: &mut DocumentCheckpoint) {
        let resolved = self.current_target();
        if resolved.is_some() && resolved != cp.path {
            if let Some(path) = resolved.as_deref() {
                crate::debug_event!(self.provider, "following document", "{}", path.display());
            }
            *cp = DocumentCheckpoint {
                path: resolved,
                message_count: Some(0),
                ..DocumentCheckpoint::default()
            };
        }
    }

    /// Block on the chats directory (or the root) until a session appears.
    fn wait_for_session(&mut self, deadline: Instant) {
        let slice = deadline
            .saturating_duration_since(Instant::now())
            .min(self.rescan_interval);
        let chats = self.chats_dir();
        if chats.exists() {
            self.watcher.wait_for_change(&chats, slice);
        } else if self.root.exists() {
            self.watcher.wait_for_change(&self.root, slice);
        } else {
            thread::sleep(slice.min(self.watcher.poll_interval()));
        }
    }

    fn slice(&self, deadline: Instant) -> Duration {
        deadline
            .saturating_duration_since(Instant::now())
            .min(self.force_read_interval)
    }

    fn read_since(&mut self, mut cp: DocumentCheckpoint, deadline: Instant, block: bool) -> Polled {
        let mut last_rescan = Instant::now();
        let mut last_forced_read = Instant::now();
        let mut woken = false;

        loop {
            let path_missing = !cp.path.as_deref().is_some_and(Path::exists);
            if path_missing || last_rescan.elapsed() >= self.rescan_interval {
                self.rescan(&mut cp);
                last_rescan = Instant::now();
            }

            let Some(path) = cp.path.clone().filter(|path| path.exists()) else {
                if !block {
                    return Polled::nothing(Checkpoint::DocumentSnapshot(cp));
                }
                self.wait_for_session(deadline);
                if Instant::now() >= deadline {
                    return Polled::nothing(Checkpoint::DocumentSnapshot(cp));
                }
                continue;
            };

            if let Some(stat) = Stat::of(&path) {
                let forced_due = last_forced_read.elapsed() >= self.force_read_interval;
                let woke = std::mem::take(&mut woken);
                if block && !stat.advanced_from(&cp) && !forced_due && !woke {
                    woken = self.watcher.wait_for_change(&path, self.slice(deadline)).woke();
                    if !woken && Instant::now() >= deadline {
                        return Polled::nothing(Checkpoint::DocumentSnapshot(cp));
                    }
                    continue;
                }

                if let Some(document) = self.read_document(&path, Some(deadline)) {
                    last_forced_read = Instant::now();
                    match self.inspect(&path, &document, stat, &mut cp, deadline, block) {
                        Inspect::Reply(reply, next) => {
                            crate::log_event!(self.provider, "reply", "{} chars", reply.text.len());
                            return Polled::replied(reply, Checkpoint::DocumentSnapshot(next));
                        }
                        Inspect::Abandoned(original) => {
                            return Polled::nothing(Checkpoint::DocumentSnapshot(original));
                        }
                        Inspect::Pending => {}
                    }
                }
            }

            if !block {
                return Polled::nothing(Checkpoint::DocumentSnapshot(cp));
            }
            woken = self.watcher.wait_for_change(&path, self.slice(deadline)).woke();
            if Instant::now() >= deadline {
                return Polled::nothing(Checkpoint::DocumentSnapshot(cp));
            }
        }
    }

    fn inspect(
        &mut self,
        path: &Path,
        document: &Document,
        stat: Stat,
        cp: &mut DocumentCheckpoint,
        deadline: Instant,
        block: bool,
    ) -> Inspect {
        let count = document.messages.len();

        let Some(base) = cp.message_count else {
            return self.settle_unknown(path, document, stat, cp);
        };

        if count <= base {
            // Same turn count (or a shrink after a rewrite): adopt it as the new baseline
            cp.message_count = Some(count);
            cp.mtime_nanos = stat.mtime_nanos;
            cp.size_bytes = stat.size;
            if let Some(last) = document.last_assistant().filter(|msg| !msg.content.is_empty()) {
                cp.last_reply_id = last.id.clone();
                cp.last_reply_hash = Some(content_hash(&last.content));
            }
            return Inspect::Pending;
        }

        let fresh = &document.messages[base..];
        let turn = self.collect(fresh, cp.last_reply_hash.as_deref());

        if turn.contents.is_empty() {
            // Stop in front of an assistant placeholder that has not been filled yet
            let advance = fresh
                .iter()
                .position(|msg| msg.is_assistant() && msg.content.is_empty())
                .unwrap_or(fresh.len());
            cp.message_count = Some(base + advance);
            cp.mtime_nanos = stat.mtime_nanos;
            cp.size_bytes = stat.size;
            return Inspect::Pending;
        }

        if turn.complete {
            let (reply, next) = self.emit(path, base, count, stat, turn);
            return Inspect::Reply(reply, next);
        }
        if !block {
            return Inspect::Pending;
        }

        match self.catch_up(path, base, cp, turn, count, stat, deadline) {
            Some((turn, count, stat)) => {
                let (reply, next) = self.emit(path, base, count, stat, turn);
                Inspect::Reply(reply, next)
            }
            None => Inspect::Abandoned(cp.clone()),
        }
    }

    /// First parse after an unknown baseline: a fresh assistant turn wins,
    /// anything else becomes the baseline.
    fn settle_unknown(
        &self,
        path: &Path,
        document: &Document,
        stat: Stat,
        cp: &mut DocumentCheckpoint,
    ) -> Inspect {
        let count = document.messages.len();

        if let Some(last) = document.messages.last() {
            if last.is_assistant() && !last.content.is_empty() && stat.advanced_from(cp) {
                let text = self.markers.strip(&last.content);
                *cp = DocumentCheckpoint {
                    path: Some(path.to_path_buf()),
                    message_count: Some(count),
                    mtime_nanos: stat.mtime_nanos,
                    size_bytes: stat.size,
                    last_reply_id: last.id.clone(),
                    last_reply_hash: Some(content_hash(&last.content)),
                };
                return Inspect::Reply(Reply::new(text, path), cp.clone());
            }
        }

        cp.message_count = Some(count);
        cp.mtime_nanos = stat.mtime_nanos;
        cp.size_bytes = stat.size;
        if let Some(last) = document.last_assistant().filter(|msg| !msg.content.is_empty()) {
            cp.last_reply_id = last.id.clone();
            cp.last_reply_hash = Some(content_hash(&last.content));
        }
        Inspect::Pending
    }

    /// Keep re-reading a streaming turn until it carries the end marker.
    ///
    /// Returns `None` when a window capped by the caller's deadline closes
    /// first; the accumulated turn when the uncapped grace window closes.
    fn catch_up(
        &mut self,
        path: &Path,
        base: usize,
        cp: &DocumentCheckpoint,
        mut turn: Turn,
        mut count: usize,
        mut stat: Stat,
        deadline: Instant,
    ) -> Option<(Turn, usize, Stat)> {
        let grace = Instant::now() + self.catch_up;
        let capped = self.cap_catch_up && deadline < grace;
        let window_end = if capped { deadline } else { grace };

        crate::debug_event!(
            self.provider,
            "catching up streaming turn",
            "{} fragment(s), capped={capped}",
            turn.contents.len()
        );

        while !turn.complete {
            let remaining = window_end.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.watcher.wait_for_change(path, remaining.min(CATCH_UP_CHECK));

            let (Some(now_stat), Some(document)) =
                (Stat::of(path), self.read_document(path, Some(window_end)))
            else {
                continue;
            };
            let fresh = document.messages.get(base..).unwrap_or_default();
            let latest = self.collect(fresh, cp.last_reply_hash.as_deref());
            if !latest.contents.is_empty() {
                count = document.messages.len();
                turn = latest;
                stat = now_stat;
            }
        }

        if turn.complete || !capped {
            Some((turn, count, stat))
        } else {
            crate::debug_event!(self.provider, "catch-up window closed without marker");
            None
        }
    }

    /// Reply plus the checkpoint just past the consumed messages.
    fn emit(
        &self,
        path: &Path,
        base: usize,
        count: usize,
        stat: Stat,
        turn: Turn,
    ) -> (Reply, DocumentCheckpoint) {
        let consumed_to = base + turn.consumed;
        // Messages after the marker stay unread; a zero stat forces the next read
        let stat = if consumed_to >= count { stat } else { Stat::default() };

        let reply = Reply::new(self.merge(&turn.contents), path);
        let next = DocumentCheckpoint {
            path: Some(path.to_path_buf()),
            message_count: Some(consumed_to),
            mtime_nanos: stat.mtime_nanos,
            size_bytes: stat.size,
            last_reply_id: turn.last_id,
            last_reply_hash: turn.last_hash,
        };
        (reply, next)
    }
}

impl ReplyReader for MutableDocumentReader {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn current_target(&mut self) -> Option<PathBuf> {
        let latest = self.scan_latest();
        let previous = self.target.preferred().map(Path::to_path_buf);
        let resolved = self.target.resolve(latest);
        if let Some(path) = resolved.as_deref() {
            if previous.as_deref() != Some(path) {
                self.adopt_project_of(path);
            }
        }
        resolved
    }

    fn set_preferred(&mut self, path: &Path) {
        if path.exists() {
            self.target.set(path);
            self.adopt_project_of(path);
        }
    }

    fn capture_baseline(&mut self) -> Checkpoint {
        let Some(path) = self.current_target() else {
            return Checkpoint::DocumentSnapshot(DocumentCheckpoint {
                message_count: Some(0),
                ..DocumentCheckpoint::default()
            });
        };

        let stat = Stat::of(&path).unwrap_or_default();
        let mut cp = DocumentCheckpoint {
            path: Some(path.clone()),
            message_count: None,
            mtime_nanos: stat.mtime_nanos,
            size_bytes: stat.size,
            last_reply_id: None,
            last_reply_hash: None,
        };

        // Runs before transmit; a document still unreadable after this is an unknown baseline
        let budget = Instant::now() + self.force_read_interval;
        match self.read_document(&path, Some(budget)) {
            Some(document) => {
                cp.message_count = Some(document.messages.len());
                if let Some(last) = document.last_assistant().filter(|msg| !msg.content.is_empty()) {
                    cp.last_reply_id = last.id.clone();
                    cp.last_reply_hash = Some(content_hash(&last.content));
                }
            }
            None => {
                crate::debug_event!(self.provider, "baseline unknown", "{}", path.display());
            }
        }

        Checkpoint::DocumentSnapshot(cp)
    }

    fn wait_for_reply(&mut self, checkpoint: Checkpoint, timeout: Duration) -> ReaderResult<Polled> {
        let cp = checkpoint.into_document()?;
        let deadline = Instant::now() + timeout;
        Ok(self.read_since(cp, deadline, true))
    }

    fn try_reply(&mut self, checkpoint: Checkpoint) -> ReaderResult<Polled> {
        let cp = checkpoint.into_document()?;
        Ok(self.read_since(cp, Instant::now(), false))
    }

    fn latest_reply(&mut self) -> Option<Reply> {
        let path = self.current_target()?;
        let document = self.read_document(&path, None)?;
        document
            .messages
            .iter()
            .rev()
            .filter(|msg| msg.is_assistant())
            .map(|msg| self.markers.strip(&msg.content))
            .find(|text| !text.is_empty())
            .map(|text| Reply::new(text, path))
    }

    fn latest_conversations(&mut self, n: usize) -> Vec<Conversation> {
        let Some(document) = self.current_target().and_then(|path| self.read_document(&path, None)) else {
            return Vec::new();
        };

        let mut conversations = Vec::new();
        let mut question: Option<String> = None;
        for message in &document.messages {
            match message.role {
                Role::User if !message.content.is_empty() => {
                    question = Some(message.content.clone());
                }
                Role::Assistant => {
                    let answer = self.markers.strip(&message.content);
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

fn glob_files(pattern: &str) -> impl Iterator<Item = PathBuf> {
    glob::glob(pattern)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchBackend;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        settings: Settings,
        work_dir: PathBuf,
        session: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let work_dir = temp.path().join("project");
        fs::create_dir_all(&work_dir).unwrap();

        let mut settings = Settings::default();
        settings.gemini.root = temp.path().join("gemini");
        settings.gemini.parse_retries = 2;
        settings.watch.backend = WatchBackend::Poll;
        settings.watch.poll_interval_ms = 10;

        let chats = settings.gemini.root.join(project_hash(&work_dir)).join("chats");
        fs::create_dir_all(&chats).unwrap();
        let session = chats.join("session-1.json");

        Fixture {
            _temp: temp,
            settings,
            work_dir,
            session,
        }
    }

    fn write_messages(path: &Path, messages: serde_json::Value) {
        let document = json!({"sessionId": "s-1", "messages": messages});
        fs::write(path, serde_json::to_vec(&document).unwrap()).unwrap();
    }

    fn reader(fx: &Fixture) -> MutableDocumentReader {
        MutableDocumentReader::new(Provider::Gemini, &fx.settings, &fx.work_dir)
    }

    #[test]
    fn test_project_hash_is_sha256_hex() {
        let hash = project_hash(Path::new("/tmp/some/project"));
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, project_hash(Path::new("/tmp/some/project")));
        assert_ne!(hash, project_hash(Path::new("/tmp/other")));
    }

    #[test]
    fn test_message_roles() {
        let user = Message::from_value(&json!({"type": "user", "content": " q "}));
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "q");
        let model = Message::from_value(&json!({"role": "model", "content": [{"text": "a"}, {"text": "b"}]}));
        assert!(model.is_assistant());
        assert_eq!(model.content, "ab");
        let info = Message::from_value(&json!({"type": "info", "id": 7}));
        assert_eq!(info.role, Role::Other);
        assert_eq!(info.id.as_deref(), Some("7"));
    }

    #[test]
    fn test_collect_dedupes_and_stops_at_marker() {
        let fx = fixture();
        let reader = reader(&fx);
        let messages: Vec<Message> = [
            json!({"type": "gemini", "content": "old"}),
            json!({"type": "gemini", "content": "part one"}),
            json!({"type": "gemini", "content": "done [CCB_REPLY_END]"}),
            json!({"type": "user", "content": "next question"}),
        ]
        .iter()
        .map(Message::from_value)
        .collect();

        let turn = reader.collect(&messages, Some(&content_hash("old")));
        assert!(turn.complete);
        assert_eq!(turn.consumed, 3);
        assert_eq!(turn.contents, vec!["part one", "done [CCB_REPLY_END]"]);
        assert_eq!(reader.merge(&turn.contents), "part one\n\ndone");
    }

    #[test]
    fn test_baseline_counts_messages() {
        let fx = fixture();
        write_messages(
            &fx.session,
            json!([{"type": "user", "content": "hi"}, {"type": "gemini", "id": "m1", "content": "hello"}]),
        );

        let mut reader = reader(&fx);
        let Checkpoint::DocumentSnapshot(cp) = reader.capture_baseline() else {
            panic!("wrong checkpoint kind");
        };
        assert_eq!(cp.path.as_deref(), Some(fx.session.as_path()));
        assert_eq!(cp.message_count, Some(2));
        assert_eq!(cp.last_reply_id.as_deref(), Some("m1"));
        assert_eq!(cp.last_reply_hash, Some(content_hash("hello")));
    }

    #[test]
    fn test_try_reply_requires_marker() {
        let fx = fixture();
        write_messages(&fx.session, json!([{"type": "user", "content": "q1"}]));
        let mut reader = reader(&fx);
        let baseline = reader.capture_baseline();

        write_messages(
            &fx.session,
            json!([{"type": "user", "content": "q1"}, {"type": "gemini", "content": "streaming"}]),
        );
        let polled = reader.try_reply(baseline.clone()).unwrap();
        assert!(polled.reply.is_none());
        assert_eq!(polled.checkpoint, baseline);

        write_messages(
            &fx.session,
            json!([{"type": "user", "content": "q1"}, {"type": "gemini", "content": "answer [CCB_REPLY_END]"}]),
        );
        let polled = reader.try_reply(baseline).unwrap();
        assert_eq!(polled.reply.unwrap().text, "answer");
    }

    #[test]
    fn test_placeholder_blocks_baseline_advance() {
        let fx = fixture();
        write_messages(&fx.session, json!([{"type": "user", "content": "q1"}]));
        let mut reader = reader(&fx);
        let baseline = reader.capture_baseline();

        write_messages(
            &fx.session,
            json!([
                {"type": "user", "content": "q1"},
                {"type": "info", "content": "tool call"},
                {"type": "gemini", "content": ""}
            ]),
        );
        let polled = reader.try_reply(baseline).unwrap();
        assert!(polled.reply.is_none());
        let Checkpoint::DocumentSnapshot(cp) = &polled.checkpoint else {
            panic!("wrong checkpoint kind");
        };
        assert_eq!(cp.message_count, Some(2));

        write_messages(
            &fx.session,
            json!([
                {"type": "user", "content": "q1"},
                {"type": "info", "content": "tool call"},
                {"type": "gemini", "content": "filled [CCB_REPLY_END]"}
            ]),
        );
        let polled = reader.try_reply(polled.checkpoint).unwrap();
        assert_eq!(polled.reply.unwrap().text, "filled");
    }

    #[test]
    fn test_capped_catch_up_keeps_checkpoint() {
        let fx = fixture();
        write_messages(&fx.session, json!([{"type": "user", "content": "q1"}]));
        let mut reader = reader(&fx);
        let baseline = reader.capture_baseline();

        write_messages(
            &fx.session,
            json!([{"type": "user", "content": "q1"}, {"type": "gemini", "content": "half a thought"}]),
        );
        let polled = reader
            .wait_for_reply(baseline.clone(), Duration::from_millis(300))
            .unwrap();
        assert!(polled.reply.is_none());
        assert_eq!(polled.checkpoint, baseline);
    }

    #[test]
    fn test_uncapped_grace_returns_partial_turn() {
        let mut fx = fixture();
        fx.settings.gemini.cap_catch_up_to_timeout = false;
        fx.settings.gemini.catch_up_secs = 0;
        write_messages(&fx.session, json!([{"type": "user", "content": "q1"}]));
        let mut reader = reader(&fx);
        let baseline = reader.capture_baseline();

        write_messages(
            &fx.session,
            json!([{"type": "user", "content": "q1"}, {"type": "gemini", "content": "no marker"}]),
        );
        let polled = reader.wait_for_reply(baseline, Duration::from_secs(5)).unwrap();
        assert_eq!(polled.reply.unwrap().text, "no marker");
    }

    #[test]
    fn test_conversations_and_latest() {
        let fx = fixture();
        write_messages(
            &fx.session,
            json!([
                {"type": "user", "content": "q1"},
                {"type": "gemini", "content": "a1 [CCB_REPLY_END]"},
                {"type": "user", "content": "q2"},
                {"type": "gemini", "content": "a2 [GEMINI_TURN_END]"}
            ]),
        );
        let mut reader = reader(&fx);

        let all = reader.latest_conversations(0);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].answer, "a1");
        let last = reader.latest_conversations(1);
        assert_eq!(last[0].question, "q2");
        assert_eq!(reader.latest_reply().unwrap().text, "a2");
    }

    #[test]
    fn test_falls_back_to_other_project() {
        let fx = fixture();
        let foreign = fx.settings.gemini.root.join("elsewhere").join("chats");
        fs::create_dir_all(&foreign).unwrap();
        fs::remove_dir_all(fx.session.parent().unwrap()).unwrap();
        let session = foreign.join("session-9.json");
        write_messages(&session, json!([]));

        let mut reader = reader(&fx);
        assert_eq!(reader.current_target(), Some(session));
        assert_eq!(reader.project_hash(), "elsewhere");
    }
}
