//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use ccbridge::Settings;
use ccbridge::config::WatchBackend;
use serde_json::{Value, json};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const END: &str = "[CCB_REPLY_END]";

/// Settings rooted in `temp` with a fast polling watcher.
pub fn settings_in(temp: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.workspace_root = Some(temp.path().join("project"));
    settings.codex.session_root = temp.path().join("codex");
    settings.gemini.root = temp.path().join("gemini");
    settings.gemini.parse_retries = 2;
    settings.gemini.catch_up_secs = 2;
    settings.watch.backend = WatchBackend::Poll;
    settings.watch.poll_interval_ms = 10;
    fs::create_dir_all(temp.path().join("project")).unwrap();
    fs::create_dir_all(&settings.codex.session_root).unwrap();
    settings
}

pub fn output_record(text: &str) -> String {
    json!({
        "type": "response_item",
        "payload": {
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "output_text", "text": text }]
        }
    })
    .to_string()
}

pub fn input_record(text: &str) -> String {
    json!({ "type": "input", "payload": { "content": text } }).to_string()
}

/// Append raw bytes without adding a newline. Creates missing parent directories.
pub fn append_raw(path: &Path, raw: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(raw.as_bytes()).unwrap();
    file.flush().unwrap();
}

/// Append one complete record line.
pub fn append_line(path: &Path, line: &str) {
    append_raw(path, &format!("{line}\n"));
}

pub fn user(text: &str) -> Value {
    json!({ "id": format!("u-{text}"), "type": "user", "content": text })
}

pub fn assistant(id: &str, text: &str) -> Value {
    json!({ "id": id, "type": "gemini", "content": text })
}

/// Rewrite a session document in place, as the provider does.
pub fn write_document(path: &Path, messages: &[Value]) {
    let document = json!({
        "sessionId": "11111111-2222-3333-4444-555555555555",
        "messages": messages
    });
    fs::write(path, serde_json::to_vec_pretty(&document).unwrap()).unwrap();
}

/// `<gemini root>/<hash>/chats/session-<name>.json` for the fixture project.
pub fn document_path(settings: &Settings, name: &str) -> PathBuf {
    let work_dir = settings.workspace_root.clone().unwrap();
    let chats = settings
        .gemini
        .root
        .join(ccbridge::reader::project_hash(&work_dir))
        .join("chats");
    fs::create_dir_all(&chats).unwrap();
    chats.join(format!("session-{name}.json"))
}
