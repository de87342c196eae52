use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn ccb(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ccb"))
        .args(args)
        .current_dir(dir)
        .env_remove("CODEX_SESSION_ID")
        .env_remove("GEMINI_SESSION_ID")
        .env("CCB_LOGGING__DEFAULT", "warn")
        .output()
        .expect("Failed to run ccb")
}

#[test]
fn test_init_creates_settings_once() {
    let temp = TempDir::new().unwrap();

    let output = ccb(temp.path(), &["init"]);
    assert!(output.status.success(), "init failed: {output:?}");
    assert!(temp.path().join(".ccb/settings.toml").exists());

    // A second init without --force is refused
    let again = ccb(temp.path(), &["init"]);
    assert_eq!(again.status.code(), Some(2));

    let forced = ccb(temp.path(), &["init", "--force"]);
    assert!(forced.status.success());
}

#[test]
fn test_config_prints_active_settings() {
    let temp = TempDir::new().unwrap();
    assert!(ccb(temp.path(), &["init"]).status.success());

    let output = ccb(temp.path(), &["--json", "config"]);
    assert!(output.status.success());
    let envelope: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["status"], "success");
    assert_eq!(envelope["data"]["ask"]["timeout_action"], "cancel");
}

#[test]
fn test_pend_without_session() {
    let temp = TempDir::new().unwrap();
    assert!(ccb(temp.path(), &["init"]).status.success());

    let output = ccb(temp.path(), &["pend", "codex"]);
    assert_eq!(output.status.code(), Some(20));

    let output = ccb(temp.path(), &["--json", "pend", "codex"]);
    assert_eq!(output.status.code(), Some(20));
    let envelope: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["code"], "NO_SESSION");
    assert_eq!(envelope["exit_code"], 20);
}

#[test]
fn test_unknown_provider_is_usage_error() {
    let temp = TempDir::new().unwrap();
    let output = ccb(temp.path(), &["pend", "claude"]);
    assert_eq!(output.status.code(), Some(2));
}
