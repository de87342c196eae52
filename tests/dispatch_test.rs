mod common;

use ccbridge::comm::{AskError, Communicator};
use ccbridge::dispatch::Dispatcher;
use ccbridge::reader::AppendOnlyReader;
use ccbridge::session::{HealthCheck, HealthStatus, Transmit, TransmitError};
use ccbridge::types::Provider;
use ccbridge::watcher::ChangeWatcher;
use common::*;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Pane stand-in that answers by appending to the provider's log.
struct EchoPane {
    log: PathBuf,
    reply_after: Option<Duration>,
}

impl Transmit for EchoPane {
    fn send(&self, text: &str, _marker: &str) -> Result<(), TransmitError> {
        append_line(&self.log, &input_record(text));
        if let Some(delay) = self.reply_after {
            let log = self.log.clone();
            let answer = format!("echo: {text} {END}");
            thread::spawn(move || {
                thread::sleep(delay);
                append_line(&log, &output_record(&answer));
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "echo".to_string()
    }
}

struct Healthy;

impl HealthCheck for Healthy {
    fn check(&self, _probe_live: bool) -> HealthStatus {
        HealthStatus::ok("Session healthy")
    }
}

fn communicator(temp: &TempDir, provider: Provider, reply_after: Option<Duration>) -> Communicator {
    let mut settings = settings_in(temp);
    settings.codex.session_root = temp.path().join(provider.as_str());
    std::fs::create_dir_all(&settings.codex.session_root).unwrap();
    let log = settings.codex.session_root.join("rollout.jsonl");
    append_line(&log, &input_record("earlier"));

    let reader = AppendOnlyReader::new(provider, &settings)
        .with_watcher(ChangeWatcher::polling(Duration::from_millis(10)));
    Communicator::new(
        provider,
        Box::new(reader),
        Box::new(EchoPane { log, reply_after }),
        Box::new(Healthy),
    )
}

#[test]
fn test_slow_provider_does_not_block_fast_one() {
    let temp = TempDir::new().unwrap();
    let dispatcher = Dispatcher::new(|provider| {
        let reply_after = match provider {
            Provider::Codex => Some(Duration::from_millis(200)),
            Provider::Gemini => None,
        };
        Ok(communicator(&temp, provider, reply_after))
    });

    let started = Instant::now();
    let report = dispatcher
        .parallel_ask("ping", &Provider::ALL, Duration::from_secs(1), true)
        .unwrap();

    let codex = report.get(Provider::Codex).unwrap();
    assert!(codex.success);
    assert_eq!(codex.reply.as_deref(), Some("echo: ping"));

    let gemini = report.get(Provider::Gemini).unwrap();
    assert!(!gemini.success);
    assert_eq!(gemini.error.as_deref(), Some("Timeout waiting for reply"));

    assert!(!report.all_succeeded());
    assert_eq!(report.failures().count(), 1);
    // Both waits overlapped
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_factory_failure_is_isolated() {
    let temp = TempDir::new().unwrap();
    let finished = Mutex::new(Vec::new());
    let dispatcher = Dispatcher::new(|provider| match provider {
        Provider::Codex => Ok(communicator(&temp, provider, Some(Duration::from_millis(50)))),
        Provider::Gemini => Err(AskError::Unhealthy {
            provider,
            status: "gemini pane does not exist: %3".to_string(),
        }),
    })
    .with_observer(|result| finished.lock().unwrap().push(result.provider));

    let report = dispatcher
        .parallel_ask("status?", &Provider::ALL, Duration::from_secs(2), true)
        .unwrap();

    assert_eq!(report.len(), 2);
    assert!(report.get(Provider::Codex).unwrap().success);
    assert_eq!(
        report.get(Provider::Gemini).unwrap().error.as_deref(),
        Some("Session unhealthy: gemini pane does not exist: %3")
    );
    drop(dispatcher);

    let mut seen = finished.into_inner().unwrap();
    seen.sort();
    assert_eq!(seen, [Provider::Codex, Provider::Gemini]);
}

#[test]
fn test_no_wait_reports_delivery() {
    let temp = TempDir::new().unwrap();
    let dispatcher = Dispatcher::new(|provider| Ok(communicator(&temp, provider, None)));

    let report = dispatcher
        .parallel_ask("fire and forget", &Provider::ALL, Duration::ZERO, false)
        .unwrap();

    assert!(report.all_succeeded());
    for result in report.iter() {
        assert!(result.sent);
        assert!(result.reply.is_none());
    }
}
