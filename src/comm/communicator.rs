//! One provider exchange: precheck, baseline, transmit, wait, escalate.
//!
//! ```text
//! Sent ──► Waiting ──► Replied
//!             │
//!             ▼
//!         TimedOut ──► Waiting (again) | Backgrounded | Cancelled
//! ```

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::error::AskError;
use super::escalation::{FixedAction, TerminalPrompt, TimeoutAction, TimeoutPrompt};
use crate::config::Settings;
use crate::reader::{AppendOnlyReader, Checkpoint, MutableDocumentReader, ReplyReader};
use crate::session::{
    HealthCheck, HealthStatus, SessionBinding, SessionHealth, SessionInfo, Transmit,
    correlation_marker, transmit_for,
};
use crate::types::{Conversation, OutputMode, Provider, RecordFormat, Reply};
use crate::{debug_event, log_event};

/// Progress of a synchronous ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AskState {
    Sent,
    Waiting,
    Replied,
    TimedOut,
    Backgrounded,
    Cancelled,
}

impl AskState {
    /// Whether the exchange is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AskState::Replied | AskState::Backgrounded | AskState::Cancelled
        )
    }
}

/// How a synchronous ask ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    Replied(Reply),
    /// The caller stopped waiting; the reply can be fetched with `pending`.
    Backgrounded,
    Cancelled,
}

impl AskOutcome {
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            AskOutcome::Replied(reply) => Some(reply),
            _ => None,
        }
    }
}

/// Snapshot reported by `ccb status`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub provider: Provider,
    pub session_id: Option<String>,
    pub runtime_dir: Option<PathBuf>,
    pub terminal: Option<String>,
    pub pane_id: Option<String>,
    /// Input channel, e.g. `tmux:codex-1`.
    pub channel: String,
    /// Record file replies are currently read from.
    pub log_path: Option<PathBuf>,
    pub healthy: bool,
    pub status: String,
}

/// Talks to one provider session.
///
/// Owns exactly one reader, so checkpoints never cross providers.
pub struct Communicator {
    provider: Provider,
    session: Option<SessionInfo>,
    reader: Box<dyn ReplyReader>,
    transmit: Box<dyn Transmit>,
    health: Box<dyn HealthCheck>,
    prompt: Box<dyn TimeoutPrompt>,
    unlimited_slice: Duration,
    mode: OutputMode,
    state: Option<AskState>,
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("provider", &self.provider)
            .field("channel", &self.transmit.describe())
            .field("state", &self.state)
            .finish()
    }
}

impl Communicator {
    /// Assemble a communicator from its collaborators.
    ///
    /// Timeouts cancel unless a prompt is supplied with [`with_prompt`](Self::with_prompt).
    pub fn new(
        provider: Provider,
        reader: Box<dyn ReplyReader>,
        transmit: Box<dyn Transmit>,
        health: Box<dyn HealthCheck>,
    ) -> Self {
        Self {
            provider,
            session: None,
            reader,
            transmit,
            health,
            prompt: Box::new(FixedAction(TimeoutAction::Cancel)),
            unlimited_slice: Duration::from_secs(30),
            mode: OutputMode::default(),
            state: None,
        }
    }

    /// Connect to the live session of `provider` for the configured project.
    pub fn connect(provider: Provider, settings: &Settings, mode: OutputMode) -> Result<Self, AskError> {
        let session = SessionInfo::load(provider, &settings.project_dir())?;
        let transmit =
            transmit_for(&session).map_err(|source| AskError::Transmit { provider, source })?;
        let reader = reader_for_session(settings, &session);
        let health = Box::new(SessionHealth::new(session.clone()));

        debug_event!(
            "ask",
            "connected",
            "{provider} via {} (session {})",
            transmit.describe(),
            session.session_id
        );

        Ok(Self::new(provider, reader, transmit, health)
            .with_session(session)
            .with_prompt(Box::new(TerminalPrompt::from_config(&settings.ask)))
            .with_unlimited_slice(Duration::from_secs(settings.ask.unlimited_slice_secs.max(1)))
            .with_output(mode))
    }

    /// Attach the session whose binding should follow the reader.
    pub fn with_session(mut self, session: SessionInfo) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_prompt(mut self, prompt: Box<dyn TimeoutPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Slice length for unlimited waits; a liveness hint is printed per slice.
    pub fn with_unlimited_slice(mut self, slice: Duration) -> Self {
        self.unlimited_slice = slice;
        self
    }

    pub fn with_output(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Last state reached by a synchronous ask, if one ran.
    pub fn state(&self) -> Option<AskState> {
        self.state
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    /// Send `message` and wait for the reply.
    ///
    /// `timeout == 0` waits without limit. On timeout the prompt decides
    /// whether to wait again, background or cancel.
    pub fn ask_sync(&mut self, message: &str, timeout: Duration) -> Result<AskOutcome, AskError> {
        self.precheck()?;
        let checkpoint = self.reader.capture_baseline();
        self.send(message)?;

        if timeout.is_zero() {
            return self.wait_unlimited(checkpoint).map(AskOutcome::Replied);
        }
        self.wait_escalating(checkpoint, timeout)
    }

    /// Send `message` without waiting. Returns the correlation marker.
    pub fn ask_async(&mut self, message: &str) -> Result<String, AskError> {
        self.precheck()?;
        let marker = self.send(message)?;
        self.hint(format!(
            "Sent to {}. Check the reply later with `{}`",
            self.provider.display_name(),
            self.provider.pending_hint()
        ));
        Ok(marker)
    }

    /// Precheck, send and wait once, without hints or escalation.
    ///
    /// `Ok(None)` means the timeout elapsed.
    pub fn send_and_wait(&mut self, message: &str, timeout: Duration) -> Result<Option<Reply>, AskError> {
        self.precheck()?;
        let checkpoint = self.reader.capture_baseline();
        self.send(message)?;

        self.enter(AskState::Waiting);
        let polled = self.reader.wait_for_reply(checkpoint, timeout)?;
        self.remember(polled.checkpoint.path());
        match polled.reply {
            Some(reply) => {
                self.replied(&reply);
                Ok(Some(reply))
            }
            None => {
                self.enter(AskState::TimedOut);
                Ok(None)
            }
        }
    }

    /// Latest reply in the bound record file.
    pub fn pending(&mut self) -> Option<Reply> {
        let reply = self.reader.latest_reply()?;
        self.remember(Some(&reply.source));
        Some(reply)
    }

    /// Last `n` question/answer pairs; `0` returns all.
    pub fn conversations(&mut self, n: usize) -> Vec<Conversation> {
        self.reader.latest_conversations(n)
    }

    /// Health including a live probe of the terminal.
    pub fn ping(&self) -> HealthStatus {
        self.health.check(true)
    }

    pub fn status(&mut self) -> SessionStatus {
        let health = self.ping();
        let session = self.session.as_ref();
        SessionStatus {
            provider: self.provider,
            session_id: session.map(|s| s.session_id.clone()),
            runtime_dir: session.map(|s| s.runtime_dir.clone()),
            terminal: session.map(|s| s.terminal.as_str().to_string()),
            pane_id: session.and_then(|s| s.pane_id.clone()),
            channel: self.transmit.describe(),
            log_path: self.reader.current_target(),
            healthy: health.healthy,
            status: health.status,
        }
    }

    fn precheck(&self) -> Result<(), AskError> {
        let health = self.health.check(false);
        if health.healthy {
            Ok(())
        } else {
            Err(AskError::Unhealthy {
                provider: self.provider,
                status: health.status,
            })
        }
    }

    fn send(&mut self, message: &str) -> Result<String, AskError> {
        let marker = correlation_marker();
        self.transmit
            .send(message, &marker)
            .map_err(|source| AskError::Transmit {
                provider: self.provider,
                source,
            })?;
        log_event!(
            "ask",
            "sent",
            "{} {} bytes via {} ({marker})",
            self.provider,
            message.len(),
            self.transmit.describe()
        );
        self.enter(AskState::Sent);
        Ok(marker)
    }

    fn wait_unlimited(&mut self, mut checkpoint: Checkpoint) -> Result<Reply, AskError> {
        let started = Instant::now();
        self.hint(format!(
            "Waiting for {} reply (no timeout, Ctrl-C to interrupt)...",
            self.provider.display_name()
        ));
        self.enter(AskState::Waiting);

        loop {
            let polled = self.reader.wait_for_reply(checkpoint, self.unlimited_slice)?;
            self.remember(polled.checkpoint.path());
            if let Some(reply) = polled.reply {
                self.replied(&reply);
                return Ok(reply);
            }
            checkpoint = polled.checkpoint;
            self.hint(format!("Still waiting... ({}s)", started.elapsed().as_secs()));
        }
    }

    fn wait_escalating(
        &mut self,
        mut checkpoint: Checkpoint,
        timeout: Duration,
    ) -> Result<AskOutcome, AskError> {
        loop {
            self.hint(format!(
                "Waiting for {} reply (timeout {}s)...",
                self.provider.display_name(),
                timeout.as_secs()
            ));
            self.enter(AskState::Waiting);

            let polled = self.reader.wait_for_reply(checkpoint, timeout)?;
            self.remember(polled.checkpoint.path());
            if let Some(reply) = polled.reply {
                self.replied(&reply);
                return Ok(AskOutcome::Replied(reply));
            }
            checkpoint = polled.checkpoint;
            self.enter(AskState::TimedOut);

            match self.prompt.choose(self.provider, timeout) {
                TimeoutAction::Wait => continue,
                TimeoutAction::Background => {
                    self.enter(AskState::Backgrounded);
                    self.hint(format!(
                        "Left running in the background. Check later with `{}`",
                        self.provider.pending_hint()
                    ));
                    return Ok(AskOutcome::Backgrounded);
                }
                TimeoutAction::Cancel => {
                    self.enter(AskState::Cancelled);
                    self.hint("Cancelled.".to_string());
                    return Ok(AskOutcome::Cancelled);
                }
            }
        }
    }

    fn replied(&mut self, reply: &Reply) {
        self.remember(Some(&reply.source));
        log_event!(
            "ask",
            "replied",
            "{} {} chars from {}",
            self.provider,
            reply.text.len(),
            reply.source.display()
        );
        self.enter(AskState::Replied);
    }

    /// Follow the record file the reader settled on, persisting it for file sessions.
    fn remember(&mut self, path: Option<&Path>) {
        let Some(path) = path else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.preferred_log.as_deref() == Some(path) {
            return;
        }

        let binding = SessionBinding::for_log(self.provider, path);
        match session.bind(&binding) {
            Ok(persisted) => debug_event!(
                "ask",
                "bound",
                "{} -> {} (persisted: {persisted})",
                self.provider,
                path.display()
            ),
            Err(e) => tracing::warn!("[ask] could not record session binding: {e}"),
        }
        self.reader.set_preferred(path);
    }

    fn enter(&mut self, next: AskState) {
        debug_event!(
            "ask",
            "state",
            "{} {:?} -> {next:?}",
            self.provider,
            self.state
        );
        self.state = Some(next);
    }

    fn hint(&self, message: String) {
        if self.mode.hints() {
            eprintln!("{}", console::style(message).for_stderr().dim());
        }
    }
}

/// Reader for a session, picked by the provider's record format.
fn reader_for_session(settings: &Settings, session: &SessionInfo) -> Box<dyn ReplyReader> {
    let provider = session.provider;
    let mut reader: Box<dyn ReplyReader> = match provider.record_format() {
        RecordFormat::AppendOnly => Box::new(
            AppendOnlyReader::new(provider, settings)
                .with_session_filter(session.provider_session_id.clone()),
        ),
        RecordFormat::MutableDocument => {
            let mut settings = settings.clone();
            if session.project_hash.is_some() {
                settings.gemini.project_hash = session.project_hash.clone();
            }
            let work_dir = session
                .work_dir
                .clone()
                .unwrap_or_else(|| settings.project_dir());
            Box::new(MutableDocumentReader::new(provider, &settings, &work_dir))
        }
    };

    if let Some(log) = session.preferred_log.as_deref().filter(|log| log.exists()) {
        reader.set_preferred(log);
    }
    reader
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Polled;
    use crate::session::TransmitError;
    use std::sync::{Arc, Mutex};

    /// Reader that replays scripted wait results.
    struct ScriptedReader {
        replies: Vec<Option<Reply>>,
        waits: Arc<Mutex<Vec<Duration>>>,
    }

    impl ReplyReader for ScriptedReader {
        fn provider(&self) -> Provider {
            Provider::Codex
        }
        fn current_target(&mut self) -> Option<PathBuf> {
            None
        }
        fn set_preferred(&mut self, _path: &Path) {}
        fn capture_baseline(&mut self) -> Checkpoint {
            Checkpoint::AppendOffset(Default::default())
        }
        fn wait_for_reply(
            &mut self,
            checkpoint: Checkpoint,
            timeout: Duration,
        ) -> crate::reader::ReaderResult<Polled> {
            self.waits.lock().unwrap().push(timeout);
            let next = if self.replies.is_empty() {
                None
            } else {
                self.replies.remove(0)
            };
            Ok(Polled {
                reply: next,
                checkpoint,
            })
        }
        fn try_reply(&mut self, checkpoint: Checkpoint) -> crate::reader::ReaderResult<Polled> {
            Ok(Polled::nothing(checkpoint))
        }
        fn latest_reply(&mut self) -> Option<Reply> {
            None
        }
        fn latest_conversations(&mut self, _n: usize) -> Vec<Conversation> {
            Vec::new()
        }
    }

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Transmit for Recorder {
        fn send(&self, text: &str, _marker: &str) -> Result<(), TransmitError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
        fn describe(&self) -> String {
            "recorder".to_string()
        }
    }

    struct Health(bool);

    impl HealthCheck for Health {
        fn check(&self, _probe_live: bool) -> HealthStatus {
            if self.0 {
                HealthStatus::ok("Session healthy")
            } else {
                HealthStatus::failed("Runtime directory not found")
            }
        }
    }

    fn communicator(
        replies: Vec<Option<Reply>>,
        healthy: bool,
    ) -> (Communicator, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<Duration>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let waits = Arc::new(Mutex::new(Vec::new()));
        let reader = ScriptedReader {
            replies,
            waits: Arc::clone(&waits),
        };
        let comm = Communicator::new(
            Provider::Codex,
            Box::new(reader),
            Box::new(Recorder(Arc::clone(&sent))),
            Box::new(Health(healthy)),
        )
        .with_output(OutputMode {
            quiet: true,
            json: false,
        });
        (comm, sent, waits)
    }

    #[test]
    fn test_unhealthy_session_is_not_sent_to() {
        let (mut comm, sent, _) = communicator(vec![], false);
        let err = comm.ask_sync("hi", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, AskError::Unhealthy { .. }));
        assert_eq!(err.to_string(), "Session unhealthy: Runtime directory not found");
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reply_ends_in_replied_state() {
        let reply = Reply::new("done", "/tmp/log.jsonl");
        let (mut comm, sent, _) = communicator(vec![Some(reply.clone())], true);
        let outcome = comm.ask_sync("question", Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, AskOutcome::Replied(reply));
        assert_eq!(comm.state(), Some(AskState::Replied));
        assert_eq!(sent.lock().unwrap().as_slice(), ["question"]);
    }

    #[test]
    fn test_wait_repeats_with_same_timeout() {
        let reply = Reply::new("late", "/tmp/log.jsonl");
        let (comm, _, waits) = communicator(vec![None, None, Some(reply.clone())], true);

        struct AlwaysWait;
        impl TimeoutPrompt for AlwaysWait {
            fn choose(&mut self, _provider: Provider, _timeout: Duration) -> TimeoutAction {
                TimeoutAction::Wait
            }
        }

        let mut comm = comm.with_prompt(Box::new(AlwaysWait));
        let outcome = comm.ask_sync("q", Duration::from_secs(7)).unwrap();
        assert_eq!(outcome.reply(), Some(&reply));
        assert_eq!(
            waits.lock().unwrap().as_slice(),
            [Duration::from_secs(7); 3]
        );
    }

    #[test]
    fn test_timeout_actions() {
        let (comm, _, _) = communicator(vec![None], true);
        let mut comm = comm.with_prompt(Box::new(FixedAction(TimeoutAction::Background)));
        assert_eq!(
            comm.ask_sync("q", Duration::from_secs(1)).unwrap(),
            AskOutcome::Backgrounded
        );
        assert_eq!(comm.state(), Some(AskState::Backgrounded));

        let (mut comm, _, _) = communicator(vec![None], true);
        assert_eq!(
            comm.ask_sync("q", Duration::from_secs(1)).unwrap(),
            AskOutcome::Cancelled
        );
        assert!(comm.state().is_some_and(|state| state.is_terminal()));
    }

    #[test]
    fn test_unlimited_wait_uses_slices() {
        let reply = Reply::new("eventually", "/tmp/log.jsonl");
        let (comm, _, waits) = communicator(vec![None, None, Some(reply.clone())], true);
        let mut comm = comm.with_unlimited_slice(Duration::from_millis(5));
        let outcome = comm.ask_sync("q", Duration::ZERO).unwrap();
        assert_eq!(outcome, AskOutcome::Replied(reply));
        assert_eq!(
            waits.lock().unwrap().as_slice(),
            [Duration::from_millis(5); 3]
        );
    }

    #[test]
    fn test_send_and_wait_reports_timeout_as_none() {
        let (mut comm, _, _) = communicator(vec![None], true);
        assert_eq!(comm.send_and_wait("q", Duration::from_millis(1)).unwrap(), None);
        assert_eq!(comm.state(), Some(AskState::TimedOut));
    }
}
