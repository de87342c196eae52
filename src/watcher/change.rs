//! Blocking wait for a single file or directory to change.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use notify::event::{AccessKind, MetadataKind, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::error::WatchError;
use crate::backoff::Backoff;
use crate::config::{WatchBackend, WatchConfig};

/// Sleep used when the watched path does not exist yet.
const MISSING_PATH_SLEEP: Duration = Duration::from_millis(100);
/// Sleep used when arming or receiving fails.
const FALLBACK_SLEEP: Duration = Duration::from_millis(50);

/// Result of one [`ChangeWatcher::wait_for_change`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A write, extend, delete or rename was observed.
    Changed,
    /// Nothing happened before the timeout.
    TimedOut,
    /// Polling or a degraded watch; the caller should re-read.
    Unknown,
    /// The path does not exist; the caller should re-resolve it.
    Missing,
}

impl WaitOutcome {
    /// Whether the caller should treat this as a wake-up.
    pub fn woke(self) -> bool {
        matches!(self, WaitOutcome::Changed | WaitOutcome::Unknown)
    }
}

/// A watch registered on one path.
struct Armed {
    path: PathBuf,
    events: Receiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

/// Waits for file changes using kernel notification, falling back to polling.
///
/// Owned by a single reader; not shared between providers.
pub struct ChangeWatcher {
    use_notify: bool,
    poll: Backoff,
    armed: Option<Armed>,
}

impl ChangeWatcher {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            use_notify: config.backend != WatchBackend::Poll,
            poll: Backoff::constant(config.poll_interval()),
            armed: None,
        }
    }

    /// A watcher that only ever polls at the given interval.
    pub fn polling(interval: Duration) -> Self {
        Self {
            use_notify: false,
            poll: Backoff::constant(interval.clamp(Duration::from_millis(10), Duration::from_millis(500))),
            armed: None,
        }
    }

    /// Poll interval this watcher sleeps for when it cannot block on events.
    pub fn poll_interval(&self) -> Duration {
        self.poll.floor
    }

    /// Block until `path` changes or `timeout` elapses.
    pub fn wait_for_change(&mut self, path: &Path, timeout: Duration) -> WaitOutcome {
        if !path.exists() {
            self.disarm_if(path);
            thread::sleep(timeout.min(MISSING_PATH_SLEEP));
            return WaitOutcome::Missing;
        }

        if !self.use_notify {
            thread::sleep(timeout.min(self.poll.floor));
            return WaitOutcome::Unknown;
        }

        if !self.is_armed_on(path) {
            if let Err(e) = self.arm(path) {
                crate::debug_event!("watcher", "degraded to sleep", "{e}");
                self.armed = None;
                thread::sleep(timeout.min(FALLBACK_SLEEP));
                return WaitOutcome::Unknown;
            }
        }

        self.receive(timeout)
    }

    fn is_armed_on(&self, path: &Path) -> bool {
        self.armed.as_ref().is_some_and(|armed| armed.path == path)
    }

    fn disarm_if(&mut self, path: &Path) {
        if self.is_armed_on(path) {
            self.armed = None;
        }
    }

    fn arm(&mut self, path: &Path) -> Result<(), WatchError> {
        let (tx, rx) = unbounded();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        crate::debug_event!("watcher", "armed", "{}", path.display());
        self.armed = Some(Armed {
            path: path.to_path_buf(),
            events: rx,
            _watcher: watcher,
        });
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            let Some(armed) = self.armed.as_ref() else {
                return WaitOutcome::Unknown;
            };
            let remaining = deadline.saturating_duration_since(Instant::now());

            match armed.events.recv_timeout(remaining) {
                Ok(Ok(event)) => {
                    if !is_content_change(&event.kind) {
                        continue;
                    }
                    if replaces_file(&event.kind) {
                        // The inode we watch is gone; watch the replacement next time
                        self.armed = None;
                    } else {
                        while armed.events.try_recv().is_ok() {}
                    }
                    return WaitOutcome::Changed;
                }
                Ok(Err(e)) => {
                    let e = WatchError::EventError {
                        details: e.to_string(),
                    };
                    crate::debug_event!("watcher", "event error", "{e}");
                    self.armed = None;
                    thread::sleep(remaining.min(FALLBACK_SLEEP));
                    return WaitOutcome::Unknown;
                }
                Err(RecvTimeoutError::Timeout) => return WaitOutcome::TimedOut,
                Err(RecvTimeoutError::Disconnected) => {
                    self.armed = None;
                    thread::sleep(remaining.min(FALLBACK_SLEEP));
                    return WaitOutcome::Unknown;
                }
            }
        }
    }
}

/// Reads by this process show up as access events; only writes, creates,
/// deletes and renames count.
fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(notify::event::AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => false,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Any | EventKind::Other => true,
    }
}

fn replaces_file(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}
