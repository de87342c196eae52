//! Status line display with cursor hiding, plus a wait spinner.
//!
//! Forked from status-line crate (MIT license) with modifications:
//! - Hide cursor during display to prevent visual artifacts on spinners
//! - Show cursor when status line is cleared
//! - Never panic on a closed stderr
//!
//! Original: <https://github.com/pkolaczk/status-line>
//!
//! [`Spinner`] tracks a fan-out: how many providers were asked, how many
//! have answered, how many failed. Its final ✓/✗ line maps to an
//! [`ExitCode`].

use super::ExitCode;
use std::fmt::Display;
use std::io::Write;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use std::time::Instant;

const CURSOR_HIDE: &str = "\x1b[?25l";
const CURSOR_SHOW: &str = "\x1b[?25h";
const ERASE_DOWN: &str = "\x1b[J";
const CURSOR_LEFT: &str = "\r";
const CURSOR_PREV_LINE: &str = "\x1b[1F";

fn redraw(ansi: bool, state: &impl Display) {
    let stderr = std::io::stderr();
    let mut stderr = stderr.lock();
    let contents = format!("{state}");
    if ansi {
        let line_count = contents.chars().filter(|c| *c == '\n').count();

        // Hide cursor, erase, write content, move back to start
        let _ = write!(
            &mut stderr,
            "{CURSOR_HIDE}{ERASE_DOWN}{contents}{CURSOR_LEFT}"
        );

        for _ in 0..line_count {
            let _ = write!(&mut stderr, "{CURSOR_PREV_LINE}");
        }
    } else {
        let _ = writeln!(&mut stderr, "{contents}");
    }
    let _ = stderr.flush();
}

fn clear(ansi: bool) {
    if ansi {
        let stderr = std::io::stderr();
        let mut stderr = stderr.lock();
        // Erase and show cursor when clearing
        let _ = write!(&mut stderr, "{ERASE_DOWN}{CURSOR_SHOW}");
        let _ = stderr.flush();
    }
}

struct State<D> {
    data: D,
    visible: AtomicBool,
}

impl<D> State<D> {
    fn new(inner: D) -> State<D> {
        State {
            data: inner,
            visible: AtomicBool::new(false),
        }
    }
}

/// Options controlling how to display the status line
pub struct Options {
    /// How long to wait between subsequent refreshes of the status.
    /// Defaults to 100 ms on interactive terminals (TTYs) and 1 s if the standard error
    /// is not interactive, e.g. redirected to a file.
    pub refresh_period: Duration,

    /// Set it to false if you don't want to show the status on creation of the `StatusLine`.
    pub initially_visible: bool,

    /// Set to true to enable ANSI escape codes.
    /// By default set to true if the standard error is a TTY.
    pub enable_ansi_escapes: bool,
}

impl Default for Options {
    fn default() -> Self {
        let is_tty = is_terminal::is_terminal(std::io::stderr());
        let refresh_period_ms = if is_tty { 100 } else { 1000 };
        Options {
            refresh_period: Duration::from_millis(refresh_period_ms),
            initially_visible: true,
            enable_ansi_escapes: is_tty,
        }
    }
}

/// Wraps arbitrary data and displays it periodically on the screen.
pub struct StatusLine<D: Display> {
    state: Arc<State<D>>,
    options: Options,
}

impl<D: Display + Send + Sync + 'static> StatusLine<D> {
    /// Creates a new `StatusLine` with default options and shows it immediately.
    pub fn new(data: D) -> StatusLine<D> {
        Self::with_options(data, Default::default())
    }

    /// Creates a new `StatusLine` with custom options.
    pub fn with_options(data: D, options: Options) -> StatusLine<D> {
        let state = Arc::new(State::new(data));
        state
            .visible
            .store(options.initially_visible, Ordering::Release);
        let state_ref = state.clone();
        let ansi = options.enable_ansi_escapes;
        let period = options.refresh_period;
        thread::spawn(move || {
            while Arc::strong_count(&state_ref) > 1 {
                if state_ref.visible.load(Ordering::Acquire) {
                    redraw(ansi, &state_ref.data);
                }
                thread::sleep(period);
            }
        });
        StatusLine { state, options }
    }
}

impl<D: Display> StatusLine<D> {
    /// Forces redrawing the status information immediately.
    pub fn refresh(&self) {
        redraw(self.options.enable_ansi_escapes, &self.state.data);
    }

    /// Sets the visibility of the status line.
    pub fn set_visible(&self, visible: bool) {
        let was_visible = self.state.visible.swap(visible, Ordering::Release);
        if !visible && was_visible {
            clear(self.options.enable_ansi_escapes)
        } else if visible && !was_visible {
            redraw(self.options.enable_ansi_escapes, &self.state.data)
        }
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible.load(Ordering::Acquire)
    }
}

impl<D: Display> Deref for StatusLine<D> {
    type Target = D;
    fn deref(&self) -> &Self::Target {
        &self.state.data
    }
}

impl<D: Display> Drop for StatusLine<D> {
    fn drop(&mut self) {
        if self.is_visible() {
            clear(self.options.enable_ansi_escapes)
        }
    }
}

/// Animation state for a fan-out wait with exit-code reporting.
pub struct Spinner {
    total: u64,
    done: AtomicU64,
    failed: AtomicU64,
    label: String,
    start_time: Instant,
    frame_period_ms: u64,
    outcome_state: AtomicU8,
    exit_code: AtomicU8,
    error_message: Mutex<Option<String>>,
}

impl Spinner {
    const FRAMES: &'static [&'static str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

    const STATE_PENDING: u8 = 0;
    const STATE_PREPARING_SUCCESS: u8 = 1;
    const STATE_PREPARING_FAILURE: u8 = 2;
    const STATE_SUCCESS: u8 = 3;
    const STATE_FAILURE: u8 = 4;

    /// Spinner for `total` units of work, animated every 100 ms.
    pub fn new(label: impl Into<String>, total: u64) -> Self {
        Self::with_frame_period(label, total, Duration::from_millis(100))
    }

    pub fn with_frame_period(label: impl Into<String>, total: u64, frame_period: Duration) -> Self {
        Self {
            total,
            done: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            label: label.into(),
            start_time: Instant::now(),
            frame_period_ms: (frame_period.as_millis() as u64).max(1),
            outcome_state: AtomicU8::new(Self::STATE_PENDING),
            exit_code: AtomicU8::new(ExitCode::Success as u8),
            error_message: Mutex::new(None),
        }
    }

    /// Count one finished unit.
    pub fn record(&self, success: bool) {
        if self.is_finished() {
            return;
        }
        self.done.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Mark the spinner as succeeded, switching to ✓ output.
    pub fn mark_success(&self) {
        if self
            .outcome_state
            .compare_exchange(
                Self::STATE_PENDING,
                Self::STATE_PREPARING_SUCCESS,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.exit_code
                .store(ExitCode::Success as u8, Ordering::Relaxed);
            self.set_message(None);
            self.outcome_state
                .store(Self::STATE_SUCCESS, Ordering::Release);
        }
    }

    /// Mark the spinner as failed, providing an exit code and message.
    pub fn mark_failure(&self, code: ExitCode, message: impl Into<String>) {
        if self
            .outcome_state
            .compare_exchange(
                Self::STATE_PENDING,
                Self::STATE_PREPARING_FAILURE,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.exit_code.store(code as u8, Ordering::Relaxed);
            self.set_message(Some(message.into()));
            self.outcome_state
                .store(Self::STATE_FAILURE, Ordering::Release);
        }
    }

    /// Check whether the spinner reached a terminal state.
    pub fn is_finished(&self) -> bool {
        !matches!(
            self.outcome_state.load(Ordering::Acquire),
            Self::STATE_PENDING
        )
    }

    /// Retrieve the currently published exit code.
    pub fn current_exit_code(&self) -> ExitCode {
        ExitCode::from_u8(self.exit_code.load(Ordering::Acquire))
    }

    fn set_message(&self, message: Option<String>) {
        // A poisoned lock still holds a usable value
        let mut stored = self
            .error_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *stored = message;
    }

    fn message(&self) -> Option<String> {
        self.error_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Display for Spinner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let done = self.done();
        let failed = self.failed();
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let elapsed_ms = self.start_time.elapsed().as_millis() as u64;
        let state = self.outcome_state.load(Ordering::Acquire);

        match state {
            Self::STATE_PENDING => {
                let frame = (elapsed_ms / self.frame_period_ms) as usize % Self::FRAMES.len();
                write!(
                    f,
                    "{} {} | {done}/{} done",
                    Self::FRAMES[frame],
                    self.label,
                    self.total
                )?;
                if failed > 0 {
                    write!(f, " | {failed} failed")?;
                }
            }
            Self::STATE_PREPARING_SUCCESS | Self::STATE_SUCCESS => {
                write!(f, "✓ {} complete | {done}/{}", self.label, self.total)?;
            }
            _ => {
                let code = self.current_exit_code();
                write!(
                    f,
                    "✗ {} failed [exit code {} - {}]",
                    self.label,
                    code as u8,
                    code.description()
                )?;
                if let Some(message) = self.message() {
                    write!(f, ": {message}")?;
                }
                write!(f, " | {done}/{}", self.total)?;
            }
        }

        write!(f, " | {elapsed:.1}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinner_counts() {
        let spinner = Spinner::new("Waiting for 2 providers", 2);
        spinner.record(true);
        spinner.record(false);
        let line = spinner.to_string();
        assert!(line.contains("2/2 done"));
        assert!(line.contains("1 failed"));
    }

    #[test]
    fn test_spinner_outcome_is_final() {
        let spinner = Spinner::new("Waiting", 1);
        spinner.mark_failure(ExitCode::GeneralError, "codex timed out");
        spinner.mark_success();
        assert!(spinner.is_finished());
        assert_eq!(spinner.current_exit_code(), ExitCode::GeneralError);

        let line = spinner.to_string();
        assert!(line.starts_with("✗ Waiting failed [exit code 1"));
        assert!(line.contains("codex timed out"));

        // Finished spinners stop counting
        spinner.record(true);
        assert_eq!(spinner.done(), 0);
    }

    #[test]
    fn test_success_line() {
        let spinner = Spinner::new("Replies", 1);
        spinner.record(true);
        spinner.mark_success();
        assert!(spinner.to_string().starts_with("✓ Replies complete | 1/1"));
    }
}
