//! What to do when a synchronous ask times out.

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::str::FromStr;
use std::time::Duration;

use crate::config::AskConfig;
use crate::types::Provider;

/// Choice taken after a timed-out wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutAction {
    /// Wait again with the same timeout.
    Wait,
    /// Stop waiting; the reply can be fetched later.
    Background,
    /// Give up.
    Cancel,
}

impl TimeoutAction {
    /// Interpret a typed answer; anything unrecognised cancels.
    pub fn from_choice(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "w" | "wait" => TimeoutAction::Wait,
            "b" | "background" => TimeoutAction::Background,
            _ => TimeoutAction::Cancel,
        }
    }
}

impl FromStr for TimeoutAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wait" => Ok(TimeoutAction::Wait),
            "background" => Ok(TimeoutAction::Background),
            "cancel" => Ok(TimeoutAction::Cancel),
            other => Err(format!("unknown timeout action '{other}'")),
        }
    }
}

/// Decides how to continue after a timeout.
pub trait TimeoutPrompt: Send {
    fn choose(&mut self, provider: Provider, timeout: Duration) -> TimeoutAction;
}

/// Always answers the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAction(pub TimeoutAction);

impl TimeoutPrompt for FixedAction {
    fn choose(&mut self, _provider: Provider, _timeout: Duration) -> TimeoutAction {
        self.0
    }
}

/// Asks on the terminal, with its own input timeout.
///
/// When stdin is not a terminal the configured fallback is used without
/// prompting.
pub struct TerminalPrompt {
    input_timeout: Duration,
    fallback: TimeoutAction,
    lines: Option<Receiver<String>>,
}

impl TerminalPrompt {
    pub fn new(input_timeout: Duration, fallback: TimeoutAction) -> Self {
        Self {
            input_timeout,
            fallback,
            lines: None,
        }
    }

    pub fn from_config(config: &AskConfig) -> Self {
        Self::new(
            Duration::from_secs(config.prompt_timeout_secs),
            config.timeout_action,
        )
    }

    /// Lines from stdin, read on a helper thread so the prompt can time out.
    fn lines(&mut self) -> &Receiver<String> {
        self.lines.get_or_insert_with(|| {
            let (tx, rx) = unbounded();
            std::thread::spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
            rx
        })
    }
}

impl TimeoutPrompt for TerminalPrompt {
    fn choose(&mut self, provider: Provider, timeout: Duration) -> TimeoutAction {
        if !std::io::stdin().is_terminal() {
            return self.fallback;
        }

        let name = provider.display_name();
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "\nRequest timed out. {name} hasn't replied yet.");
        let _ = writeln!(stderr, "What would you like to do?");
        let _ = writeln!(stderr, "  [w] Wait - keep waiting ({}s more)", timeout.as_secs());
        let _ = writeln!(
            stderr,
            "  [b] Background - exit and check later with `{}`",
            provider.pending_hint()
        );
        let _ = writeln!(stderr, "  [c] Cancel - give up (default)");
        let _ = write!(stderr, "Your choice (w/b/c) [c]: ");
        let _ = stderr.flush();

        let input_timeout = self.input_timeout;
        let lines = self.lines();
        // Drop answers typed while nobody was asking
        while lines.try_recv().is_ok() {}

        match lines.recv_timeout(input_timeout) {
            Ok(line) => TimeoutAction::from_choice(&line),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                let _ = writeln!(stderr);
                TimeoutAction::Cancel
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choices() {
        assert_eq!(TimeoutAction::from_choice("w"), TimeoutAction::Wait);
        assert_eq!(TimeoutAction::from_choice(" B \n"), TimeoutAction::Background);
        assert_eq!(TimeoutAction::from_choice(""), TimeoutAction::Cancel);
        assert_eq!(TimeoutAction::from_choice("maybe"), TimeoutAction::Cancel);
    }

    #[test]
    fn test_parse_action() {
        assert_eq!("Background".parse::<TimeoutAction>(), Ok(TimeoutAction::Background));
        assert!("later".parse::<TimeoutAction>().is_err());
    }

    #[test]
    fn test_fixed_action() {
        let mut prompt = FixedAction(TimeoutAction::Wait);
        assert_eq!(
            prompt.choose(Provider::Codex, Duration::from_secs(1)),
            TimeoutAction::Wait
        );
    }
}
