//! Helpers shared by the command implementations.

use is_terminal::IsTerminal;
use std::io::Read;

use crate::comm::AskError;
use crate::io::{Envelope, ExitCode};
use crate::types::{OutputMode, Provider};

/// Join positional words into a message, falling back to piped stdin.
pub fn read_message(parts: &[String]) -> Option<String> {
    let joined = parts.join(" ").trim().to_string();
    if !joined.is_empty() {
        return Some(joined);
    }

    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return None;
    }
    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer).ok()?;
    let message = buffer.trim().to_string();
    (!message.is_empty()).then_some(message)
}

/// Report a failure in the selected output mode.
pub fn fail(mode: OutputMode, provider: Option<Provider>, exit: ExitCode, message: &str) -> ExitCode {
    if mode.json {
        let mut envelope: Envelope<()> = Envelope::error(exit, message);
        if let Some(provider) = provider {
            envelope = envelope.with_provider(provider);
        }
        return envelope.emit();
    }

    eprintln!("Error: {message}");
    let suggestion = exit.suggestion();
    if !suggestion.is_empty() && !mode.quiet {
        eprintln!("  {}", console::style(suggestion).for_stderr().dim());
    }
    exit
}

/// Report a failed exchange with the exit code of its family.
pub fn ask_failed(mode: OutputMode, provider: Provider, error: &AskError) -> ExitCode {
    fail(
        mode,
        Some(provider),
        ExitCode::from_ask_error(error),
        &error.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_words_are_joined() {
        let parts = vec!["hello".to_string(), "world ".to_string()];
        assert_eq!(read_message(&parts).as_deref(), Some("hello world"));
    }
}
