//! Send command - one provider, optionally waiting with the timeout prompt.

use serde_json::json;
use std::time::Duration;

use super::common::{ask_failed, fail, read_message};
use crate::comm::{AskOutcome, Communicator};
use crate::config::Settings;
use crate::io::{Envelope, ExitCode, ResultCode};
use crate::types::{OutputMode, Provider};

/// Run the send command.
pub fn run(
    settings: &Settings,
    mode: OutputMode,
    provider: Provider,
    message: &[String],
    wait: bool,
    timeout: Option<u64>,
) -> ExitCode {
    let Some(message) = read_message(message) else {
        return fail(mode, Some(provider), ExitCode::UsageError, "Please provide a message");
    };
    let mut comm = match Communicator::connect(provider, settings, mode) {
        Ok(comm) => comm,
        Err(e) => return ask_failed(mode, provider, &e),
    };

    if !wait {
        return match comm.ask_async(&message) {
            Ok(marker) if mode.json => Envelope::success(json!({ "sent": true, "marker": marker }))
                .with_provider(provider)
                .with_hint(provider.pending_hint())
                .emit(),
            Ok(_) => ExitCode::Success,
            Err(e) => ask_failed(mode, provider, &e),
        };
    }

    let timeout = timeout.unwrap_or_else(|| settings.default_timeout(provider));
    match comm.ask_sync(&message, Duration::from_secs(timeout)) {
        Ok(AskOutcome::Replied(reply)) => {
            if mode.json {
                return Envelope::success(reply).with_provider(provider).emit();
            }
            println!("{}", reply.text);
            ExitCode::Success
        }
        Ok(AskOutcome::Backgrounded) => {
            if mode.json {
                return Envelope::success(json!({ "sent": true, "backgrounded": true }))
                    .with_provider(provider)
                    .with_code(ResultCode::Backgrounded)
                    .with_hint(provider.pending_hint())
                    .emit();
            }
            ExitCode::Success
        }
        Ok(AskOutcome::Cancelled) => {
            let message = format!(
                "No reply from {} within {timeout}s",
                provider.display_name()
            );
            if mode.json {
                let envelope: Envelope<()> = Envelope::error(ExitCode::GeneralError, message)
                    .with_provider(provider)
                    .with_code(ResultCode::Timeout)
                    .with_hint(provider.pending_hint());
                return envelope.emit();
            }
            eprintln!("{message}");
            ExitCode::GeneralError
        }
        Err(e) => ask_failed(mode, provider, &e),
    }
}
