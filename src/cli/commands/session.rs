//! Read-only session commands: pend, history, ping, status.

use super::common::ask_failed;
use crate::comm::Communicator;
use crate::config::Settings;
use crate::io::{Envelope, ExitCode, format};
use crate::types::{OutputMode, Provider};

fn connect(settings: &Settings, mode: OutputMode, provider: Provider) -> Result<Communicator, ExitCode> {
    Communicator::connect(provider, settings, mode).map_err(|e| ask_failed(mode, provider, &e))
}

/// Print the latest reply.
pub fn run_pend(settings: &Settings, mode: OutputMode, provider: Provider) -> ExitCode {
    let mut comm = match connect(settings, mode, provider) {
        Ok(comm) => comm,
        Err(code) => return code,
    };

    match comm.pending() {
        Some(reply) if mode.json => Envelope::success(reply).with_provider(provider).emit(),
        Some(reply) => {
            println!("{}", reply.text);
            ExitCode::Success
        }
        None => {
            let message = format!("No reply available from {}", provider.display_name());
            if mode.json {
                let envelope: Envelope<()> = Envelope::not_found(message).with_provider(provider);
                return envelope.emit();
            }
            eprintln!("{message}");
            ExitCode::GeneralError
        }
    }
}

/// Print the last `n` exchanges (`0` = all).
pub fn run_history(settings: &Settings, mode: OutputMode, provider: Provider, n: usize) -> ExitCode {
    let mut comm = match connect(settings, mode, provider) {
        Ok(comm) => comm,
        Err(code) => return code,
    };

    let items = comm.conversations(n);
    if items.is_empty() {
        let message = format!("No conversation history for {}", provider.display_name());
        if mode.json {
            let envelope: Envelope<()> = Envelope::not_found(message).with_provider(provider);
            return envelope.emit();
        }
        eprintln!("{message}");
        return ExitCode::GeneralError;
    }

    if mode.json {
        let count = items.len();
        return Envelope::success(items)
            .with_provider(provider)
            .with_count(count)
            .emit();
    }
    println!("{}", format::conversations(&items));
    ExitCode::Success
}

/// Probe the session, including the live pane check.
pub fn run_ping(settings: &Settings, mode: OutputMode, provider: Provider) -> ExitCode {
    let comm = match connect(settings, mode, provider) {
        Ok(comm) => comm,
        Err(code) => return code,
    };

    let health = comm.ping();
    let exit = if health.healthy {
        ExitCode::Success
    } else {
        ExitCode::BackendNotRunning
    };
    if mode.json {
        let message = health.status.clone();
        return Envelope::success(health)
            .with_provider(provider)
            .with_message(message)
            .with_exit(exit)
            .emit();
    }
    println!("{}", format::health(provider, &health));
    exit
}

/// Print session details.
pub fn run_status(settings: &Settings, mode: OutputMode, provider: Provider) -> ExitCode {
    let mut comm = match connect(settings, mode, provider) {
        Ok(comm) => comm,
        Err(code) => return code,
    };

    let status = comm.status();
    let exit = if status.healthy {
        ExitCode::Success
    } else {
        ExitCode::BackendNotRunning
    };
    if mode.json {
        return Envelope::success(status)
            .with_provider(provider)
            .with_exit(exit)
            .emit();
    }
    println!("{}", format::session_status(&status));
    exit
}
