//! Ask command - fan one message out to several providers.

use is_terminal::IsTerminal;
use std::time::Duration;

use super::common::{fail, read_message};
use crate::comm::Communicator;
use crate::config::Settings;
use crate::dispatch::Dispatcher;
use crate::io::{Envelope, ExitCode, Spinner, StatusLine, format};
use crate::types::{OutputMode, Provider};

/// Run the ask command.
pub fn run(
    settings: &Settings,
    mode: OutputMode,
    message: &[String],
    providers: Vec<Provider>,
    all: bool,
    timeout: u64,
    wait: bool,
) -> ExitCode {
    let Some(message) = read_message(message) else {
        return fail(mode, None, ExitCode::UsageError, "Please provide a message");
    };
    let providers = if all || providers.is_empty() {
        settings.dispatch.default_providers.clone()
    } else {
        providers
    };

    // Workers stay silent; progress is shown by the status line
    let worker_mode = OutputMode {
        quiet: true,
        json: mode.json,
    };
    let factory = |provider: Provider| Communicator::connect(provider, settings, worker_mode);

    let status = (wait && mode.hints() && std::io::stderr().is_terminal()).then(|| {
        StatusLine::new(Spinner::new(
            format!("Waiting for {} provider(s)", providers.len()),
            providers.len() as u64,
        ))
    });

    let outcome = {
        let mut dispatcher = Dispatcher::new(factory)
            .with_unlimited_cap(Duration::from_secs(settings.dispatch.unlimited_cap_secs));
        if let Some(status) = status.as_ref() {
            dispatcher = dispatcher.with_observer(move |result| status.record(result.success));
        }
        dispatcher.parallel_ask(&message, &providers, Duration::from_secs(timeout), wait)
    };
    let report = match outcome {
        Ok(report) => report,
        Err(e) => return fail(mode, None, ExitCode::UsageError, &e.to_string()),
    };

    let exit = if report.all_succeeded() {
        ExitCode::Success
    } else {
        ExitCode::GeneralError
    };

    if let Some(status) = status {
        if exit.is_success() {
            status.mark_success();
        } else {
            let failed = report.failures().count();
            status.mark_failure(exit, format!("{failed} of {} failed", report.len()));
        }
        status.set_visible(false);
        eprintln!("{}", *status);
    }

    if mode.json {
        let count = report.len();
        let duration_ms = (report.elapsed_seconds * 1000.0) as u64;
        let envelope = if exit.is_success() {
            Envelope::success(report)
        } else {
            Envelope::partial(report, exit)
        };
        return envelope
            .with_count(count)
            .with_duration_ms(duration_ms)
            .emit();
    }

    println!("{}", format::dispatch_report(&report));
    exit
}
