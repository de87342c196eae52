//! `ccb` binary: load settings, initialise logging, run one command.

use anyhow::Context;
use clap::Parser;
use std::path::Path;

use ccbridge::cli::commands::{ask, init, send, session};
use ccbridge::cli::{Cli, Commands};
use ccbridge::io::ExitCode;
use ccbridge::{Settings, log_event, logging};

fn load_settings(config: Option<&Path>) -> anyhow::Result<Settings> {
    match config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            Settings::load_from(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        None => Settings::load().context("Failed to load configuration"),
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mode = cli.output.mode();

    // Init must work before any configuration exists
    if let Commands::Init { force } = cli.command {
        logging::init();
        return init::run_init(force, mode).into();
    }

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init();
            let exit = if cli.config.as_deref().is_some_and(|path| !path.exists()) {
                ExitCode::ConfigNotFound
            } else {
                ExitCode::ConfigInvalid
            };
            eprintln!("Error: {e:#}");
            return exit.into();
        }
    };
    logging::init_with_config(&settings.logging);
    log_event!("ccb", "start", "{:?}", cli.command);

    let exit = match cli.command {
        Commands::Ask {
            message,
            providers,
            all,
            wait: _,
            no_wait,
            timeout,
        } => ask::run(&settings, mode, &message, providers, all, timeout, !no_wait),
        Commands::Send {
            provider,
            message,
            wait,
            timeout,
        } => send::run(&settings, mode, provider, &message, wait, timeout),
        Commands::Pend { provider } => session::run_pend(&settings, mode, provider),
        Commands::History { provider, n } => session::run_history(&settings, mode, provider, n),
        Commands::Ping { provider } => session::run_ping(&settings, mode, provider),
        Commands::Status { provider } => session::run_status(&settings, mode, provider),
        Commands::Config => init::run_config(&settings, mode),
        Commands::Init { .. } => ExitCode::UsageError,
    };

    exit.into()
}
