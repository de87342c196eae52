//! Init and Config commands.

use std::path::PathBuf;

use super::common::fail;
use crate::config::{CONFIG_DIR, Settings};
use crate::io::{Envelope, ExitCode};
use crate::types::OutputMode;

/// Run init command - create configuration file.
pub fn run_init(force: bool, mode: OutputMode) -> ExitCode {
    let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

    if config_path.exists() && !force {
        let message = format!(
            "Configuration file already exists at: {}. Use --force to overwrite",
            config_path.display()
        );
        return fail(mode, None, ExitCode::UsageError, &message);
    }

    match Settings::init_config_file(force) {
        Ok(path) if mode.json => Envelope::success(path).emit(),
        Ok(path) => {
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            ExitCode::Success
        }
        Err(e) => fail(mode, None, ExitCode::ConfigPermission, &e.to_string()),
    }
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings, mode: OutputMode) -> ExitCode {
    if mode.json {
        return Envelope::success(config).emit();
    }

    match toml::to_string_pretty(config) {
        Ok(toml_str) => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{toml_str}");
            ExitCode::Success
        }
        Err(e) => fail(mode, None, ExitCode::ConfigInvalid, &format!("Error displaying config: {e}")),
    }
}
