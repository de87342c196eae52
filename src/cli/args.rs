//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::types::{OutputMode, Provider};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Bridge messages between a controlling terminal and AI assistant panes
#[derive(Parser, Debug)]
#[command(
    name = "ccb",
    version = env!("CARGO_PKG_VERSION"),
    about = "Send prompts to AI assistant panes and collect their replies",
    long_about = "Send prompts to Codex and Gemini sessions running in tmux or WezTerm panes,\nthen read their replies back from the session records they write to disk.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ ccb ask \"review src/lib.rs\"            # Ask every provider, wait for replies\n  $ ccb ask -p codex -t 60 \"explain this\"  # One provider, 60s timeout\n  $ ccb send gemini \"summarise\" --wait    # Single provider with timeout prompt\n  $ ccb pend codex                        # Fetch the latest reply\n  $ ccb history gemini -n 3               # Last three exchanges"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output flags shared by every command.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct OutputArgs {
    /// Emit a JSON envelope on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress progress hints on stderr
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl OutputArgs {
    pub fn mode(&self) -> OutputMode {
        OutputMode {
            quiet: self.quiet,
            json: self.json,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message to several providers at once
    #[command(
        about = "Ask several providers concurrently",
        after_help = "Examples:\n  ccb ask \"what does this function do?\"\n  ccb ask -p codex,gemini -t 120 \"review the diff\"\n  ccb ask --no-wait \"start on the tests\"\n\nExit status is 0 only when every provider replied."
    )]
    Ask {
        /// Message to send (read from stdin when omitted)
        #[arg(num_args = 0..)]
        message: Vec<String>,

        /// Comma-separated providers (codex,gemini)
        #[arg(short, long, value_delimiter = ',', conflicts_with = "all")]
        providers: Vec<Provider>,

        /// Send to all providers
        #[arg(short, long)]
        all: bool,

        /// Wait for replies (default)
        #[arg(short, long, overrides_with = "no_wait")]
        wait: bool,

        /// Deliver the message and return without waiting
        #[arg(long)]
        no_wait: bool,

        /// Timeout in seconds (0 = unlimited, capped by dispatch.unlimited_cap_secs)
        #[arg(short, long, default_value_t = 0)]
        timeout: u64,
    },

    /// Send a message to one provider
    #[command(
        about = "Send a message to one provider",
        after_help = "Examples:\n  ccb send codex \"run the tests\"\n  ccb send gemini \"summarise README.md\" --wait -t 90\n  ccb send codex \"long task\" --wait -t 0    # wait without limit"
    )]
    Send {
        provider: Provider,

        /// Message to send (read from stdin when omitted)
        #[arg(num_args = 0..)]
        message: Vec<String>,

        /// Wait for the reply
        #[arg(short, long)]
        wait: bool,

        /// Timeout in seconds (default from settings, 0 = unlimited)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Print the latest reply from a provider
    #[command(about = "Show the latest reply")]
    Pend { provider: Provider },

    /// Print recent question/answer pairs
    #[command(about = "Show recent exchanges")]
    History {
        provider: Provider,

        /// Number of exchanges (0 = all)
        #[arg(short, long, default_value_t = 1)]
        n: usize,
    },

    /// Check whether a provider session can take input
    #[command(about = "Check session health")]
    Ping { provider: Provider },

    /// Show session details
    #[command(about = "Show session details")]
    Status { provider: Provider },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Initialize project
    #[command(about = "Create .ccb/settings.toml with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ask_arguments() {
        let cli = Cli::parse_from([
            "ccb", "--json", "ask", "-p", "codex,gemini", "-t", "30", "--no-wait", "hello", "there",
        ]);
        assert!(cli.output.json);
        match cli.command {
            Commands::Ask {
                message,
                providers,
                no_wait,
                timeout,
                ..
            } => {
                assert_eq!(message, ["hello", "there"]);
                assert_eq!(providers, [Provider::Codex, Provider::Gemini]);
                assert!(no_wait);
                assert_eq!(timeout, 30);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_provider_is_a_usage_error() {
        assert!(Cli::try_parse_from(["ccb", "pend", "claude"]).is_err());
        assert!(Cli::try_parse_from(["ccb", "ask", "-p", "codex,nope", "hi"]).is_err());
    }
}
