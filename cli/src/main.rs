// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Conduit Node CLI
//!
//! The `conduit` binary hosts one coordinator: event bus, channel manager,
//! policy engine and constraints resolver.
//!
//! ## Commands
//!
//! - `conduit run [--emit-events]` - Run the node until Ctrl-C
//! - `conduit config show|validate|generate` - Configuration management
//! - `conduit policy check <TOOL>` - Evaluate a tool name against the configured policy
//! - `conduit model resolve <MODEL>` - Run admission control for a hypothetical request

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use conduit_cli::commands::{self, ConfigCommand, ModelCommand, PolicyCommand};
use conduit_core::domain::node_config::NodeConfigManifest;

/// Conduit - coordination core for agent runtimes
#[derive(Parser)]
#[command(name = "conduit")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CONDUIT_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (text, json). Defaults to the configured format.
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordination node until interrupted
    #[command(name = "run")]
    Run {
        /// Write every published event to stdout as a JSON line
        #[arg(long)]
        emit_events: bool,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Tool policy inspection
    #[command(name = "policy")]
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },

    /// Model admission inspection
    #[command(name = "model")]
    Model {
        #[command(subcommand)]
        command: ModelCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (level, format) = logging_settings(&cli);
    commands::logging::init(&level, &format)?;

    match cli.command {
        Some(Commands::Run { emit_events }) => commands::run::execute(cli.config, emit_events).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Policy { command }) => {
            commands::policy::handle_command(command, cli.config).await
        }
        Some(Commands::Model { command }) => {
            commands::model::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Flags win; otherwise the configured values; otherwise info/text.
///
/// Logging is not up yet, so a config that fails to load here is ignored; the
/// command itself reports the error.
fn logging_settings(cli: &Cli) -> (String, String) {
    let configured = NodeConfigManifest::load_or_default(cli.config.clone())
        .ok()
        .and_then(|config| config.spec.observability.and_then(|o| o.logging));

    let level = cli
        .log_level
        .clone()
        .or_else(|| configured.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| configured.map(|l| l.format))
        .unwrap_or_else(|| "text".to_string());

    (level, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_configured_logging() {
        let cli = Cli::parse_from([
            "conduit",
            "--config",
            "/nonexistent/conduit.yaml",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "run",
        ]);
        assert_eq!(
            logging_settings(&cli),
            ("debug".to_string(), "json".to_string())
        );
    }

    #[test]
    fn test_run_flag_parses() {
        let cli = Cli::parse_from(["conduit", "run", "--emit-events"]);
        assert!(matches!(cli.command, Some(Commands::Run { emit_events: true })));
    }
}
