// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use conduit_core::domain::node_config::NodeConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./conduit-config.yaml)
        #[arg(short, long, default_value = "./conduit-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CONDUIT_CONFIG_PATH: {}",
            std::env::var("CONDUIT_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./conduit-config.yaml");
        println!("  4. ~/.conduit/config.yaml");
        println!("  5. /etc/conduit/config.yaml");
        println!();
    }

    if as_yaml {
        let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
        print!("{}", yaml);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    let spec = &config.spec;
    println!("{}", "Event Bus:".bold());
    println!("  Subscriber capacity: {}", spec.event_bus.subscriber_capacity);
    println!();

    println!("{}", "Channels:".bold());
    println!("  Reconnect interval: {:?}", spec.channels.reconnect_interval);
    println!("  Shutdown timeout: {:?}", spec.channels.shutdown_timeout);
    match &spec.channels.rate_limit {
        Some(limit) => println!(
            "  Rate limit: {} sends per {:?}",
            limit.max_sends, limit.window
        ),
        None => println!("  Rate limit: {}", "(none)".dimmed()),
    }
    let mut overrides: Vec<_> = spec.channels.rate_limit_overrides.iter().collect();
    overrides.sort_by(|a, b| a.0.cmp(b.0));
    for (channel_id, limit) in overrides {
        println!(
            "    {} → {} sends per {:?}",
            channel_id, limit.max_sends, limit.window
        );
    }
    println!();

    println!("{}", "Policy:".bold());
    match &spec.policy.path {
        Some(path) => println!("  Source: {}", path.display()),
        None => println!("  Source: {}", "(default: ask for everything)".dimmed()),
    }
    println!();

    println!("{}", "Model Catalog:".bold());
    match &spec.catalog.path {
        Some(path) => println!("  Source: {}", path.display()),
        None => println!("  Source: {}", "(embedded)".dimmed()),
    }
    println!("  Fallback strategy: {:?}", spec.resolver.fallback_strategy);
    println!("  Max fallback hops: {}", spec.resolver.max_fallback_hops);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    // Referenced documents must parse too
    config.spec.policy.load()?;
    config.spec.catalog.load()?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = sample_config(with_examples);

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn sample_config(with_examples: bool) -> &'static str {
    if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    }
}
