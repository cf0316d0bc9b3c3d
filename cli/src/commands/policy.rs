// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool policy inspection commands

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;

use conduit_core::application::PolicyEngine;
use conduit_core::domain::node_config::NodeConfigManifest;
use conduit_core::domain::policy::Decision;

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Evaluate a tool name against the configured policy
    Check {
        /// Tool name, e.g. `fs.read_file`
        tool: String,

        /// Tool arguments as a JSON string
        #[arg(long)]
        args: Option<String>,
    },

    /// List the configured rules in evaluation order
    List,
}

pub async fn handle_command(command: PolicyCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let engine = PolicyEngine::new(config.spec.policy.load()?);

    match command {
        PolicyCommand::Check { tool, args } => check(&engine, &tool, args.as_deref()),
        PolicyCommand::List => list(&engine),
    }
}

fn check(engine: &PolicyEngine, tool: &str, args: Option<&str>) -> Result<()> {
    let args: Value = match args {
        Some(raw) => serde_json::from_str(raw).context("--args is not valid JSON")?,
        None => Value::Null,
    };

    let result = engine.evaluate(tool, &args);
    let decision = match result.decision {
        Decision::Allow => "allow".green(),
        Decision::Deny => "deny".red(),
        Decision::Ask => "ask".yellow(),
    };
    println!("{} {}", tool.bold(), decision);
    if !result.reason.is_empty() {
        println!("  {}", result.reason.dimmed());
    }

    Ok(())
}

fn list(engine: &PolicyEngine) -> Result<()> {
    let policy = engine.current();
    if policy.rules.is_empty() {
        println!("{}", "(no rules)".dimmed());
    }
    for (index, rule) in policy.rules.iter().enumerate() {
        println!("  {}. {} → {}", index + 1, rule.tool.bold(), rule.decision);
        if !rule.description.is_empty() {
            println!("     {}", rule.description.dimmed());
        }
    }
    println!("Default: {}", policy.default);
    Ok(())
}
