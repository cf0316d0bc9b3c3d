// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Model admission inspection commands

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use conduit_core::application::ConstraintsResolver;
use conduit_core::domain::llm::{InferenceRequest, ResolutionAction};
use conduit_core::domain::node_config::NodeConfigManifest;

#[derive(Subcommand)]
pub enum ModelCommand {
    /// Decide whether a request would be admitted
    Resolve {
        model: String,

        #[arg(long, default_value_t = 0)]
        prompt_tokens: u64,

        #[arg(long, default_value_t = 0)]
        output_tokens: u64,

        /// Tool names offered to the model (repeatable)
        #[arg(long = "tool", value_name = "NAME")]
        tools: Vec<String>,

        /// Request carries image content
        #[arg(long)]
        images: bool,
    },

    /// List models with exact catalog entries
    List,
}

pub async fn handle_command(command: ModelCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    let resolver =
        ConstraintsResolver::from_config(config.spec.catalog.load()?, &config.spec.resolver);

    match command {
        ModelCommand::Resolve {
            model,
            prompt_tokens,
            output_tokens,
            tools,
            images,
        } => {
            let request = InferenceRequest::new(model, prompt_tokens, output_tokens)
                .with_tools(tools)
                .with_images(images);
            resolve(&resolver, &request);
            Ok(())
        }
        ModelCommand::List => {
            list(&resolver);
            Ok(())
        }
    }
}

fn resolve(resolver: &ConstraintsResolver, request: &InferenceRequest) {
    let resolution = resolver.resolve(request);
    let action = match resolution.action {
        ResolutionAction::Allow => "allow".green(),
        ResolutionAction::Fallback => "fallback".cyan(),
        ResolutionAction::Deny => "deny".red(),
        ResolutionAction::Ask => "ask".yellow(),
    };

    match &resolution.target_model {
        Some(target) => println!("{} {} → {}", request.model.bold(), action, target.bold()),
        None => println!("{} {}", request.model.bold(), action),
    }
    println!("  {}", resolution.reason.dimmed());

    if let Some(cost) = resolver.estimate_cost(request, &resolution) {
        println!("  Estimated cost: ${:.6}", cost);
    }
}

fn list(resolver: &ConstraintsResolver) {
    let catalog = resolver.catalog();
    for id in catalog.model_ids() {
        if let Some(caps) = catalog.get(&id) {
            let fallback = caps
                .fallback_model
                .as_deref()
                .map(|f| format!(" → {}", f))
                .unwrap_or_default();
            println!(
                "  {} ({} ctx, tools: {}, vision: {}){}",
                id.bold(),
                caps.context_window,
                caps.supports_tools,
                caps.supports_vision,
                fallback
            );
        }
    }
    println!("  {} pattern entries", catalog.pattern_count());
}
