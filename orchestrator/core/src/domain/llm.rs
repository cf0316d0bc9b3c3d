// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Model admission vocabulary: what a model can do, what a caller asks of it,
//! and what the constraints resolver decides.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value objects shared by the catalog and the resolver

use serde::{Deserialize, Serialize};

/// Declared capabilities and pricing of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Maximum context window size in tokens (prompt + output)
    pub context_window: u64,

    pub max_output_tokens: u64,

    #[serde(default)]
    pub supports_vision: bool,

    #[serde(default)]
    pub supports_tools: bool,

    #[serde(default)]
    pub supports_thinking: bool,

    /// USD per input token
    #[serde(default)]
    pub input_price_per_token: f64,

    /// USD per output token
    #[serde(default)]
    pub output_price_per_token: f64,

    /// Model to route to when a request does not fit this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
}

impl ModelCapabilities {
    /// Generic profile used when only the "vision" name heuristic matches
    pub fn generic_vision() -> Self {
        Self {
            context_window: 128_000,
            max_output_tokens: 4_096,
            supports_vision: true,
            supports_tools: true,
            supports_thinking: false,
            input_price_per_token: 0.0,
            output_price_per_token: 0.0,
            fallback_model: None,
        }
    }

    pub fn estimate_cost(&self, prompt_tokens: u64, output_tokens: u64) -> f64 {
        prompt_tokens as f64 * self.input_price_per_token
            + output_tokens as f64 * self.output_price_per_token
    }
}

/// Inference request as seen by admission control
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub model: String,
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    /// Names of the tools offered to the model
    #[serde(default)]
    pub tools: Vec<String>,
    /// Whether the prompt carries image content
    #[serde(default)]
    pub images: bool,
}

impl InferenceRequest {
    pub fn new(model: impl Into<String>, prompt_tokens: u64, output_tokens: u64) -> Self {
        Self {
            model: model.into(),
            prompt_tokens,
            output_tokens,
            tools: Vec::new(),
            images: false,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_images(mut self, images: bool) -> Self {
        self.images = images;
        self
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.output_tokens)
    }
}

/// How the resolver treats a model's `fallback_model` on context overflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStrategy {
    /// Route to the declared fallback if it exists, without re-checking it
    #[default]
    SingleHop,
    /// Follow the fallback chain until a model that fits the budget is found
    VerifyChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionAction {
    Allow,
    Deny,
    Fallback,
    Ask,
}

impl ResolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::Allow => "allow",
            ResolutionAction::Deny => "deny",
            ResolutionAction::Fallback => "fallback",
            ResolutionAction::Ask => "ask",
        }
    }
}

/// Outcome of constraint checking for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub action: ResolutionAction,
    /// Set only when `action` is `Fallback`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_model: Option<String>,
    pub reason: String,
}

impl Resolution {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            action: ResolutionAction::Allow,
            target_model: None,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            action: ResolutionAction::Deny,
            target_model: None,
            reason: reason.into(),
        }
    }

    pub fn fallback(target_model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: ResolutionAction::Fallback,
            target_model: Some(target_model.into()),
            reason: reason.into(),
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self.action, ResolutionAction::Allow | ResolutionAction::Fallback)
    }
}
