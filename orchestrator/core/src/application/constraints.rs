// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Constraints Resolver
//!
//! Admission control for inference requests. Given a requested model and a
//! token budget, decides whether the request may proceed as-is, must be
//! rerouted to a fallback model, or must be rejected.
//!
//! ## Decision Order
//!
//! 1. Model not in catalog → `allow` (constraints skipped)
//! 2. Prompt + output tokens exceed the context window → `fallback` or `deny`
//! 3. Tools requested, model has no tool support → `deny`
//! 4. Images attached, model has no vision support → `deny`
//! 5. Otherwise `allow`
//!
//! Context-window overflow is checked before feature support, so an
//! oversized request is rerouted even when the original model also lacks a
//! requested feature.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::llm::{FallbackStrategy, InferenceRequest, ModelCapabilities, Resolution};
use crate::domain::model_catalog::ModelCatalog;
use crate::domain::node_config::ResolverConfig;

pub struct ConstraintsResolver {
    catalog: RwLock<Arc<ModelCatalog>>,
    strategy: FallbackStrategy,
    max_fallback_hops: usize,
}

impl ConstraintsResolver {
    /// Resolver with single-hop fallback
    pub fn new(catalog: ModelCatalog) -> Self {
        Self::from_config(catalog, &ResolverConfig::default())
    }

    pub fn from_config(catalog: ModelCatalog, config: &ResolverConfig) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
            strategy: config.fallback_strategy,
            max_fallback_hops: config.max_fallback_hops,
        }
    }

    pub fn strategy(&self) -> FallbackStrategy {
        self.strategy
    }

    pub fn catalog(&self) -> Arc<ModelCatalog> {
        Arc::clone(&self.catalog.read())
    }

    pub fn replace_catalog(&self, catalog: ModelCatalog) {
        let models = catalog.model_ids().len();
        let patterns = catalog.pattern_count();
        *self.catalog.write() = Arc::new(catalog);
        info!(models, patterns, "Model catalog replaced");
    }

    pub fn resolve(&self, request: &InferenceRequest) -> Resolution {
        let catalog = self.catalog();
        let resolution = Self::decide(&catalog, request, self.strategy, self.max_fallback_hops);

        debug!(
            model = %request.model,
            prompt_tokens = request.prompt_tokens,
            output_tokens = request.output_tokens,
            action = ?resolution.action,
            target_model = ?resolution.target_model,
            reason = %resolution.reason,
            "Inference request resolved"
        );
        metrics::counter!("conduit_resolutions_total", "action" => resolution.action.as_str())
            .increment(1);

        resolution
    }

    /// Estimated USD cost of the request on the model it would actually run on
    pub fn estimate_cost(&self, request: &InferenceRequest, resolution: &Resolution) -> Option<f64> {
        let model = resolution.target_model.as_deref().unwrap_or(&request.model);
        self.catalog()
            .estimate_cost(model, request.prompt_tokens, request.output_tokens)
    }

    fn decide(
        catalog: &ModelCatalog,
        request: &InferenceRequest,
        strategy: FallbackStrategy,
        max_hops: usize,
    ) -> Resolution {
        let Some((caps, source)) = catalog.lookup(&request.model) else {
            warn!(model = %request.model, "Model not in catalog, skipping constraint checks");
            return Resolution::allow(format!(
                "Model '{}' is not in the catalog; constraints skipped",
                request.model
            ));
        };
        debug!(model = %request.model, source = ?source, "Catalog entry found");

        let total = request.total_tokens();
        if total > caps.context_window {
            return match strategy {
                FallbackStrategy::SingleHop => single_hop(catalog, request, caps, total),
                FallbackStrategy::VerifyChain => verify_chain(catalog, request, caps, total, max_hops),
            };
        }

        if !request.tools.is_empty() && !caps.supports_tools {
            return Resolution::deny(format!(
                "Model '{}' does not support tool use",
                request.model
            ));
        }

        if request.images && !caps.supports_vision {
            return Resolution::deny(format!(
                "Model '{}' does not support image input",
                request.model
            ));
        }

        Resolution::allow(format!(
            "Request fits model '{}' ({} of {} tokens)",
            request.model, total, caps.context_window
        ))
    }
}

fn overflow_reason(model: &str, total: u64, context_window: u64) -> String {
    format!(
        "Request needs {} tokens but model '{}' has a {} token context window",
        total, model, context_window
    )
}

fn single_hop(
    catalog: &ModelCatalog,
    request: &InferenceRequest,
    caps: &ModelCapabilities,
    total: u64,
) -> Resolution {
    let reason = overflow_reason(&request.model, total, caps.context_window);
    match caps.fallback_model.as_deref() {
        Some(target) if catalog.contains(target) => {
            Resolution::fallback(target, format!("{}; falling back to '{}'", reason, target))
        }
        Some(target) => Resolution::deny(format!(
            "{}; fallback '{}' is not in the catalog",
            reason, target
        )),
        None => Resolution::deny(format!("{}; no fallback configured", reason)),
    }
}

fn verify_chain(
    catalog: &ModelCatalog,
    request: &InferenceRequest,
    caps: &ModelCapabilities,
    total: u64,
    max_hops: usize,
) -> Resolution {
    let reason = overflow_reason(&request.model, total, caps.context_window);
    let mut visited: HashSet<&str> = HashSet::from([request.model.as_str()]);
    let mut current = caps;

    for _ in 0..max_hops {
        let Some(target) = current.fallback_model.as_deref() else {
            break;
        };
        if !visited.insert(target) {
            return Resolution::deny(format!("{}; fallback chain loops at '{}'", reason, target));
        }
        let Some(next) = catalog.get(target) else {
            return Resolution::deny(format!(
                "{}; fallback '{}' is not in the catalog",
                reason, target
            ));
        };
        if total <= next.context_window {
            return Resolution::fallback(target, format!("{}; falling back to '{}'", reason, target));
        }
        current = next;
    }

    Resolution::deny(format!("{}; no fallback within {} hops fits", reason, max_hops))
}
