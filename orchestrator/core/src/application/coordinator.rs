// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Coordinator
//!
//! Single long-lived owner of the event bus, channel manager, policy engine
//! and constraints resolver. The bus and channel manager know nothing about
//! policy or admission; the coordinator is where a tool-call authorization or
//! an inference admission turns into published events.
//!
//! One coordinator per process. Nothing here is global.

use anyhow::Context;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::application::channel_manager::ChannelManager;
use crate::application::constraints::ConstraintsResolver;
use crate::application::policy::PolicyEngine;
use crate::domain::events::{Event, EventKind};
use crate::domain::llm::{InferenceRequest, Resolution};
use crate::domain::node_config::NodeConfigManifest;
use crate::domain::policy::{Decision, PolicyResult};
use crate::infrastructure::event_bus::EventBus;

pub struct Coordinator {
    bus: EventBus,
    channels: Arc<ChannelManager>,
    policy: Arc<PolicyEngine>,
    resolver: Arc<ConstraintsResolver>,
}

impl Coordinator {
    pub fn new(
        bus: EventBus,
        channels: Arc<ChannelManager>,
        policy: Arc<PolicyEngine>,
        resolver: Arc<ConstraintsResolver>,
    ) -> Self {
        Self {
            bus,
            channels,
            policy,
            resolver,
        }
    }

    /// Build every component from a validated node configuration.
    ///
    /// Policy and catalog sources are read here; a malformed document fails
    /// startup.
    pub fn from_config(config: &NodeConfigManifest) -> anyhow::Result<Self> {
        config.validate().context("Invalid node configuration")?;
        let spec = &config.spec;

        let policy = spec.policy.load().context("Failed to load policy")?;
        let catalog = spec.catalog.load().context("Failed to load model catalog")?;

        info!(
            node = %config.metadata.name,
            policy_rules = policy.rules.len(),
            catalog_models = catalog.model_ids().len(),
            catalog_patterns = catalog.pattern_count(),
            fallback_strategy = ?spec.resolver.fallback_strategy,
            "Coordinator configured"
        );

        let bus = EventBus::new(spec.event_bus.subscriber_capacity);
        let channels = Arc::new(ChannelManager::new(bus.clone(), spec.channels.clone()));

        Ok(Self::new(
            bus,
            channels,
            Arc::new(PolicyEngine::new(policy)),
            Arc::new(ConstraintsResolver::from_config(catalog, &spec.resolver)),
        ))
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn resolver(&self) -> &Arc<ConstraintsResolver> {
        &self.resolver
    }

    /// Evaluate a tool call and announce it.
    ///
    /// Publishes `tool-request` with the decision, and additionally
    /// `approval-needed` when a human has to decide.
    pub fn authorize_tool_call(&self, session_id: &str, tool: &str, args: &Value) -> PolicyResult {
        let result = self.policy.evaluate(tool, args);

        self.bus.publish(
            Event::new(
                EventKind::ToolRequest,
                json!({
                    "tool": tool,
                    "args": args,
                    "decision": result.decision,
                    "reason": result.reason,
                }),
            )
            .with_session(session_id),
        );

        if result.decision == Decision::Ask {
            self.bus.publish(
                Event::new(
                    EventKind::ApprovalNeeded,
                    json!({
                        "tool": tool,
                        "args": args,
                        "reason": result.reason,
                    }),
                )
                .with_session(session_id),
            );
        }

        result
    }

    /// Run admission control and publish the outcome as `model-resolution`
    pub fn admit_inference(&self, session_id: &str, request: &InferenceRequest) -> Resolution {
        let resolution = self.resolver.resolve(request);
        let estimated_cost = self.resolver.estimate_cost(request, &resolution);

        self.bus.publish(
            Event::new(
                EventKind::ModelResolution,
                json!({
                    "model": request.model,
                    "prompt_tokens": request.prompt_tokens,
                    "output_tokens": request.output_tokens,
                    "action": resolution.action,
                    "target_model": resolution.target_model,
                    "reason": resolution.reason,
                    "estimated_cost_usd": estimated_cost,
                }),
            )
            .with_session(session_id),
        );

        resolution
    }

    pub async fn shutdown(&self) {
        info!("Coordinator shutting down");
        self.channels.shutdown().await;
    }
}
