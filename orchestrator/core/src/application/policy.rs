// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Engine
//!
//! Holds the active [`Policy`] as an immutable snapshot and answers tool-call
//! authorization queries against it. Replacing the policy swaps the whole
//! snapshot: an `evaluate` running concurrently sees either the old rule set
//! or the new one, never a mix.

use anyhow::Context;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::policy::{Policy, PolicyError, PolicyResult};

pub struct PolicyEngine {
    current: RwLock<Arc<Policy>>,
}

impl PolicyEngine {
    pub fn new(policy: Policy) -> Self {
        Self {
            current: RwLock::new(Arc::new(policy)),
        }
    }

    /// Snapshot of the active policy
    pub fn current(&self) -> Arc<Policy> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, policy: Policy) {
        let rules = policy.rules.len();
        let default = policy.default;
        *self.current.write() = Arc::new(policy);
        info!(rules, default = %default, "Policy replaced");
    }

    /// Parse and install a policy document. The active policy is untouched on error.
    pub fn load_from_bytes(&self, bytes: &[u8]) -> Result<(), PolicyError> {
        let policy = Policy::from_bytes(bytes)?;
        self.replace(policy);
        Ok(())
    }

    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read policy file {:?}", path))?;
        self.load_from_bytes(&bytes)
            .with_context(|| format!("Invalid policy file {:?}", path))
    }

    pub fn evaluate(&self, tool_name: &str, args: &Value) -> PolicyResult {
        let policy = self.current();
        let result = policy.evaluate(tool_name, args);

        debug!(
            tool = %tool_name,
            decision = ?result.decision,
            reason = %result.reason,
            "Policy evaluated"
        );
        metrics::counter!("conduit_policy_decisions_total", "decision" => result.decision.as_str())
            .increment(1);

        result
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(Policy::default())
    }
}
