// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Authorization Policy
//!
//! A [`Policy`] is an ordered list of [`Rule`]s plus a default [`Decision`].
//! Evaluation walks the rules in order and the first rule whose tool matcher
//! accepts the tool name decides. No match falls through to the default.
//!
//! ## Pattern Matching
//!
//! Each rule's `tool` pattern is checked in this order:
//! - exact string equality
//! - `"*"` matches any tool name
//! - a trailing `*` is a prefix match (`"fs.*"` accepts `"fs.read"`)
//! - anything else is a regular expression anchored to the whole tool name
//!
//! Patterns are compiled when the rule is built, so a malformed regex is
//! rejected at load time rather than during evaluation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to parse policy: {0}")]
    Parse(String),
}

/// Outcome of evaluating a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
    #[default]
    Ask,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny => "deny",
            Decision::Ask => "ask",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
enum ToolMatcher {
    Any,
    Prefix(String),
    Pattern(Regex),
}

impl ToolMatcher {
    fn compile(pattern: &str) -> Result<Self, PolicyError> {
        if pattern == "*" {
            return Ok(ToolMatcher::Any);
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            return Ok(ToolMatcher::Prefix(prefix.to_string()));
        }
        Regex::new(&format!("^(?:{})$", pattern))
            .map(ToolMatcher::Pattern)
            .map_err(|e| PolicyError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    fn matches(&self, tool_name: &str) -> bool {
        match self {
            ToolMatcher::Any => true,
            ToolMatcher::Prefix(prefix) => tool_name.starts_with(prefix.as_str()),
            ToolMatcher::Pattern(re) => re.is_match(tool_name),
        }
    }
}

/// Serialized form of a [`Rule`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleDocument {
    tool: String,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    description: String,
    decision: Decision,
}

/// One ordered entry of a [`Policy`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RuleDocument", into = "RuleDocument")]
pub struct Rule {
    pub tool: String,
    pub scope: String,
    pub description: String,
    pub decision: Decision,
    matcher: ToolMatcher,
}

impl Rule {
    pub fn new(tool: impl Into<String>, decision: Decision) -> Result<Self, PolicyError> {
        let tool = tool.into();
        let matcher = ToolMatcher::compile(&tool)?;
        Ok(Self {
            tool,
            scope: String::new(),
            description: String::new(),
            decision,
            matcher,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn matches(&self, tool_name: &str) -> bool {
        self.tool == tool_name || self.matcher.matches(tool_name)
    }
}

impl TryFrom<RuleDocument> for Rule {
    type Error = PolicyError;

    fn try_from(doc: RuleDocument) -> Result<Self, Self::Error> {
        Ok(Rule::new(doc.tool, doc.decision)?
            .with_scope(doc.scope)
            .with_description(doc.description))
    }
}

impl From<Rule> for RuleDocument {
    fn from(rule: Rule) -> Self {
        Self {
            tool: rule.tool,
            scope: rule.scope,
            description: rule.description,
            decision: rule.decision,
        }
    }
}

/// Result of a policy evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub decision: Decision,
    pub reason: String,
}

pub const DEFAULT_POLICY_REASON: &str = "Default policy";

/// Ordered rule set with a fallback decision.
///
/// `Policy::default()` has no rules and decides `ask` for everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub default: Decision,
}

impl Policy {
    pub fn new(rules: Vec<Rule>, default: Decision) -> Self {
        Self { rules, default }
    }

    /// Parse a policy document (YAML, or JSON since YAML is a superset).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PolicyError> {
        serde_yaml::from_slice(bytes).map_err(|e| PolicyError::Parse(e.to_string()))
    }

    /// First matching rule decides; otherwise the default applies.
    ///
    /// `args` is accepted for parity with the invocation shape; matching is by
    /// tool name only.
    pub fn evaluate(&self, tool_name: &str, _args: &Value) -> PolicyResult {
        match self.rules.iter().find(|rule| rule.matches(tool_name)) {
            Some(rule) => PolicyResult {
                decision: rule.decision,
                reason: rule.description.clone(),
            },
            None => PolicyResult {
                decision: self.default,
                reason: DEFAULT_POLICY_REASON.to_string(),
            },
        }
    }
}
