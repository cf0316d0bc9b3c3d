// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Model Capability Catalog
//!
//! Static lookup of model identifier → [`ModelCapabilities`].
//!
//! ## Lookup Order
//!
//! | Step | Source | Notes |
//! |------|--------|-------|
//! | 1 | exact identifier | `models:` map |
//! | 2 | regex patterns | `patterns:` list, first match in document order |
//! | 3 | name heuristic | identifier contains `vision` → generic vision profile |
//! | 4 | unknown | `None` |
//!
//! The catalog is built once from a YAML/JSON document (or the embedded
//! default) and never mutated afterwards; replacing it means building a new
//! one.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::llm::ModelCapabilities;

/// Embedded default catalog shipped with the binary
pub const DEFAULT_CATALOG_YAML: &str = include_str!("../../assets/model_catalog.yaml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid model pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to parse model catalog: {0}")]
    Parse(String),
}

/// How a catalog entry was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchSource {
    Exact,
    Pattern(String),
    Heuristic,
}

#[derive(Debug, Deserialize)]
struct PatternDocument {
    pattern: String,
    capabilities: ModelCapabilities,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    models: HashMap<String, ModelCapabilities>,
    #[serde(default)]
    patterns: Vec<PatternDocument>,
}

#[derive(Debug, Clone)]
struct PatternEntry {
    source: String,
    regex: Regex,
    capabilities: ModelCapabilities,
}

#[derive(Debug, Clone)]
pub struct ModelCatalog {
    exact: HashMap<String, ModelCapabilities>,
    patterns: Vec<PatternEntry>,
    vision_heuristic: ModelCapabilities,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self {
            exact: HashMap::new(),
            patterns: Vec::new(),
            vision_heuristic: ModelCapabilities::generic_vision(),
        }
    }

    /// Parse the embedded default catalog
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_bytes(DEFAULT_CATALOG_YAML.as_bytes())
    }

    /// Parse a catalog document (YAML or JSON)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CatalogError> {
        let doc: CatalogDocument =
            serde_yaml::from_slice(bytes).map_err(|e| CatalogError::Parse(e.to_string()))?;

        let mut catalog = Self::empty();
        catalog.exact = doc.models;
        for entry in doc.patterns {
            catalog = catalog.with_pattern(&entry.pattern, entry.capabilities)?;
        }
        Ok(catalog)
    }

    pub fn with_model(mut self, model: impl Into<String>, capabilities: ModelCapabilities) -> Self {
        self.exact.insert(model.into(), capabilities);
        self
    }

    pub fn with_pattern(
        mut self,
        pattern: &str,
        capabilities: ModelCapabilities,
    ) -> Result<Self, CatalogError> {
        let regex = Regex::new(pattern).map_err(|e| CatalogError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.patterns.push(PatternEntry {
            source: pattern.to_string(),
            regex,
            capabilities,
        });
        Ok(self)
    }

    /// Resolve a model identifier, reporting which lookup step matched
    pub fn lookup(&self, model: &str) -> Option<(&ModelCapabilities, MatchSource)> {
        if let Some(caps) = self.exact.get(model) {
            return Some((caps, MatchSource::Exact));
        }

        if let Some(entry) = self.patterns.iter().find(|p| p.regex.is_match(model)) {
            return Some((&entry.capabilities, MatchSource::Pattern(entry.source.clone())));
        }

        if model.to_lowercase().contains("vision") {
            return Some((&self.vision_heuristic, MatchSource::Heuristic));
        }

        None
    }

    pub fn get(&self, model: &str) -> Option<&ModelCapabilities> {
        self.lookup(model).map(|(caps, _)| caps)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.lookup(model).is_some()
    }

    pub fn estimate_cost(&self, model: &str, prompt_tokens: u64, output_tokens: u64) -> Option<f64> {
        self.get(model)
            .map(|caps| caps.estimate_cost(prompt_tokens, output_tokens))
    }

    /// Identifiers of the exact entries, sorted
    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.exact.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}
