// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Value objects and rules with no runtime dependencies: events, the channel
//! adapter contract, tool policies, model capabilities and node configuration.

pub mod channel;
pub mod events;
pub mod llm;
pub mod model_catalog;
pub mod node_config;
pub mod policy;
