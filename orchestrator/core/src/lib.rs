// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conduit Core
//!
//! Coordination core for an agent runtime: an in-process event bus, a channel
//! manager that keeps external endpoints connected, a tool-call policy engine
//! and a model constraints resolver, owned together by a [`Coordinator`].
//!
//! # Architecture
//!
//! - **Domain:** events, channels, policy, model catalog, node configuration
//! - **Application:** channel manager, policy engine, constraints resolver, coordinator
//! - **Infrastructure:** event bus, outbound rate limiting

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::Coordinator;
pub use domain::*;
