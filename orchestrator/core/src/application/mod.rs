// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod channel_manager;
pub mod constraints;
pub mod coordinator;
pub mod policy;

pub use channel_manager::{ChannelManager, ChannelManagerError};
pub use constraints::ConstraintsResolver;
pub use coordinator::Coordinator;
pub use policy::PolicyEngine;
