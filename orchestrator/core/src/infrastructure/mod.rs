// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod rate_limit;

pub use event_bus::{EventBus, EventBusError, Subscription, SubscriptionId};
pub use rate_limit::{FixedWindowLimiter, RateLimitedChannel};
