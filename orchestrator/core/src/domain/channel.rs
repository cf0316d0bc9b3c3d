// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Channel
//!
//! Domain interface for external messaging endpoints (chat platforms, bridges,
//! webhooks). Concrete adapters live outside this crate; the channel manager
//! only ever talks to them through [`Channel`].
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Adapter contract, status value object and message unit

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Connection status of a channel adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ChannelStatus {
    /// Whether the supervisor should leave the channel alone on its next tick
    pub fn is_live(&self) -> bool {
        matches!(self, ChannelStatus::Connected | ChannelStatus::Connecting)
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelStatus::Disconnected => "disconnected",
            ChannelStatus::Connecting => "connecting",
            ChannelStatus::Connected => "connected",
            ChannelStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Unit of channel I/O. Built per send/receive and never retained here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    /// Channel instance that produced or consumes the message
    pub source: String,
    /// External conversation identifier (room, thread, DM)
    pub channel_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        source: impl Into<String>,
        channel_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            source: source.into(),
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Errors raised by channel adapters and the wrappers around them
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Disconnect failed: {0}")]
    Disconnect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Channel '{0}' is not connected")]
    NotConnected(String),

    #[error("Channel '{channel_id}' rate limit exceeded ({max_sends} sends per {window:?})")]
    RateLimited {
        channel_id: String,
        max_sends: u32,
        window: Duration,
    },

    #[error("Channel '{0}' not found")]
    NotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Channel manager has been shut down")]
    ShutDown,
}

/// Adapter contract for one external endpoint connection.
///
/// The supervisor records the lifecycle it drives (`Connecting`, then
/// `Connected` or `Error` from the `connect` result). [`Channel::status`] is
/// consulted only to notice a connection the adapter lost on its own.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable registration id, unique per manager
    fn id(&self) -> &str;

    /// Adapter type tag (e.g. "slack", "discord", "webhook")
    fn channel_type(&self) -> &str;

    async fn connect(&self) -> Result<(), ChannelError>;

    async fn disconnect(&self) -> Result<(), ChannelError>;

    async fn send(&self, message: Message) -> Result<(), ChannelError>;

    fn status(&self) -> ChannelStatus;
}
