// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Event Envelope
//!
//! Every state change the coordination core observes is described by one
//! [`Event`]: a write-once record carrying an [`EventKind`], optional session
//! and surface routing hints, an opaque JSON payload, a UTC timestamp and the
//! envelope schema version.
//!
//! Events are built by whichever component detects the change and are handed
//! to the bus by value. From that point on they are shared as `Arc<Event>` so
//! no subscriber can mutate what another subscriber sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::channel::{ChannelStatus, Message};

/// Current envelope schema version.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    SessionMessage,
    SessionTyping,
    ToolRequest,
    ToolExecuting,
    ToolComplete,
    ApprovalNeeded,
    ApprovalResolved,
    Trace,
    ErrorOccurred,
    ChannelStatus,
    ChannelMessage,
    ModelResolution,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionMessage => "session-message",
            EventKind::SessionTyping => "session-typing",
            EventKind::ToolRequest => "tool-request",
            EventKind::ToolExecuting => "tool-executing",
            EventKind::ToolComplete => "tool-complete",
            EventKind::ApprovalNeeded => "approval-needed",
            EventKind::ApprovalResolved => "approval-resolved",
            EventKind::Trace => "trace",
            EventKind::ErrorOccurred => "error-occurred",
            EventKind::ChannelStatus => "channel-status",
            EventKind::ChannelMessage => "channel-message",
            EventKind::ModelResolution => "model-resolution",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable, versioned record of a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Originating surface (e.g. "tui", "web", a channel type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub version: u32,
}

impl Event {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            session_id: None,
            surface: None,
            payload,
            timestamp: Utc::now(),
            version: EVENT_SCHEMA_VERSION,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_surface(mut self, surface: impl Into<String>) -> Self {
        self.surface = Some(surface.into());
        self
    }

    /// `channel-status` event for a channel transition.
    pub fn channel_status(channel_id: &str, status: ChannelStatus) -> Self {
        Self::new(
            EventKind::ChannelStatus,
            json!({
                "channel_id": channel_id,
                "status": status,
            }),
        )
    }

    /// `error-occurred` event raised on behalf of a channel.
    pub fn channel_error(channel_id: &str, error: impl std::fmt::Display) -> Self {
        Self::new(
            EventKind::ErrorOccurred,
            json!({
                "channel_id": channel_id,
                "error": error.to_string(),
            }),
        )
    }

    /// `channel-message` event for an inbound message an adapter received.
    pub fn channel_message(message: &Message) -> Self {
        let payload = serde_json::to_value(message).unwrap_or(Value::Null);
        Self::new(EventKind::ChannelMessage, payload).with_surface(message.source.clone())
    }

    /// `channel_id` field of the payload, if present.
    ///
    /// For `channel-status` and `error-occurred` this is the registration id
    /// of the channel. A `channel-message` payload is the serialized
    /// [`Message`], so here it is the external conversation id; the
    /// registration id of the adapter is in `surface` (and `payload.source`).
    pub fn channel_id(&self) -> Option<&str> {
        self.payload.get("channel_id").and_then(Value::as_str)
    }

    /// Serialize as a single JSON line (no trailing newline) for line-delimited
    /// transports.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
