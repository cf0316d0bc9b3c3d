// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Channel Manager
//!
//! Owns the registry of external-endpoint adapters and runs one reconnect
//! supervisor task per registered channel. Lifecycle transitions are
//! published to the [`EventBus`]; adapter failures never escape as errors
//! from the supervisor, they become `error-occurred` events.
//!
//! ## Supervisor Loop
//!
//! | Wake source | Channel status | Action |
//! |-------------|----------------|--------|
//! | start | any | `connect` → `connected` status event, or error event |
//! | tick | connected | nothing |
//! | tick | disconnected / error | `connecting` status event, `connect` → status or error event |
//! | shutdown | any | `disconnect` (bounded), exit; nothing is published |
//!
//! The supervisor records the status it drives: `connecting` before every
//! attempt, then `connected` or `error` from the result of `connect`, and
//! `disconnected` once shut down. An adapter reporting a lost connection
//! while recorded as `connected` is treated as dropped and retried on the
//! next tick.
//!
//! Timer and shutdown are merged into one `tokio::select!` so the loop never
//! sleeps through a shutdown request. Shutdown is cooperative: an adapter
//! call already in flight is allowed to finish, and anything it would have
//! published afterwards is suppressed.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::channel::{Channel, ChannelError, ChannelStatus, Message};
use crate::domain::events::Event;
use crate::domain::node_config::ChannelsConfig;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::rate_limit::RateLimitedChannel;

/// Extra time shutdown allows beyond the per-channel disconnect bound
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum ChannelManagerError {
    #[error("Channel '{0}' is already registered")]
    DuplicateChannel(String),

    #[error("Channel manager has been shut down")]
    ShutDown,
}

/// Supervisor view of a channel, corrected when the adapter reports a dropped connection
fn observed_status(recorded: ChannelStatus, adapter: ChannelStatus) -> ChannelStatus {
    match (recorded, adapter) {
        (ChannelStatus::Connected, ChannelStatus::Disconnected | ChannelStatus::Error) => adapter,
        _ => recorded,
    }
}

#[derive(Clone)]
struct RegisteredChannel {
    channel: Arc<dyn Channel>,
    status: Arc<RwLock<ChannelStatus>>,
}

impl RegisteredChannel {
    fn status(&self) -> ChannelStatus {
        observed_status(*self.status.read(), self.channel.status())
    }
}

pub struct ChannelManager {
    channels: RwLock<HashMap<String, RegisteredChannel>>,
    supervisors: Mutex<Vec<(String, JoinHandle<()>)>>,
    bus: EventBus,
    config: ChannelsConfig,
    shutdown_token: CancellationToken,
}

impl ChannelManager {
    pub fn new(bus: EventBus, config: ChannelsConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            supervisors: Mutex::new(Vec::new()),
            bus,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Register a channel and start its supervisor.
    ///
    /// Returns as soon as the supervisor task is spawned; the first connect
    /// attempt happens in the background. Must be called from within a tokio
    /// runtime.
    pub fn register(&self, channel: Arc<dyn Channel>) -> Result<(), ChannelManagerError> {
        let id = channel.id().to_string();

        let channel: Arc<dyn Channel> = match self.config.rate_limit_for(&id) {
            Some(limit) => {
                debug!(
                    channel_id = %id,
                    max_sends = limit.max_sends,
                    window = ?limit.window,
                    "Applying outbound rate limit"
                );
                Arc::new(RateLimitedChannel::from_config(channel, limit))
            }
            None => channel,
        };

        let status = Arc::new(RwLock::new(ChannelStatus::Disconnected));
        {
            let mut channels = self.channels.write();
            if self.shutdown_token.is_cancelled() {
                return Err(ChannelManagerError::ShutDown);
            }
            if channels.contains_key(&id) {
                warn!(channel_id = %id, "Rejected duplicate channel registration");
                return Err(ChannelManagerError::DuplicateChannel(id));
            }
            channels.insert(
                id.clone(),
                RegisteredChannel {
                    channel: Arc::clone(&channel),
                    status: Arc::clone(&status),
                },
            );
        }

        info!(
            channel_id = %id,
            channel_type = %channel.channel_type(),
            "Channel registered"
        );

        let supervisor = ChannelSupervisor {
            channel,
            status,
            bus: self.bus.clone(),
            reconnect_interval: self.config.reconnect_interval,
            disconnect_timeout: self.config.shutdown_timeout,
            shutdown: self.shutdown_token.child_token(),
        };
        let handle = tokio::spawn(supervisor.run());
        self.supervisors.lock().push((id, handle));

        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Channel>> {
        self.channels.read().get(id).map(|entry| Arc::clone(&entry.channel))
    }

    /// All registered channels, ordered by id
    pub fn list(&self) -> Vec<Arc<dyn Channel>> {
        let mut channels: Vec<Arc<dyn Channel>> = self
            .channels
            .read()
            .values()
            .map(|entry| Arc::clone(&entry.channel))
            .collect();
        channels.sort_by(|a, b| a.id().cmp(b.id()));
        channels
    }

    /// Status as recorded by the channel's supervisor
    pub fn status(&self, id: &str) -> Option<ChannelStatus> {
        self.channels.read().get(id).map(RegisteredChannel::status)
    }

    /// Send through a registered channel.
    ///
    /// Failures (unknown id, not connected, rate limited, adapter error) are
    /// published as `error-occurred` events and returned to the caller. After
    /// shutdown every send fails with [`ChannelError::ShutDown`] and nothing
    /// is published.
    pub async fn send(&self, channel_id: &str, message: Message) -> Result<(), ChannelError> {
        if self.shutdown_token.is_cancelled() {
            debug!(channel_id = %channel_id, "Send rejected after shutdown");
            return Err(ChannelError::ShutDown);
        }

        let entry = self.channels.read().get(channel_id).cloned();
        let result = match entry {
            None => Err(ChannelError::NotFound(channel_id.to_string())),
            Some(entry) if entry.status() != ChannelStatus::Connected => {
                Err(ChannelError::NotConnected(channel_id.to_string()))
            }
            Some(entry) => entry.channel.send(message).await,
        };

        if let Err(e) = &result {
            warn!(channel_id = %channel_id, error = %e, "Channel send failed");
            // A send that straddles shutdown stays silent like the supervisors
            if !self.shutdown_token.is_cancelled() {
                self.bus.publish(Event::channel_error(channel_id, e));
            }
        }
        result
    }

    /// Hand an inbound message from an adapter to the bus
    pub fn deliver_inbound(&self, message: &Message) -> usize {
        debug!(
            source = %message.source,
            channel_id = %message.channel_id,
            message_id = %message.id,
            "Inbound channel message"
        );
        self.bus.publish(Event::channel_message(message))
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Stop every supervisor and disconnect every channel.
    ///
    /// Waits at most `shutdown_timeout` (plus a short grace period). A
    /// supervisor stuck inside an adapter call is detached; it disconnects
    /// and exits once that call returns.
    pub async fn shutdown(&self) {
        info!("Shutting down channel manager");
        self.shutdown_token.cancel();

        let supervisors = std::mem::take(&mut *self.supervisors.lock());
        if supervisors.is_empty() {
            return;
        }

        let deadline = Instant::now() + self.config.shutdown_timeout + SHUTDOWN_GRACE;
        let waits = supervisors.into_iter().map(|(id, handle)| async move {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(channel_id = %id, "Channel supervisor ended abnormally: {}", e),
                Err(_) => warn!(
                    channel_id = %id,
                    "Channel supervisor did not stop before the shutdown deadline; detaching"
                ),
            }
        });
        futures::future::join_all(waits).await;

        info!("Channel manager stopped");
    }
}

struct ChannelSupervisor {
    channel: Arc<dyn Channel>,
    status: Arc<RwLock<ChannelStatus>>,
    bus: EventBus,
    reconnect_interval: Duration,
    disconnect_timeout: Duration,
    shutdown: CancellationToken,
}

impl ChannelSupervisor {
    async fn run(self) {
        let channel_id = self.channel.id().to_string();
        if self.shutdown.is_cancelled() {
            return;
        }

        debug!(channel_id = %channel_id, "Channel supervisor started");
        self.attempt_connect(false).await;

        let mut tick = interval_at(
            Instant::now() + self.reconnect_interval,
            self.reconnect_interval,
        );
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(channel_id = %channel_id, "Shutdown signal received");
                    break;
                }
                _ = tick.tick() => {
                    if self.current_status().is_live() {
                        continue;
                    }
                    self.attempt_connect(true).await;
                }
            }
        }

        self.disconnect().await;
        debug!(channel_id = %channel_id, "Channel supervisor stopped");
    }

    fn current_status(&self) -> ChannelStatus {
        observed_status(*self.status.read(), self.channel.status())
    }

    fn set_status(&self, status: ChannelStatus) {
        *self.status.write() = status;
    }

    async fn attempt_connect(&self, announce: bool) {
        let channel_id = self.channel.id();
        self.set_status(ChannelStatus::Connecting);
        if announce {
            info!(channel_id = %channel_id, "Reconnecting channel");
            self.publish(Event::channel_status(channel_id, ChannelStatus::Connecting));
        }

        match self.channel.connect().await {
            Ok(()) => {
                self.set_status(ChannelStatus::Connected);
                info!(channel_id = %channel_id, "Channel connected");
                self.publish(Event::channel_status(channel_id, ChannelStatus::Connected));
            }
            Err(e) => {
                self.set_status(ChannelStatus::Error);
                warn!(channel_id = %channel_id, error = %e, "Channel connect failed");
                metrics::counter!("conduit_channel_connect_failures_total").increment(1);
                self.publish(Event::channel_error(channel_id, &e));
            }
        }
    }

    async fn disconnect(&self) {
        let channel_id = self.channel.id();
        match tokio::time::timeout(self.disconnect_timeout, self.channel.disconnect()).await {
            Ok(Ok(())) => {
                self.set_status(ChannelStatus::Disconnected);
                info!(channel_id = %channel_id, "Channel disconnected");
            }
            Ok(Err(e)) => {
                self.set_status(ChannelStatus::Error);
                warn!(channel_id = %channel_id, error = %e, "Channel disconnect failed");
            }
            Err(_) => {
                self.set_status(ChannelStatus::Error);
                warn!(
                    channel_id = %channel_id,
                    timeout = ?self.disconnect_timeout,
                    "Channel disconnect timed out"
                );
            }
        }
    }

    fn publish(&self, event: Event) {
        // A connect that straddles shutdown must not leak events afterwards
        if self.shutdown.is_cancelled() {
            debug!(kind = %event.kind, "Suppressed event after shutdown");
            return;
        }
        self.bus.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyChannel {
        id: String,
        status: Mutex<ChannelStatus>,
        failures_left: AtomicUsize,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    impl FlakyChannel {
        fn new(id: &str, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                status: Mutex::new(ChannelStatus::Disconnected),
                failures_left: AtomicUsize::new(failures),
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Channel for FlakyChannel {
        fn id(&self) -> &str {
            &self.id
        }

        fn channel_type(&self) -> &str {
            "flaky"
        }

        async fn connect(&self) -> Result<(), ChannelError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_left.store(remaining - 1, Ordering::SeqCst);
                *self.status.lock() = ChannelStatus::Error;
                return Err(ChannelError::Connection("refused".to_string()));
            }
            *self.status.lock() = ChannelStatus::Connected;
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ChannelError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            *self.status.lock() = ChannelStatus::Disconnected;
            Ok(())
        }

        async fn send(&self, _message: Message) -> Result<(), ChannelError> {
            Ok(())
        }

        fn status(&self) -> ChannelStatus {
            *self.status.lock()
        }
    }

    fn config(reconnect_ms: u64) -> ChannelsConfig {
        ChannelsConfig {
            reconnect_interval: Duration::from_millis(reconnect_ms),
            shutdown_timeout: Duration::from_millis(200),
            ..ChannelsConfig::default()
        }
    }

    #[tokio::test]
    async fn test_register_connects_and_publishes_status() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe([EventKind::ChannelStatus]);
        let manager = ChannelManager::new(bus, config(1_000));

        manager.register(FlakyChannel::new("slack", 0)).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.channel_id(), Some("slack"));
        assert_eq!(event.payload["status"], "connected");
        assert_eq!(manager.status("slack"), Some(ChannelStatus::Connected));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let manager = ChannelManager::new(EventBus::new(4), config(1_000));
        let original = FlakyChannel::new("dup", 0);
        manager.register(original.clone()).unwrap();

        let err = manager.register(FlakyChannel::new("dup", 0)).unwrap_err();
        assert!(matches!(err, ChannelManagerError::DuplicateChannel(ref id) if id == "dup"));
        assert_eq!(manager.list().len(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(original.connects.load(Ordering::SeqCst), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnects_after_failure() {
        let bus = EventBus::new(32);
        let mut events = bus.subscribe_all();
        let manager = ChannelManager::new(bus, config(20));
        let channel = FlakyChannel::new("irc", 1);
        manager.register(channel.clone()).unwrap();

        let mut kinds = Vec::new();
        while kinds.len() < 3 {
            let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
                .await
                .unwrap()
                .unwrap();
            kinds.push((event.kind, event.payload.get("status").cloned()));
        }

        assert_eq!(kinds[0].0, EventKind::ErrorOccurred);
        assert_eq!(kinds[1], (EventKind::ChannelStatus, Some("connecting".into())));
        assert_eq!(kinds[2], (EventKind::ChannelStatus, Some("connected".into())));
        assert_eq!(channel.connects.load(Ordering::SeqCst), 2);

        manager.shutdown().await;
        assert_eq!(channel.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_after_shutdown_fails() {
        let manager = ChannelManager::new(EventBus::new(4), config(1_000));
        manager.shutdown().await;
        assert!(matches!(
            manager.register(FlakyChannel::new("late", 0)),
            Err(ChannelManagerError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_send_to_unknown_channel_publishes_error() {
        let bus = EventBus::new(4);
        let mut errors = bus.subscribe([EventKind::ErrorOccurred]);
        let manager = ChannelManager::new(bus, config(1_000));

        let result = manager.send("ghost", Message::new("ghost", "c", "u", "hi")).await;
        assert!(matches!(result, Err(ChannelError::NotFound(_))));

        let event = errors.try_recv().unwrap();
        assert_eq!(event.channel_id(), Some("ghost"));
    }

    /// Reports `Connecting` for as long as it exists and never connects
    struct StuckConnectingChannel {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Channel for StuckConnectingChannel {
        fn id(&self) -> &str {
            "stuck"
        }

        fn channel_type(&self) -> &str {
            "stuck"
        }

        async fn connect(&self) -> Result<(), ChannelError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Err(ChannelError::Connection("handshake rejected".to_string()))
        }

        async fn disconnect(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn send(&self, _message: Message) -> Result<(), ChannelError> {
            Ok(())
        }

        fn status(&self) -> ChannelStatus {
            ChannelStatus::Connecting
        }
    }

    #[tokio::test]
    async fn test_failed_connect_retried_whatever_adapter_reports() {
        let bus = EventBus::new(64);
        let mut errors = bus.subscribe([EventKind::ErrorOccurred]);
        let manager = ChannelManager::new(bus, config(10));
        let channel = Arc::new(StuckConnectingChannel {
            connects: AtomicUsize::new(0),
        });
        manager.register(channel.clone()).unwrap();

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(1), errors.recv())
                .await
                .unwrap()
                .unwrap();
        }
        assert!(channel.connects.load(Ordering::SeqCst) >= 3);
        assert_eq!(manager.status("stuck"), Some(ChannelStatus::Error));

        manager.shutdown().await;
        assert_eq!(manager.status("stuck"), Some(ChannelStatus::Disconnected));
    }

    #[tokio::test]
    async fn test_connection_lost_by_adapter_is_reconnected() {
        let bus = EventBus::new(32);
        let mut statuses = bus.subscribe([EventKind::ChannelStatus]);
        let manager = ChannelManager::new(bus, config(20));
        let channel = FlakyChannel::new("matrix", 0);
        manager.register(channel.clone()).unwrap();

        let connected = tokio::time::timeout(Duration::from_secs(1), statuses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(connected.payload["status"], "connected");

        *channel.status.lock() = ChannelStatus::Disconnected;
        assert_eq!(manager.status("matrix"), Some(ChannelStatus::Disconnected));

        let reconnecting = tokio::time::timeout(Duration::from_secs(1), statuses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reconnecting.payload["status"], "connecting");

        let reconnected = tokio::time::timeout(Duration::from_secs(1), statuses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reconnected.payload["status"], "connected");
        assert_eq!(channel.connects.load(Ordering::SeqCst), 2);

        manager.shutdown().await;
    }

    #[test]
    fn test_observed_status_prefers_recorded_lifecycle() {
        use ChannelStatus::*;
        assert_eq!(observed_status(Error, Connecting), Error);
        assert_eq!(observed_status(Connected, Connecting), Connected);
        assert_eq!(observed_status(Connected, Error), Error);
        assert_eq!(observed_status(Connected, Disconnected), Disconnected);
        assert_eq!(observed_status(Disconnected, Connected), Disconnected);
    }
}
