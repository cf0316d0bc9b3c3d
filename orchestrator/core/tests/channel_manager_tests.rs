// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Channel manager behaviour driven through the public API with scripted
//! adapters: registration, reconnect supervision, rate-limited sends and
//! shutdown.

use async_trait::async_trait;
use conduit_core::application::{ChannelManager, ChannelManagerError};
use conduit_core::domain::channel::{Channel, ChannelError, ChannelStatus, Message};
use conduit_core::domain::events::{Event, EventKind};
use conduit_core::domain::node_config::{ChannelsConfig, RateLimitConfig};
use conduit_core::infrastructure::event_bus::{EventBus, EventBusError, Subscription};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// Adapter whose connect outcome and latency are scripted per test
struct ScriptedChannel {
    id: String,
    kind: String,
    status: Mutex<ChannelStatus>,
    connect_ok: AtomicBool,
    connect_delay: Duration,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    sent: Mutex<Vec<Message>>,
}

impl ScriptedChannel {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: "scripted".to_string(),
            status: Mutex::new(ChannelStatus::Disconnected),
            connect_ok: AtomicBool::new(true),
            connect_delay: Duration::ZERO,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    fn of_type(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    fn failing(self) -> Self {
        self.connect_ok.store(false, Ordering::SeqCst);
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_type(&self) -> &str {
        &self.kind
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            sleep(self.connect_delay).await;
        }
        if self.connect_ok.load(Ordering::SeqCst) {
            *self.status.lock() = ChannelStatus::Connected;
            Ok(())
        } else {
            *self.status.lock() = ChannelStatus::Error;
            Err(ChannelError::Connection("endpoint unreachable".to_string()))
        }
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.status.lock() = ChannelStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<(), ChannelError> {
        self.sent.lock().push(message);
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        *self.status.lock()
    }
}

fn channels_config(reconnect: Duration) -> ChannelsConfig {
    ChannelsConfig {
        reconnect_interval: reconnect,
        shutdown_timeout: Duration::from_millis(100),
        ..ChannelsConfig::default()
    }
}

async fn next_event(subscription: &mut Subscription) -> Arc<Event> {
    timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("timed out waiting for event")
        .expect("subscription closed")
}

fn drain(subscription: &mut Subscription) -> Vec<Arc<Event>> {
    let mut events = Vec::new();
    while let Ok(event) = subscription.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_duplicate_registration_keeps_original() {
    let bus = EventBus::new(32);
    let manager = ChannelManager::new(bus, channels_config(Duration::from_secs(60)));

    manager
        .register(Arc::new(ScriptedChannel::new("ops").of_type("first")))
        .unwrap();
    let err = manager
        .register(Arc::new(ScriptedChannel::new("ops").of_type("second")))
        .unwrap_err();

    assert!(matches!(err, ChannelManagerError::DuplicateChannel(id) if id == "ops"));
    assert_eq!(manager.get("ops").unwrap().channel_type(), "first");
    assert_eq!(manager.list().len(), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_failing_channel_retries_on_every_tick() {
    let bus = EventBus::new(64);
    let mut errors = bus.subscribe([EventKind::ErrorOccurred]);
    let manager = ChannelManager::new(bus, channels_config(Duration::from_millis(20)));
    let channel = Arc::new(ScriptedChannel::new("pager").failing());
    manager.register(channel.clone()).unwrap();

    for _ in 0..3 {
        let event = next_event(&mut errors).await;
        assert_eq!(event.channel_id(), Some("pager"));
        assert!(event.payload["error"]
            .as_str()
            .unwrap()
            .contains("endpoint unreachable"));
    }
    assert!(channel.connects.load(Ordering::SeqCst) >= 3);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_no_events_after_shutdown() {
    let bus = EventBus::new(256);
    let mut events = bus.subscribe([EventKind::ChannelStatus, EventKind::ErrorOccurred]);
    let manager = ChannelManager::new(bus, channels_config(Duration::from_millis(10)));
    let channel = Arc::new(ScriptedChannel::new("flaky").failing());
    manager.register(channel.clone()).unwrap();

    next_event(&mut events).await;
    manager.shutdown().await;
    drain(&mut events);

    // Several reconnect intervals pass with nothing published
    sleep(Duration::from_millis(60)).await;
    assert_eq!(events.try_recv(), Err(EventBusError::Empty));
    assert_eq!(channel.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_does_not_wait_for_stuck_connect() {
    let bus = EventBus::new(32);
    let mut events = bus.subscribe([EventKind::ChannelStatus]);
    let manager = ChannelManager::new(bus, channels_config(Duration::from_secs(60)));
    let channel = Arc::new(ScriptedChannel::new("slow").slow(Duration::from_millis(800)));
    manager.register(channel.clone()).unwrap();

    // Let the supervisor enter connect()
    sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    manager.shutdown().await;
    assert!(started.elapsed() < Duration::from_millis(700));

    // The in-flight connect finishes later; its success is not announced,
    // and the detached supervisor still disconnects
    sleep(Duration::from_millis(1_000)).await;
    assert_eq!(events.try_recv(), Err(EventBusError::Empty));
    assert_eq!(channel.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_configured_rate_limit_applies_to_sends() {
    let bus = EventBus::new(32);
    let mut statuses = bus.subscribe([EventKind::ChannelStatus]);
    let mut errors = bus.subscribe([EventKind::ErrorOccurred]);
    let config = ChannelsConfig {
        rate_limit: Some(RateLimitConfig {
            max_sends: 2,
            window: Duration::from_millis(100),
        }),
        ..channels_config(Duration::from_secs(60))
    };
    let manager = ChannelManager::new(bus, config);
    let channel = Arc::new(ScriptedChannel::new("chat"));
    manager.register(channel.clone()).unwrap();
    next_event(&mut statuses).await;

    let message = || Message::new("chat", "general", "conduit", "status update");
    manager.send("chat", message()).await.unwrap();
    manager.send("chat", message()).await.unwrap();
    let err = manager.send("chat", message()).await.unwrap_err();
    assert!(matches!(err, ChannelError::RateLimited { max_sends: 2, .. }));

    let event = errors.try_recv().unwrap();
    assert_eq!(event.channel_id(), Some("chat"));

    sleep(Duration::from_millis(150)).await;
    manager.send("chat", message()).await.unwrap();
    assert_eq!(channel.sent.lock().len(), 3);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_override_limit_only_for_named_channel() {
    let mut config = channels_config(Duration::from_secs(60));
    config.rate_limit_overrides.insert(
        "strict".to_string(),
        RateLimitConfig {
            max_sends: 1,
            window: Duration::from_secs(60),
        },
    );
    let bus = EventBus::new(32);
    let mut statuses = bus.subscribe([EventKind::ChannelStatus]);
    let manager = ChannelManager::new(bus, config);
    manager.register(Arc::new(ScriptedChannel::new("strict"))).unwrap();
    manager.register(Arc::new(ScriptedChannel::new("relaxed"))).unwrap();
    next_event(&mut statuses).await;
    next_event(&mut statuses).await;

    let message = || Message::new("test", "room", "bot", "hi");
    manager.send("strict", message()).await.unwrap();
    assert!(manager.send("strict", message()).await.is_err());
    for _ in 0..5 {
        manager.send("relaxed", message()).await.unwrap();
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn test_send_requires_connected_channel() {
    let bus = EventBus::new(32);
    let mut errors = bus.subscribe([EventKind::ErrorOccurred]);
    let manager = ChannelManager::new(bus, channels_config(Duration::from_secs(60)));
    manager
        .register(Arc::new(ScriptedChannel::new("down").failing()))
        .unwrap();
    next_event(&mut errors).await;

    let result = manager
        .send("down", Message::new("test", "room", "bot", "hi"))
        .await;
    assert!(matches!(result, Err(ChannelError::NotConnected(_))));
    assert_eq!(next_event(&mut errors).await.channel_id(), Some("down"));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_list_and_status() {
    let bus = EventBus::new(32);
    let mut statuses = bus.subscribe([EventKind::ChannelStatus]);
    let manager = ChannelManager::new(bus, channels_config(Duration::from_secs(60)));
    manager.register(Arc::new(ScriptedChannel::new("zulip"))).unwrap();
    manager.register(Arc::new(ScriptedChannel::new("email"))).unwrap();
    next_event(&mut statuses).await;
    next_event(&mut statuses).await;

    let ids: Vec<String> = manager.list().iter().map(|c| c.id().to_string()).collect();
    assert_eq!(ids, vec!["email", "zulip"]);
    assert_eq!(manager.status("email"), Some(ChannelStatus::Connected));
    assert_eq!(manager.status("missing"), None);

    manager.shutdown().await;
    assert_eq!(manager.status("email"), Some(ChannelStatus::Disconnected));
}

#[tokio::test]
async fn test_inbound_message_reaches_subscribers() {
    let bus = EventBus::new(8);
    let mut inbound = bus.subscribe([EventKind::ChannelMessage]);
    let manager = ChannelManager::new(bus, channels_config(Duration::from_secs(60)));

    let message = Message::new("slack", "C024BE91L", "U12345", "deploy please");
    assert_eq!(manager.deliver_inbound(&message), 1);

    let event = inbound.try_recv().unwrap();
    assert_eq!(event.surface.as_deref(), Some("slack"));
    assert_eq!(event.payload["content"], "deploy please");
    assert_eq!(event.payload["channel_id"], "C024BE91L");
}

#[tokio::test]
async fn test_send_after_shutdown_is_silent() {
    let bus = EventBus::new(32);
    let mut events = bus.subscribe_all();
    let manager = ChannelManager::new(bus, channels_config(Duration::from_secs(60)));
    let channel = Arc::new(ScriptedChannel::new("ops"));
    manager.register(channel.clone()).unwrap();
    next_event(&mut events).await;

    manager.shutdown().await;
    drain(&mut events);

    let result = manager
        .send("ops", Message::new("ops", "incidents", "conduit", "still there?"))
        .await;
    assert!(matches!(result, Err(ChannelError::ShutDown)));
    assert_eq!(events.try_recv(), Err(EventBusError::Empty));
    assert!(channel.sent.lock().is_empty());

    // Unknown ids are rejected the same way once shut down
    let result = manager
        .send("ghost", Message::new("ghost", "room", "conduit", "hello"))
        .await;
    assert!(matches!(result, Err(ChannelError::ShutDown)));
    assert_eq!(events.try_recv(), Err(EventBusError::Empty));
}
