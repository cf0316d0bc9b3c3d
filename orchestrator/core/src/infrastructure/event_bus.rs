// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Coordination Events
//
// In-memory fan-out with one bounded tokio mpsc queue per subscriber.
// Each subscription carries an optional kind filter. Publishing never waits:
// a full queue drops the event for that subscriber only.
//
// In-memory only, no replay: a subscriber sees events published after it
// registered.

use futures::Stream;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::domain::events::{Event, EventKind};

pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Unique identifier of a live subscription
pub type SubscriptionId = Uuid;

struct SubscriberEntry {
    filters: HashSet<EventKind>,
    sender: mpsc::Sender<Arc<Event>>,
}

impl SubscriberEntry {
    fn wants(&self, kind: EventKind) -> bool {
        self.filters.is_empty() || self.filters.contains(&kind)
    }
}

struct BusInner {
    subscribers: RwLock<HashMap<SubscriptionId, SubscriberEntry>>,
    capacity: usize,
}

impl BusInner {
    fn remove(&self, id: &SubscriptionId) -> bool {
        // Dropping the entry drops the only sender, which closes the queue
        self.subscribers.write().remove(id).is_some()
    }
}

/// Event bus for publishing and subscribing to coordination events
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a new event bus where each subscriber queue holds `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Register a subscriber for the given kinds. An empty filter receives everything.
    pub fn subscribe(&self, filters: impl IntoIterator<Item = EventKind>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        let id = Uuid::new_v4();
        let filters: HashSet<EventKind> = filters.into_iter().collect();

        debug!(subscription_id = %id, filters = ?filters, "Subscriber registered");

        self.inner
            .subscribers
            .write()
            .insert(id, SubscriberEntry { filters, sender });

        Subscription {
            id,
            receiver,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe to every event kind
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(std::iter::empty())
    }

    /// Deliver an event to every matching subscriber without blocking.
    ///
    /// Returns the number of subscribers the event was enqueued for.
    pub fn publish(&self, event: Event) -> usize {
        let kind = event.kind;
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut dropped = 0;

        {
            let subscribers = self.inner.subscribers.read();
            for (id, entry) in subscribers.iter() {
                if !entry.wants(kind) {
                    continue;
                }
                match entry.sender.try_send(Arc::clone(&event)) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        dropped += 1;
                        debug!(subscription_id = %id, kind = %kind, "Subscriber queue full, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        trace!(subscription_id = %id, "Subscriber receiver gone");
                    }
                }
            }
        }

        metrics::counter!("conduit_events_published_total", "kind" => kind.as_str()).increment(1);
        if dropped > 0 {
            metrics::counter!("conduit_events_dropped_total", "kind" => kind.as_str())
                .increment(dropped);
        }

        if delivered == 0 {
            trace!(kind = %kind, "No subscribers received event");
        }

        delivered
    }

    /// Close a subscription's queue. Unknown or already-closed ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.remove(&id);
        if removed {
            debug!(subscription_id = %id, "Subscriber removed");
        }
        removed
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Subscription is closed")]
    Closed,

    #[error("No events available")]
    Empty,
}

/// Receiving half of a bus registration.
///
/// Dropping it unsubscribes. It is also a [`Stream`] of events.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<Arc<Event>>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next event; `None` once the subscription has been closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<Arc<Event>, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => EventBusError::Empty,
            mpsc::error::TryRecvError::Disconnected => EventBusError::Closed,
        })
    }

    /// Unsubscribe explicitly
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(&self.id);
        }
    }
}

impl Stream for Subscription {
    type Item = Arc<Event>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
