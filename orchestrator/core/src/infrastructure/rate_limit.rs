// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Outbound Rate Limiting
//!
//! [`RateLimitedChannel`] wraps any [`Channel`] and caps `send` at
//! `max_sends` per fixed window. The window opens on the first send after the
//! previous window expired; once `max_sends` sends have been admitted, every
//! further send in that window fails immediately with
//! [`ChannelError::RateLimited`]. Nothing is queued or delayed.
//!
//! The wrapped adapter is unaware it is limited; every other trait method is
//! delegated unchanged.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::channel::{Channel, ChannelError, ChannelStatus, Message};
use crate::domain::node_config::RateLimitConfig;

#[derive(Debug)]
struct WindowState {
    opened_at: Option<Instant>,
    count: u32,
}

/// Fixed-window admission counter
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_sends: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl FixedWindowLimiter {
    pub fn new(max_sends: u32, window: Duration) -> Self {
        Self {
            max_sends,
            window,
            state: Mutex::new(WindowState {
                opened_at: None,
                count: 0,
            }),
        }
    }

    /// Admit one send if the current window has room
    pub fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = match state.opened_at {
            Some(opened_at) => now.duration_since(opened_at) >= self.window,
            None => true,
        };
        if expired {
            state.opened_at = Some(now);
            state.count = 0;
        }

        if state.count >= self.max_sends {
            return false;
        }
        state.count += 1;
        true
    }

    pub fn max_sends(&self) -> u32 {
        self.max_sends
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl From<RateLimitConfig> for FixedWindowLimiter {
    fn from(config: RateLimitConfig) -> Self {
        Self::new(config.max_sends, config.window)
    }
}

/// Channel decorator enforcing a fixed-window send limit
pub struct RateLimitedChannel {
    inner: Arc<dyn Channel>,
    limiter: FixedWindowLimiter,
}

impl RateLimitedChannel {
    pub fn new(inner: Arc<dyn Channel>, max_sends: u32, window: Duration) -> Self {
        Self {
            inner,
            limiter: FixedWindowLimiter::new(max_sends, window),
        }
    }

    pub fn from_config(inner: Arc<dyn Channel>, config: RateLimitConfig) -> Self {
        Self {
            inner,
            limiter: config.into(),
        }
    }
}

#[async_trait]
impl Channel for RateLimitedChannel {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn channel_type(&self) -> &str {
        self.inner.channel_type()
    }

    async fn connect(&self) -> Result<(), ChannelError> {
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<(), ChannelError> {
        self.inner.disconnect().await
    }

    async fn send(&self, message: Message) -> Result<(), ChannelError> {
        if !self.limiter.try_acquire() {
            debug!(channel_id = %self.inner.id(), "Send rejected by rate limiter");
            metrics::counter!("conduit_channel_sends_rate_limited_total").increment(1);
            return Err(ChannelError::RateLimited {
                channel_id: self.inner.id().to_string(),
                max_sends: self.limiter.max_sends(),
                window: self.limiter.window(),
            });
        }
        self.inner.send(message).await
    }

    fn status(&self) -> ChannelStatus {
        self.inner.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl Channel for CountingChannel {
        fn id(&self) -> &str {
            "counting"
        }

        fn channel_type(&self) -> &str {
            "test"
        }

        async fn connect(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn send(&self, _message: Message) -> Result<(), ChannelError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn status(&self) -> ChannelStatus {
            ChannelStatus::Connected
        }
    }

    fn message() -> Message {
        Message::new("counting", "room", "bot", "hi")
    }

    #[tokio::test]
    async fn test_nth_plus_one_send_fails_then_window_resets() {
        let inner = Arc::new(CountingChannel { sent: AtomicUsize::new(0) });
        let limited = RateLimitedChannel::new(inner.clone(), 2, Duration::from_millis(100));

        assert!(limited.send(message()).await.is_ok());
        assert!(limited.send(message()).await.is_ok());
        assert!(matches!(
            limited.send(message()).await,
            Err(ChannelError::RateLimited { max_sends: 2, .. })
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limited.send(message()).await.is_ok());

        // The rejected send never reached the adapter
        assert_eq!(inner.sent.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_delegates_identity_and_status() {
        let inner = Arc::new(CountingChannel { sent: AtomicUsize::new(0) });
        let limited = RateLimitedChannel::from_config(
            inner,
            RateLimitConfig { max_sends: 1, window: Duration::from_secs(1) },
        );
        assert_eq!(limited.id(), "counting");
        assert_eq!(limited.channel_type(), "test");
        assert_eq!(limited.status(), ChannelStatus::Connected);
        assert!(limited.connect().await.is_ok());
    }

    #[test]
    fn test_limiter_counts_within_window() {
        let limiter = FixedWindowLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
