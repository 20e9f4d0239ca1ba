//! Watcher configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Public Wikimedia recent-changes event stream.
pub const WIKIMEDIA_STREAM_URL: &str = "https://stream.wikimedia.org/v2/stream/recentchange";

/// How a dropped stream is re-established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Reconnect attempts after a failure before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnect attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling backoff.
    pub max_backoff_ms: u64,
}

impl ReconnectPolicy {
    /// Never reconnect: the first failure ends the stream.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Returns true if another attempt is allowed after `failures` consecutive failures.
    #[must_use]
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures <= max)
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

/// Configuration for a [`Watcher`](crate::Watcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Event-stream endpoint.
    pub stream_url: String,
    /// `User-Agent` header sent with stream requests.
    pub user_agent: String,
    /// Reconnect behavior of the stream.
    pub reconnect: ReconnectPolicy,
    /// Name of the dispatcher worker thread.
    pub thread_name: String,
    /// Limit for establishing the TCP/TLS connection to the stream.
    pub connect_timeout_ms: u64,
    /// Longest wait for response headers or for the next chunk of an open
    /// stream. An idle stream past this limit counts as a read failure.
    /// `0` waits forever.
    pub idle_timeout_ms: u64,
    /// Drop log events (namespace `-1`) before any callback sees them.
    pub skip_log_events: bool,
}

impl WatcherConfig {
    /// [`connect_timeout_ms`](Self::connect_timeout_ms) as a duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// [`idle_timeout_ms`](Self::idle_timeout_ms) as a duration.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            stream_url: WIKIMEDIA_STREAM_URL.to_string(),
            user_agent: format!("wikiwatch/{}", env!("CARGO_PKG_VERSION")),
            reconnect: ReconnectPolicy::default(),
            thread_name: "wikiwatch-dispatch".to_string(),
            connect_timeout_ms: 10_000,
            idle_timeout_ms: 60_000,
            skip_log_events: true,
        }
    }
}
