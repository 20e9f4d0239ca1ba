//! Streaming collaborator contract.
//!
//! The dispatcher only needs "give me the next message or tell me the stream
//! failed", plus a way to unblock a pending read from another thread when the
//! watcher is stopped. [`EventSource`] and [`CloseHandle`] capture exactly that.
//! Transport concerns (HTTP, SSE framing, reconnecting) live behind the trait.

use std::fmt;
use std::sync::Arc;

use crate::error::StreamError;

/// In-process channel source.
pub mod channel;
/// HTTP connector for the live recent-changes stream.
#[cfg(feature = "http")]
pub mod http;
/// Reconnect policy wrapper.
pub mod reconnect;
/// Server-sent-events framing.
pub mod sse;

pub use channel::{bounded_channel, channel, ChannelConnector, ChannelSource, StreamFeed};
#[cfg(feature = "http")]
pub use http::HttpConnector;
pub use reconnect::ReconnectingConnector;
pub use sse::SseReader;

/// Kind of message carrying edit events.
pub const MESSAGE_KIND: &str = "message";

/// One undecoded message from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message kind; only [`MESSAGE_KIND`] carries events.
    pub kind: String,
    /// Payload, JSON for event messages.
    pub data: String,
    /// Last event id, if the stream sent one.
    pub id: Option<String>,
}

impl RawMessage {
    /// A regular event message.
    #[must_use]
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            kind: MESSAGE_KIND.to_string(),
            data: data.into(),
            id: None,
        }
    }

    /// Returns true if this message carries an event payload.
    #[must_use]
    pub fn is_event(&self) -> bool {
        self.kind == MESSAGE_KIND
    }
}

/// Unblocks a pending [`EventSource::next_message`] from another thread.
///
/// Closing is idempotent. After a close, reads fail with [`StreamError::Closed`].
#[derive(Clone)]
pub struct CloseHandle(Arc<dyn Fn() + Send + Sync>);

impl CloseHandle {
    /// Wrap the action that aborts the source's pending read.
    pub fn new(close: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(close))
    }

    /// A handle for sources whose reads never block indefinitely.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Run the close action.
    pub fn close(&self) {
        (self.0)();
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CloseHandle")
    }
}

/// An open stream of messages.
pub trait EventSource: Send {
    /// Block until the next message arrives.
    ///
    /// `Ok(None)` is a clean end of stream.
    fn next_message(&mut self) -> Result<Option<RawMessage>, StreamError>;

    /// Handle that aborts a pending or future `next_message` call.
    fn close_handle(&self) -> CloseHandle;
}

impl EventSource for Box<dyn EventSource> {
    fn next_message(&mut self) -> Result<Option<RawMessage>, StreamError> {
        (**self).next_message()
    }

    fn close_handle(&self) -> CloseHandle {
        (**self).close_handle()
    }
}

/// Opens event sources; called once per watcher run.
pub trait Connector: Send + Sync {
    /// Open a fresh source. Errors are connection failures.
    fn connect(&self) -> Result<Box<dyn EventSource>, StreamError>;
}

impl<F> Connector for F
where
    F: Fn() -> Result<Box<dyn EventSource>, StreamError> + Send + Sync,
{
    fn connect(&self) -> Result<Box<dyn EventSource>, StreamError> {
        self()
    }
}
