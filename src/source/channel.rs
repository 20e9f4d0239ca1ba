use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TryRecvError};

use crate::error::StreamError;

use super::{CloseHandle, Connector, EventSource, RawMessage};

type StreamItem = Result<RawMessage, StreamError>;

/// Producer side of an in-process stream.
///
/// Dropping every feed ends the stream cleanly.
#[derive(Debug, Clone)]
pub struct StreamFeed {
    tx: Sender<StreamItem>,
}

impl StreamFeed {
    /// Push a message. Fails with [`StreamError::Closed`] once no source can receive it.
    pub fn send(&self, message: RawMessage) -> Result<(), StreamError> {
        self.tx.send(Ok(message)).map_err(|_| StreamError::Closed)
    }

    /// Push an event payload as a regular message.
    pub fn send_data(&self, data: impl Into<String>) -> Result<(), StreamError> {
        self.send(RawMessage::message(data))
    }

    /// Make the reading side observe a stream failure.
    pub fn fail(&self, error: StreamError) -> Result<(), StreamError> {
        self.tx.send(Err(error)).map_err(|_| StreamError::Closed)
    }
}

/// Create an unbounded in-process stream.
#[must_use]
pub fn channel() -> (StreamFeed, ChannelConnector) {
    let (tx, rx) = unbounded();
    (StreamFeed { tx }, ChannelConnector { rx })
}

/// Create an in-process stream that holds at most `capacity` pending messages.
#[must_use]
pub fn bounded_channel(capacity: usize) -> (StreamFeed, ChannelConnector) {
    let (tx, rx) = bounded(capacity.max(1));
    (StreamFeed { tx }, ChannelConnector { rx })
}

/// Hands out [`ChannelSource`]s reading from the same feed.
///
/// Messages not consumed by one run remain available to the next.
#[derive(Debug, Clone)]
pub struct ChannelConnector {
    rx: Receiver<StreamItem>,
}

impl Connector for ChannelConnector {
    fn connect(&self) -> Result<Box<dyn EventSource>, StreamError> {
        Ok(Box::new(ChannelSource::new(self.rx.clone())))
    }
}

/// An [`EventSource`] backed by a crossbeam channel.
///
/// Reads block on the channel and on a close signal at the same time, so a
/// [`CloseHandle`] can interrupt them.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<StreamItem>,
    close_rx: Receiver<()>,
    close_tx: Arc<Mutex<Option<Sender<()>>>>,
}

impl ChannelSource {
    pub(crate) fn new(rx: Receiver<StreamItem>) -> Self {
        // Nothing is ever sent on the close channel; dropping the sender is the signal.
        let (close_tx, close_rx) = bounded::<()>(0);
        Self {
            rx,
            close_rx,
            close_tx: Arc::new(Mutex::new(Some(close_tx))),
        }
    }

    fn is_closed(&self) -> bool {
        matches!(self.close_rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

impl EventSource for ChannelSource {
    fn next_message(&mut self) -> Result<Option<RawMessage>, StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }

        select! {
            recv(self.rx) -> item => match item {
                Ok(Ok(message)) => Ok(Some(message)),
                Ok(Err(e)) => Err(e),
                Err(_) => Ok(None),
            },
            recv(self.close_rx) -> _ => Err(StreamError::Closed),
        }
    }

    fn close_handle(&self) -> CloseHandle {
        let slot = Arc::clone(&self.close_tx);
        CloseHandle::new(move || {
            if let Ok(mut guard) = slot.lock() {
                guard.take();
            }
        })
    }
}
