use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::ReconnectPolicy;
use crate::error::StreamError;

use super::{CloseHandle, Connector, EventSource, RawMessage};

/// Wraps a connector so its sources reconnect according to a [`ReconnectPolicy`].
///
/// Connection failures, read failures and unexpected end of stream all count
/// as failures. A successfully read message resets the failure count.
pub struct ReconnectingConnector {
    inner: Arc<dyn Connector>,
    policy: ReconnectPolicy,
}

impl ReconnectingConnector {
    /// Reconnect sources of `inner` according to `policy`.
    pub fn new(inner: impl Connector + 'static, policy: ReconnectPolicy) -> Self {
        Self::from_arc(Arc::new(inner), policy)
    }

    /// Like [`new`](Self::new) for an already shared connector.
    #[must_use]
    pub fn from_arc(inner: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        Self { inner, policy }
    }
}

impl Connector for ReconnectingConnector {
    fn connect(&self) -> Result<Box<dyn EventSource>, StreamError> {
        Ok(Box::new(ReconnectingSource::new(
            Arc::clone(&self.inner),
            self.policy.clone(),
        )))
    }
}

struct Shared {
    closed: AtomicBool,
    current: Mutex<Option<CloseHandle>>,
    // Dropped on close to wake a backoff sleep.
    wake_tx: Mutex<Option<Sender<()>>>,
}

impl Shared {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut wake) = self.wake_tx.lock() {
            wake.take();
        }
        if let Ok(current) = self.current.lock() {
            if let Some(handle) = current.as_ref() {
                handle.close();
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn arm(&self, handle: CloseHandle) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(handle.clone());
        }
        if self.is_closed() {
            handle.close();
        }
    }
}

enum Failure {
    Ended,
    Error(StreamError),
}

struct ReconnectingSource {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    current: Option<Box<dyn EventSource>>,
    failures: u32,
    shared: Arc<Shared>,
    wake_rx: Receiver<()>,
}

impl ReconnectingSource {
    fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (wake_tx, wake_rx) = bounded::<()>(0);
        Self {
            connector,
            policy,
            current: None,
            failures: 0,
            shared: Arc::new(Shared {
                closed: AtomicBool::new(false),
                current: Mutex::new(None),
                wake_tx: Mutex::new(Some(wake_tx)),
            }),
            wake_rx,
        }
    }

    /// Record a failure; returns the outcome to report if no further attempt is allowed.
    fn fail(&mut self, failure: Failure) -> Option<Result<Option<RawMessage>, StreamError>> {
        self.current = None;
        self.failures = self.failures.saturating_add(1);

        if self.policy.allows(self.failures) {
            return None;
        }
        if self.failures == 1 {
            return Some(match failure {
                Failure::Ended => Ok(None),
                Failure::Error(e) => Err(e),
            });
        }
        Some(Err(StreamError::ReconnectExhausted {
            attempts: self.failures - 1,
        }))
    }
}

impl EventSource for ReconnectingSource {
    fn next_message(&mut self) -> Result<Option<RawMessage>, StreamError> {
        loop {
            if self.shared.is_closed() {
                return Err(StreamError::Closed);
            }

            if self.current.is_none() {
                if self.failures > 0 {
                    let delay = self.policy.backoff(self.failures);
                    debug!(attempt = self.failures, ?delay, "waiting before reconnect");
                    // Returns early with Disconnected when the source is closed.
                    let _ = self.wake_rx.recv_timeout(delay);
                    if self.shared.is_closed() {
                        return Err(StreamError::Closed);
                    }
                }

                match self.connector.connect() {
                    Ok(source) => {
                        if self.failures > 0 {
                            info!(attempt = self.failures, "event stream reconnected");
                        }
                        self.shared.arm(source.close_handle());
                        self.current = Some(source);
                    }
                    Err(e) => {
                        warn!(error = %e, "event stream connect failed");
                        if let Some(outcome) = self.fail(Failure::Error(e)) {
                            return outcome;
                        }
                    }
                }
                continue;
            }

            let Some(source) = self.current.as_mut() else {
                continue;
            };
            match source.next_message() {
                Ok(Some(message)) => {
                    self.failures = 0;
                    return Ok(Some(message));
                }
                Ok(None) => {
                    info!("event stream ended");
                    if let Some(outcome) = self.fail(Failure::Ended) {
                        return outcome;
                    }
                }
                Err(StreamError::Closed) if self.shared.is_closed() => {
                    return Err(StreamError::Closed);
                }
                Err(e) => {
                    warn!(error = %e, "event stream read failed");
                    if let Some(outcome) = self.fail(Failure::Error(e)) {
                        return outcome;
                    }
                }
            }
        }
    }

    fn close_handle(&self) -> CloseHandle {
        let shared = Arc::clone(&self.shared);
        CloseHandle::new(move || shared.close())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::source::channel;

    fn quick(max_attempts: Option<u32>) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_disabled_policy_passes_end_of_stream_through() {
        let (feed, connector) = channel();
        feed.send_data("a").unwrap();
        drop(feed);

        let mut source = ReconnectingConnector::new(connector, ReconnectPolicy::disabled())
            .connect()
            .unwrap();
        assert_eq!(source.next_message().unwrap().unwrap().data, "a");
        assert_eq!(source.next_message().unwrap(), None);
    }

    #[test]
    fn test_reconnects_after_read_error() {
        let (feed, connector) = channel();
        feed.send_data("a").unwrap();
        feed.fail(StreamError::Read {
            message: "reset".to_string(),
        })
        .unwrap();
        feed.send_data("b").unwrap();

        let mut source = ReconnectingConnector::new(connector, quick(Some(3)))
            .connect()
            .unwrap();
        assert_eq!(source.next_message().unwrap().unwrap().data, "a");
        assert_eq!(source.next_message().unwrap().unwrap().data, "b");
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let connects = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&connects);
        let failing = move || -> Result<Box<dyn EventSource>, StreamError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StreamError::Connect {
                message: "refused".to_string(),
            })
        };

        let mut source = ReconnectingConnector::new(failing, quick(Some(2)))
            .connect()
            .unwrap();
        assert_eq!(
            source.next_message(),
            Err(StreamError::ReconnectExhausted { attempts: 2 })
        );
        assert_eq!(connects.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_close_interrupts_backoff() {
        let failing = || -> Result<Box<dyn EventSource>, StreamError> {
            Err(StreamError::Connect {
                message: "refused".to_string(),
            })
        };
        let policy = ReconnectPolicy {
            max_attempts: None,
            initial_backoff_ms: 60_000,
            max_backoff_ms: 60_000,
        };
        let mut source = ReconnectingConnector::new(failing, policy).connect().unwrap();
        let handle = source.close_handle();

        let started = Instant::now();
        let reader = thread::spawn(move || source.next_message());
        thread::sleep(Duration::from_millis(20));
        handle.close();

        assert_eq!(reader.join().unwrap(), Err(StreamError::Closed));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
