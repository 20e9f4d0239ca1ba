use std::io::BufReader;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use tracing::debug;

use crate::config::WatcherConfig;
use crate::error::StreamError;

use super::channel::{bounded_channel, StreamFeed};
use super::sse::SseReader;
use super::{Connector, EventSource};

/// Messages buffered between the reader thread and the dispatcher.
const PUMP_CAPACITY: usize = 1024;

/// Opens the recent-changes stream over HTTP.
///
/// `connect` returns at once. The request itself, and every read after it,
/// happens on a detached thread that frames server-sent events into a
/// channel, so closing the source never waits for the network. Request and
/// status failures reach the reading side as [`StreamError::Connect`].
///
/// The reader thread notices that nobody is listening on its next message or
/// when the idle timeout expires, whichever comes first, and then drops the
/// connection.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
    url: String,
}

impl HttpConnector {
    /// Connector for `url` with the default timeouts of [`WatcherConfig`].
    pub fn new(url: impl Into<String>, user_agent: &str) -> Result<Self, StreamError> {
        let defaults = WatcherConfig::default();
        Self::build(
            url.into(),
            user_agent,
            defaults.connect_timeout(),
            defaults.idle_timeout(),
        )
    }

    /// Connector for the stream, user agent and timeouts of `cfg`.
    pub fn from_config(cfg: &WatcherConfig) -> Result<Self, StreamError> {
        Self::build(
            cfg.stream_url.clone(),
            &cfg.user_agent,
            cfg.connect_timeout(),
            cfg.idle_timeout(),
        )
    }

    fn build(
        url: String,
        user_agent: &str,
        connect_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StreamError> {
        // The blocking client applies `timeout` to the header wait and to each
        // body read separately, which makes it an idle limit for the stream.
        let idle = (!idle_timeout.is_zero()).then_some(idle_timeout);
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .timeout(idle)
            .build()
            .map_err(|e| StreamError::Connect {
                message: e.to_string(),
            })?;
        Ok(Self { client, url })
    }
}

fn open(client: &Client, url: &str) -> Result<Response, StreamError> {
    client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .and_then(Response::error_for_status)
        .map_err(|e| StreamError::Connect {
            message: e.to_string(),
        })
}

fn pump(client: &Client, url: &str, feed: &StreamFeed) {
    let response = match open(client, url) {
        Ok(response) => response,
        Err(e) => {
            let _ = feed.fail(e);
            return;
        }
    };
    debug!(%url, status = %response.status(), "event stream opened");

    for item in SseReader::new(BufReader::new(response)) {
        let sent = match item {
            Ok(message) => feed.send(message),
            Err(e) => feed.fail(e),
        };
        if sent.is_err() {
            break;
        }
    }
}

impl Connector for HttpConnector {
    fn connect(&self) -> Result<Box<dyn EventSource>, StreamError> {
        let (feed, connector) = bounded_channel(PUMP_CAPACITY);
        let client = self.client.clone();
        let url = self.url.clone();
        thread::Builder::new()
            .name("wikiwatch-sse".to_string())
            .spawn(move || {
                pump(&client, &url, &feed);
                debug!(%url, "event stream reader exited");
            })
            .map_err(|e| StreamError::Connect {
                message: format!("failed to spawn stream reader: {e}"),
            })?;

        connector.connect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Instant;

    use crossbeam_channel::{bounded, unbounded, Receiver};

    use super::*;
    use crate::config::ReconnectPolicy;
    use crate::event::Event;
    use crate::watch::Watcher;

    fn local_config(listener: &TcpListener, idle_timeout_ms: u64) -> WatcherConfig {
        WatcherConfig {
            stream_url: format!("http://{}/", listener.local_addr().unwrap()),
            reconnect: ReconnectPolicy::disabled(),
            idle_timeout_ms,
            ..WatcherConfig::default()
        }
    }

    fn read_request(stream: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
    }

    /// Accepts connections and never answers them.
    fn silent_server(listener: TcpListener) {
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => held.push(stream),
                    Err(_) => return,
                }
            }
        });
    }

    /// Sends one event, then goes quiet and reports whether the client hung up.
    fn one_event_server(listener: TcpListener) -> Receiver<bool> {
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_request(&mut stream);
            stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      content-type: text/event-stream\r\n\
                      connection: close\r\n\r\n\
                      data: {\"user\":\"10.0.0.1\"}\n\n",
                )
                .unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let mut buf = [0u8; 64];
            let released = match stream.read(&mut buf) {
                Ok(0) => true,
                Ok(_) => false,
                Err(e) => !matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ),
            };
            let _ = tx.send(released);
        });
        rx
    }

    #[test]
    fn test_stop_returns_while_server_withholds_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let cfg = local_config(&listener, 60_000);
        silent_server(listener);

        let watcher = Watcher::builder().config(cfg).connect_wikimedia().unwrap();
        watcher.run().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(watcher.is_running());

        let (done_tx, done_rx) = bounded(1);
        let started = Instant::now();
        thread::spawn(move || {
            let stopped = watcher.stop();
            let _ = done_tx.send(stopped.is_ok());
        });
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_refused_connection_surfaces_on_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);

        let connector = HttpConnector::new(url, "wikiwatch-test").unwrap();
        let mut source = connector.connect().unwrap();
        let err = source.next_message().unwrap_err();
        assert!(matches!(err, StreamError::Connect { .. }), "{err:?}");
    }

    #[test]
    fn test_reader_releases_connection_after_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let cfg = local_config(&listener, 300);
        let released = one_event_server(listener);

        let (tx, rx) = unbounded();
        let watcher = Watcher::builder()
            .config(cfg)
            .on_edit(move |e: &Event| {
                tx.send(e.text("user").unwrap_or_default().into_owned())?;
                Ok(())
            })
            .connect_wikimedia()
            .unwrap();

        watcher.run().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "10.0.0.1");
        watcher.stop().unwrap();

        assert_eq!(released.recv_timeout(Duration::from_secs(10)), Ok(true));
    }
}
