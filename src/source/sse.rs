use std::io::BufRead;
use std::time::Duration;

use crate::error::StreamError;

use super::{RawMessage, MESSAGE_KIND};

/// Splits a byte stream into server-sent-event messages.
///
/// Follows the `text/event-stream` framing: `field: value` lines, `:` comments,
/// multi-line `data` joined with `\n`, and a blank line dispatching the message.
/// A partial message at end of input is discarded.
#[derive(Debug)]
pub struct SseReader<R> {
    inner: R,
    line: String,
    kind: Option<String>,
    data: String,
    last_id: Option<String>,
    retry: Option<Duration>,
    done: bool,
}

impl<R: BufRead> SseReader<R> {
    /// Frame messages read from `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
            kind: None,
            data: String::new(),
            last_id: None,
            retry: None,
            done: false,
        }
    }

    /// Reconnection delay most recently requested by the server.
    #[must_use]
    pub const fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Id of the most recent message, for resuming a stream.
    #[must_use]
    pub fn last_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    fn take_message(&mut self) -> Option<RawMessage> {
        let kind = self.kind.take();
        if self.data.is_empty() {
            return None;
        }
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        Some(RawMessage {
            kind: kind.unwrap_or_else(|| MESSAGE_KIND.to_string()),
            data,
            id: self.last_id.clone(),
        })
    }

    fn apply_field(&mut self, line: &str) {
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.kind = Some(value.to_string()),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => self.last_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
    }
}

impl<R: BufRead> Iterator for SseReader<R> {
    type Item = Result<RawMessage, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.inner.read_line(&mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    let line = std::mem::take(&mut self.line);
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if trimmed.is_empty() {
                        if let Some(message) = self.take_message() {
                            self.line = line;
                            return Some(Ok(message));
                        }
                    } else if !trimmed.starts_with(':') {
                        self.apply_field(trimmed);
                    }
                    self.line = line;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(StreamError::Read {
                        message: e.to_string(),
                    }));
                }
            }
        }
        None
    }
}
