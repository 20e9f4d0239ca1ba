//! Error types for wikiwatch.
//!
//! Errors are grouped by where they surface. Construction errors are returned
//! synchronously while building predicates. Stream, decode and callback errors
//! only ever occur on the dispatcher worker, where they are logged and absorbed.

use thiserror::Error;

use crate::watch::BindingId;

/// Errors raised while building a predicate.
///
/// These are always returned to the code that built the predicate and never
/// occur once a watcher is running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstructionError {
    /// Wrong number of dot or colon separated fields.
    #[error("Address pattern '{pattern}' has {actual} fields, expected {expected}")]
    FieldCount {
        /// Offending pattern.
        pattern: String,
        /// Fields required by the family.
        expected: usize,
        /// Fields found.
        actual: usize,
    },

    /// A field is not `*`, a number or a `low-high` range.
    #[error("Invalid field '{field}' in address pattern '{pattern}'")]
    InvalidField {
        /// Offending pattern.
        pattern: String,
        /// Offending field text.
        field: String,
    },

    /// A field value is beyond the family maximum.
    #[error("Field '{field}' in address pattern '{pattern}' exceeds maximum value {max}")]
    OutOfRange {
        /// Offending pattern.
        pattern: String,
        /// Offending field text.
        field: String,
        /// Largest allowed value.
        max: u16,
    },

    /// A range whose low bound exceeds its high bound.
    #[error("Range {low}-{high} in address pattern '{pattern}' has low bound above high bound")]
    InvertedRange {
        /// Offending pattern.
        pattern: String,
        /// Range start.
        low: u16,
        /// Range end.
        high: u16,
    },

    /// Neither four dotted nor eight colon separated fields.
    #[error("'{pattern}' is neither an IPv4 nor an IPv6 address pattern")]
    UnknownAddressFamily {
        /// Offending pattern.
        pattern: String,
    },

    /// The regex failed to compile.
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        /// Offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A field predicate was given an empty field name.
    #[error("Field name cannot be empty")]
    EmptyFieldName,

    /// Malformed output template.
    #[error("Invalid format string '{format}': {reason}")]
    InvalidFormat {
        /// Offending template.
        format: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Failures reported by the streaming collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The stream could not be opened.
    #[error("Failed to connect to event stream: {message}")]
    Connect {
        /// Underlying error message.
        message: String,
    },

    /// An open stream failed mid-read.
    #[error("Failed to read from event stream: {message}")]
    Read {
        /// Underlying error message.
        message: String,
    },

    /// The source was closed by a stop request.
    #[error("Event stream was closed")]
    Closed,

    /// The reconnect policy ran out of attempts.
    #[error("Gave up reconnecting after {attempts} attempts")]
    ReconnectExhausted {
        /// Reconnect attempts made.
        attempts: u32,
    },
}

/// A stream message that could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("Malformed JSON payload: {message}")]
    Json {
        /// Underlying error message.
        message: String,
    },

    /// Valid JSON, but not an object.
    #[error("Expected a JSON object, found {found}")]
    NotAnObject {
        /// JSON type of the payload.
        found: &'static str,
    },
}

/// A failure raised by user callback code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("Callback for {binding} failed: {message}")]
    Failed {
        /// Binding whose callback failed.
        binding: BindingId,
        /// Underlying error message.
        message: String,
    },

    /// The callback panicked.
    #[error("Callback for {binding} panicked: {message}")]
    Panicked {
        /// Binding whose callback failed.
        binding: BindingId,
        /// Underlying error message.
        message: String,
    },
}

/// Lifecycle errors from the watcher itself.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Bindings cannot change while the watcher runs.
    #[error("Watcher is running; stop it before changing bindings")]
    AlreadyRunning,

    /// The OS refused to start the worker thread.
    #[error("Failed to spawn dispatcher worker: {message}")]
    WorkerSpawn {
        /// Underlying error message.
        message: String,
    },

    /// The worker died outside callback isolation.
    #[error("Dispatcher worker panicked outside of a callback")]
    WorkerPanicked,
}

/// Top-level error type for wikiwatch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Building a predicate or format failed.
    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    /// The event stream failed.
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// A message could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A user callback failed.
    #[error("Callback error: {0}")]
    Callback(#[from] CallbackError),

    /// Watcher lifecycle misuse or worker failure.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl WatchError {
    /// Returns true if this is a construction error.
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        matches!(self, Self::Construction(_))
    }

    /// Returns true if this is a stream error.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Construction(_) | Self::Decode(_) | Self::Callback(_) => false,
            Self::Stream(e) => matches!(e, StreamError::Connect { .. } | StreamError::Read { .. }),
            Self::Execution(e) => matches!(e, ExecutionError::WorkerSpawn { .. }),
        }
    }
}

/// Result type alias for wikiwatch operations.
pub type WatchResult<T> = Result<T, WatchError>;
