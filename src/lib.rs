//! # wikiwatch - Filtered Watching of Wikipedia Recent Changes
//!
//! wikiwatch reads the Wikimedia recent-changes event stream and calls back
//! into user code whenever an edit matches a filter. Filters are small
//! predicate trees over the fields of each edit event.
//!
//! ## Core Concepts
//!
//! - **Event**: One decoded edit, a JSON object of named fields
//! - **Predicate**: An address-range, exact-string or regex test on a field, or
//!   an ALL/ANY collection of other predicates
//! - **Binding**: A root predicate paired with the callback fired on a match
//! - **Watcher**: Owns bindings and dispatches events to them on a background thread
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wikiwatch::{Predicate, Watcher, WatcherConfig};
//!
//! // Edits by anonymous users in 10.x.x.x, or any user whose name mentions "bot"
//! let filter = Predicate::ipv4("10.*.*.*")? | Predicate::username_regex("(?i)bot")?;
//!
//! let watcher = Watcher::builder()
//!     .config(WatcherConfig::default())
//!     .bind(filter.on_match(|edit| {
//!         println!("{:?} edited {:?}", edit.text("user"), edit.text("title_url"));
//!         Ok(())
//!     }))
//!     .connect_wikimedia()?;
//!
//! watcher.run()?;
//! while watcher.is_running() {
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod format;
pub mod rate;
pub mod source;
pub mod watch;

// Re-export primary types at crate root for convenience
pub use config::{ReconnectPolicy, WatcherConfig, WIKIMEDIA_STREAM_URL};
pub use error::{
    CallbackError, ConstructionError, DecodeError, ExecutionError, StreamError, WatchError,
    WatchResult,
};
pub use event::Event;
pub use filter::{
    AddressFamily, AddressPattern, AddressPredicate, FieldPattern, FieldPredicate, MatchType,
    Predicate, PredicateCollection,
};
pub use format::EventFormat;
pub use rate::{RateCounter, RateReceiver, RateSample};
pub use source::{Connector, EventSource, RawMessage};
pub use watch::{
    Binding, BindingId, CallbackResult, DispatchStats, Dispatcher, DispatcherConfig, Watcher,
    WatcherBuilder,
};
