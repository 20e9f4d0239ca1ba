//! Bindings and the background dispatcher.
//!
//! A [`Binding`] pairs a predicate with a callback. A [`Watcher`] owns a set of
//! bindings and, while running, evaluates each against every event read from
//! its stream.

pub mod binding;
pub mod dispatcher;
pub mod watcher;

pub use binding::{Binding, BindingId, CallbackResult};
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherConfig};
pub use watcher::{Watcher, WatcherBuilder};
