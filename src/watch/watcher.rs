use std::sync::Arc;

use crate::config::WatcherConfig;
use crate::error::WatchResult;
use crate::event::Event;
use crate::filter::Predicate;
use crate::source::{Connector, ReconnectingConnector};

use super::binding::{Binding, BindingId, CallbackResult, Handler};
use super::dispatcher::{DispatchStats, Dispatcher, DispatcherConfig, Handlers};

/// Watches a recent-changes stream and calls back on matching edits.
///
/// ```rust,ignore
/// use wikiwatch::{Predicate, Watcher, WatcherConfig};
///
/// let watcher = Watcher::builder()
///     .bind(Predicate::ipv4("10.*.*.*")?.on_match(|edit| {
///         println!("{:?} edited {:?}", edit.text("user"), edit.text("title_url"));
///         Ok(())
///     }))
///     .connect_wikimedia()?;
/// watcher.run()?;
/// ```
#[derive(Debug)]
pub struct Watcher {
    dispatcher: Dispatcher,
}

impl Watcher {
    /// Start building a watcher with the default configuration.
    #[must_use]
    pub fn builder() -> WatcherBuilder {
        WatcherBuilder::default()
    }

    /// A watcher with no bindings reading from `connector`.
    pub fn new(connector: impl Connector + 'static, config: WatcherConfig) -> Self {
        Self::builder().config(config).connect(connector)
    }

    /// Register a binding. Fails with an execution error while running.
    pub fn add_binding(&self, binding: Binding) -> WatchResult<BindingId> {
        self.dispatcher.add_binding(binding)
    }

    /// Bind `callback` to `predicate`.
    pub fn add_filter<F>(&self, predicate: Predicate, callback: F) -> WatchResult<BindingId>
    where
        F: FnMut(&Event) -> CallbackResult + Send + 'static,
    {
        self.dispatcher.add_binding(predicate.on_match(callback))
    }

    /// Set the callback invoked for every decoded event, before any binding.
    pub fn on_edit<F>(&self, callback: F) -> WatchResult<BindingId>
    where
        F: FnMut(&Event) -> CallbackResult + Send + 'static,
    {
        self.dispatcher.set_on_edit(callback)
    }

    /// Start processing the stream on a background thread.
    pub fn run(&self) -> WatchResult<()> {
        self.dispatcher.run()
    }

    /// Stop processing and wait for the background thread.
    pub fn stop(&self) -> WatchResult<()> {
        self.dispatcher.stop()
    }

    /// Whether the background thread is processing the stream. Turns false
    /// on its own when the stream ends or fails for good.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Counters accumulated over every run of this watcher.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }
}

/// Builder for [`Watcher`].
#[derive(Debug, Default)]
pub struct WatcherBuilder {
    config: WatcherConfig,
    handlers: Handlers,
}

impl WatcherBuilder {
    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a binding; bindings run in the order they are added.
    #[must_use]
    pub fn bind(mut self, binding: Binding) -> Self {
        self.handlers.bindings.push(binding);
        self
    }

    /// Bind `callback` to `predicate`.
    #[must_use]
    pub fn filter<F>(self, predicate: Predicate, callback: F) -> Self
    where
        F: FnMut(&Event) -> CallbackResult + Send + 'static,
    {
        self.bind(predicate.on_match(callback))
    }

    /// Set the callback invoked for every event, before any binding.
    #[must_use]
    pub fn on_edit<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Event) -> CallbackResult + Send + 'static,
    {
        self.handlers.on_edit = Some(Handler::new(callback));
        self
    }

    /// Finish with `connector` as the stream, wrapped in the configured reconnect policy.
    pub fn connect(self, connector: impl Connector + 'static) -> Watcher {
        let reconnecting =
            ReconnectingConnector::from_arc(Arc::new(connector), self.config.reconnect.clone());
        let cfg = DispatcherConfig {
            thread_name: self.config.thread_name.clone(),
            skip_log_events: self.config.skip_log_events,
        };
        Watcher {
            dispatcher: Dispatcher::with_handlers(Arc::new(reconnecting), cfg, self.handlers),
        }
    }

    /// Finish with the configured HTTP event stream.
    #[cfg(feature = "http")]
    pub fn connect_wikimedia(self) -> WatchResult<Watcher> {
        let connector = crate::source::HttpConnector::from_config(&self.config)?;
        Ok(self.connect(connector))
    }
}
