//! Dispatcher worker.
//!
//! This module owns the predicate bindings and the background loop that reads
//! the event stream, evaluates every binding against each event and invokes
//! matching callbacks. Events are processed one at a time, in arrival order,
//! entirely on the worker thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutionError, WatchResult};
use crate::event::{fields, Event};
use crate::source::{CloseHandle, Connector, RawMessage};

use super::binding::{Binding, BindingId, CallbackResult, Handler};

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Name given to the worker thread.
    pub thread_name: String,
    /// Skip log events instead of dispatching them.
    pub skip_log_events: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_name: "wikiwatch-dispatch".to_string(),
            skip_log_events: true,
        }
    }
}

/// Counters accumulated across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events decoded and offered to the callbacks.
    pub events: u64,
    /// Binding callbacks invoked because their predicate matched.
    pub matches: u64,
    /// Messages dropped without reaching a callback: non-event kinds,
    /// undecodable payloads and skipped log events.
    pub skipped_messages: u64,
    /// Callbacks that returned an error or panicked.
    pub callback_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    matches: AtomicU64,
    skipped_messages: AtomicU64,
    callback_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            events: self.events.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            skipped_messages: self.skipped_messages.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
        }
    }
}

/// Everything the worker needs to process an event. Moves onto the worker
/// for the duration of a run and comes back when it is joined.
#[derive(Debug, Default)]
pub(crate) struct Handlers {
    pub(crate) on_edit: Option<Handler>,
    pub(crate) bindings: Vec<Binding>,
}

impl Handlers {
    fn dispatch(&mut self, message: &RawMessage, cfg: &DispatcherConfig, counters: &Counters) {
        if !message.is_event() {
            debug!(kind = %message.kind, "skipping non-event message");
            Counters::bump(&counters.skipped_messages);
            return;
        }

        let event = match Event::from_json(&message.data) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "skipping undecodable message");
                Counters::bump(&counters.skipped_messages);
                return;
            }
        };
        if cfg.skip_log_events && event.is_log_event() {
            debug!(title = ?event.text(fields::TITLE), "skipping log event");
            Counters::bump(&counters.skipped_messages);
            return;
        }
        Counters::bump(&counters.events);

        if let Some(handler) = self.on_edit.as_mut() {
            if let Err(e) = handler.call(&event) {
                warn!(binding = %handler.id(), error = %e, "edit callback failed");
                Counters::bump(&counters.callback_failures);
            }
        }

        for binding in &mut self.bindings {
            match binding.dispatch(&event) {
                Ok(true) => Counters::bump(&counters.matches),
                Ok(false) => {}
                Err(e) => {
                    warn!(binding = %binding.id(), error = %e, "match callback failed");
                    Counters::bump(&counters.callback_failures);
                }
            }
        }
    }
}

/// Stop request shared between the caller and one worker run.
#[derive(Debug, Default)]
struct StopSignal {
    requested: AtomicBool,
    closer: Mutex<Option<CloseHandle>>,
}

impl StopSignal {
    fn request(&self) {
        self.requested.store(true, Ordering::Release);
        let closer = self.closer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = closer.as_ref() {
            handle.close();
        }
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Register the open source; closes it right away if a stop already arrived.
    fn arm(&self, handle: CloseHandle) {
        *self.closer.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
        if self.is_requested() {
            handle.close();
        }
    }
}

/// Clears the running flag however the worker exits.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
struct Worker {
    join: JoinHandle<Handlers>,
    signal: Arc<StopSignal>,
}

/// Either the handlers are parked here, or a worker owns them.
#[derive(Debug, Default)]
struct Slot {
    handlers: Option<Handlers>,
    worker: Option<Worker>,
}

/// Background event dispatcher: owns bindings and runs the event loop.
///
/// The state machine is STOPPED -> `run()` -> RUNNING -> `stop()` -> STOPPED.
/// The worker also returns to STOPPED by itself when the stream ends or fails
/// terminally; `is_running()` reflects that.
pub struct Dispatcher {
    cfg: DispatcherConfig,
    connector: Arc<dyn Connector>,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
    slot: Mutex<Slot>,
}

impl Dispatcher {
    /// Create a stopped dispatcher with no bindings.
    pub fn new(connector: impl Connector + 'static, cfg: DispatcherConfig) -> Self {
        Self::with_handlers(Arc::new(connector), cfg, Handlers::default())
    }

    pub(crate) fn with_handlers(
        connector: Arc<dyn Connector>,
        cfg: DispatcherConfig,
        handlers: Handlers,
    ) -> Self {
        Self {
            cfg,
            connector,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            slot: Mutex::new(Slot {
                handlers: Some(handlers),
                worker: None,
            }),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join a worker that is stopping or has already exited and park its handlers.
    fn reap(slot: &mut Slot) -> WatchResult<()> {
        let Some(worker) = slot.worker.take() else {
            return Ok(());
        };
        worker.signal.request();
        match worker.join.join() {
            Ok(handlers) => {
                slot.handlers = Some(handlers);
                Ok(())
            }
            Err(_) => {
                error!("dispatcher worker panicked; bindings were lost");
                slot.handlers = Some(Handlers::default());
                Err(ExecutionError::WorkerPanicked.into())
            }
        }
    }

    fn parked_handlers<'a>(&self, slot: &'a mut Slot) -> WatchResult<&'a mut Handlers> {
        if self.is_running() {
            return Err(ExecutionError::AlreadyRunning.into());
        }
        Self::reap(slot)?;
        Ok(slot.handlers.get_or_insert_with(Handlers::default))
    }

    /// Register a binding. Only allowed while stopped.
    pub fn add_binding(&self, binding: Binding) -> WatchResult<BindingId> {
        let mut slot = self.lock_slot();
        let handlers = self.parked_handlers(&mut slot)?;
        let id = binding.id();
        handlers.bindings.push(binding);
        Ok(id)
    }

    /// Set the callback run for every event before any binding. Replaces a previous one.
    pub fn set_on_edit<F>(&self, callback: F) -> WatchResult<BindingId>
    where
        F: FnMut(&Event) -> CallbackResult + Send + 'static,
    {
        let mut slot = self.lock_slot();
        let handlers = self.parked_handlers(&mut slot)?;
        let handler = Handler::new(callback);
        let id = handler.id();
        handlers.on_edit = Some(handler);
        Ok(id)
    }

    /// Start the worker. A no-op while already running; returns without blocking.
    pub fn run(&self) -> WatchResult<()> {
        let mut slot = self.lock_slot();
        if slot.worker.is_some() && self.is_running() {
            debug!("dispatcher already running");
            return Ok(());
        }
        Self::reap(&mut slot)?;
        let handlers = slot.handlers.take().unwrap_or_default();

        let signal = Arc::new(StopSignal::default());
        let (handoff_tx, handoff_rx) = bounded::<Handlers>(1);

        let connector = Arc::clone(&self.connector);
        let cfg = self.cfg.clone();
        let counters = Arc::clone(&self.counters);
        let thread_signal = Arc::clone(&signal);
        let running = Arc::clone(&self.running);

        self.running.store(true, Ordering::Release);
        let spawned = thread::Builder::new()
            .name(self.cfg.thread_name.clone())
            .spawn(move || {
                let _guard = RunningGuard(running);
                match handoff_rx.recv() {
                    Ok(handlers) => {
                        worker_loop(connector.as_ref(), &cfg, &thread_signal, &counters, handlers)
                    }
                    Err(_) => Handlers::default(),
                }
            });

        let join = match spawned {
            Ok(join) => join,
            Err(e) => {
                self.running.store(false, Ordering::Release);
                slot.handlers = Some(handlers);
                return Err(ExecutionError::WorkerSpawn {
                    message: e.to_string(),
                }
                .into());
            }
        };

        if let Err(returned) = handoff_tx.send(handlers) {
            slot.handlers = Some(returned.into_inner());
        }
        slot.worker = Some(Worker { join, signal });
        info!(thread = %self.cfg.thread_name, "dispatcher started");
        Ok(())
    }

    /// Stop the worker and wait for it to exit. A no-op while stopped.
    ///
    /// No callback runs after this returns. Must not be called from inside a callback.
    pub fn stop(&self) -> WatchResult<()> {
        let mut slot = self.lock_slot();
        if slot.worker.is_none() {
            return Ok(());
        }
        Self::reap(&mut slot)?;
        info!("dispatcher stopped");
        Ok(())
    }

    /// Whether a worker is currently processing the stream.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Counters accumulated over all runs.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cfg", &self.cfg)
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = Self::reap(slot) {
            debug!(error = %e, "dispatcher dropped after its worker panicked");
        }
    }
}

fn worker_loop(
    connector: &dyn Connector,
    cfg: &DispatcherConfig,
    signal: &StopSignal,
    counters: &Counters,
    mut handlers: Handlers,
) -> Handlers {
    let mut source = match connector.connect() {
        Ok(source) => source,
        Err(e) => {
            warn!(error = %e, "failed to open event stream; dispatcher stopping");
            return handlers;
        }
    };
    signal.arm(source.close_handle());

    while !signal.is_requested() {
        let message = match source.next_message() {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!("event stream ended; dispatcher stopping");
                break;
            }
            Err(e) => {
                if signal.is_requested() {
                    debug!(error = %e, "event stream closed by stop request");
                } else {
                    warn!(error = %e, "event stream failed; dispatcher stopping");
                }
                break;
            }
        };

        if signal.is_requested() {
            break;
        }
        handlers.dispatch(&message, cfg, counters);
    }

    handlers
}
