//! Predicate/callback bindings.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CallbackError;
use crate::event::Event;
use crate::filter::Predicate;

/// Outcome of a user callback. An `Err` is logged and the watcher keeps going.
pub type CallbackResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type BoxedCallback = Box<dyn FnMut(&Event) -> CallbackResult + Send>;

/// Unique identifier for a binding, used in logs and callback errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingId(Uuid);

impl BindingId {
    /// Create a new random binding id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for BindingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding:{}", self.0)
    }
}

/// A callback together with the id it reports failures under.
pub(crate) struct Handler {
    id: BindingId,
    callback: BoxedCallback,
}

impl Handler {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: FnMut(&Event) -> CallbackResult + Send + 'static,
    {
        Self {
            id: BindingId::new(),
            callback: Box::new(callback),
        }
    }

    pub(crate) const fn id(&self) -> BindingId {
        self.id
    }

    /// Run the callback, turning both returned errors and panics into `CallbackError`.
    pub(crate) fn call(&mut self, event: &Event) -> Result<(), CallbackError> {
        let callback = &mut self.callback;
        match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CallbackError::Failed {
                binding: self.id,
                message: e.to_string(),
            }),
            Err(payload) => Err(CallbackError::Panicked {
                binding: self.id,
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A root predicate and the callback fired when it matches.
///
/// Built with [`Predicate::on_match`]. Calling [`Binding::on_match`] again
/// replaces the callback rather than adding a second one.
#[derive(Debug)]
pub struct Binding {
    predicate: Predicate,
    handler: Handler,
}

impl Binding {
    /// Bind `callback` to `predicate`.
    pub fn new<F>(predicate: Predicate, callback: F) -> Self
    where
        F: FnMut(&Event) -> CallbackResult + Send + 'static,
    {
        Self {
            predicate,
            handler: Handler::new(callback),
        }
    }

    /// Replace the callback. The binding keeps its id.
    #[must_use]
    pub fn on_match<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Event) -> CallbackResult + Send + 'static,
    {
        self.handler.callback = Box::new(callback);
        self
    }

    /// Identifier assigned at creation.
    #[must_use]
    pub const fn id(&self) -> BindingId {
        self.handler.id()
    }

    /// Predicate gating the callback.
    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Evaluate the predicate and, on a match, run the callback.
    ///
    /// Returns `Ok(false)` when the predicate did not match.
    pub(crate) fn dispatch(&mut self, event: &Event) -> Result<bool, CallbackError> {
        if !self.predicate.evaluate(event) {
            return Ok(false);
        }
        self.handler.call(event).map(|()| true)
    }
}
