//! Client lifecycle events.
//!
//! A client announces state changes, dials and reconnect attempts as events.
//! Observers are registered on the configuration builder and called inline
//! on whichever task produced the event, in registration order.
//!
//! Any `Fn(&E) + Send + Sync` closure is a listener:
//!
//! ```
//! use redial_core::events::{EventListeners, RedialEvent};
//! use std::time::Instant;
//!
//! #[derive(Debug)]
//! struct Dialed(Instant);
//!
//! impl RedialEvent for Dialed {
//!     fn event_type(&self) -> &'static str {
//!         "dialed"
//!     }
//!     fn timestamp(&self) -> Instant {
//!         self.0
//!     }
//!     fn source_name(&self) -> &str {
//!         "db"
//!     }
//! }
//!
//! let mut listeners = EventListeners::new();
//! listeners.add(|event: &Dialed| println!("{} dialed", event.source_name()));
//! assert_eq!(listeners.emit(&Dialed(Instant::now())), 0);
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// An event produced by a named client.
pub trait RedialEvent: Send + Sync + fmt::Debug {
    /// Short stable tag, such as `"connected"` or `"state_transition"`.
    fn event_type(&self) -> &'static str;

    fn timestamp(&self) -> Instant;

    /// Name of the client that produced the event.
    fn source_name(&self) -> &str;
}

/// Receives events of type `E`.
pub trait EventListener<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

impl<E, F> EventListener<E> for F
where
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        self(event)
    }
}

/// The listeners registered on one configuration.
///
/// Cloning shares the listeners themselves.
pub struct EventListeners<E> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: RedialEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Hands `event` to every listener and returns how many of them panicked.
    ///
    /// A panic never reaches the caller and never skips later listeners.
    pub fn emit(&self, event: &E) -> usize {
        let mut panicked = 0;
        for listener in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err() {
                panicked += 1;
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    client = event.source_name(),
                    event = event.event_type(),
                    "event listener panicked"
                );
            }
        }
        panicked
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E> Clone for EventListeners<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<E: RedialEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}
