//! # parley-events
//!
//! [`EventRouter`]: dispatches decoded inbound messages to registered
//! listeners. Handlers run synchronously, in subscription order, and a
//! failing handler never prevents the remaining handlers from running.

#![deny(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

/// A handler's own failure; logged, never propagated to other handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Subscriber callback for decoded frames.
pub type Handler = Arc<dyn Fn(&Value) -> Result<(), HandlerError> + Send + Sync>;

/// Fan-out hub for decoded push events.
///
/// One instance per socket; the socket feeds it every successfully
/// parsed frame via [`EventRouter::dispatch`].
#[derive(Default)]
pub struct EventRouter {
    handlers: parking_lot::RwLock<Vec<(u64, Handler)>>,
    next_id: AtomicU64,
}

/// Handle returned by [`EventRouter::subscribe`]; detaches the handler
/// when consumed.
pub struct Subscription {
    id: u64,
    router: Arc<EventRouter>,
}

impl Subscription {
    /// Remove the handler. Dispatches already in progress still see it.
    pub fn unsubscribe(self) {
        self.router
            .handlers
            .write()
            .retain(|(id, _)| *id != self.id);
    }
}

impl EventRouter {
    /// Empty router.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a handler; handlers are invoked in subscription order.
    pub fn subscribe(
        self: &Arc<Self>,
        handler: impl Fn(&Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().push((id, Arc::new(handler)));
        Subscription {
            id,
            router: Arc::clone(self),
        }
    }

    /// Invoke every currently-subscribed handler with `message`.
    ///
    /// Handler errors are logged and isolated; the loop always runs to
    /// completion.
    pub fn dispatch(&self, message: &Value) {
        // Snapshot so a handler may subscribe/unsubscribe re-entrantly
        // without deadlocking on the registry lock.
        let snapshot: Vec<Handler> = self
            .handlers
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in snapshot {
            if let Err(e) = handler(message) {
                tracing::error!("event handler failed: {e}");
            }
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// True when nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
