//! Session-level events and the local listener registry.
//!
//! Handlers run in registration order on whichever task delivered the event.
//! There is no cap on the number of registrations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::proto::CanonicalEvent;

/// Event emitted by a [`Session`](crate::session::Session).
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The session exists server-side. Carries `{"sessionId": ..}`, or the
    /// full create response when the start was deferred to an auto-trigger.
    Created(Value),
    /// The realtime transport opened.
    Connected { session_id: String },
    /// Transport, adapter, or control-call failure.
    Error { session_id: String, error: String },
    /// The realtime transport closed.
    Disconnected {
        session_id: String,
        code: u16,
        reason: String,
    },
    /// Agent event normalized from the wire.
    Message(CanonicalEvent),
}

impl SessionEvent {
    pub fn name(&self) -> SessionEventName {
        match self {
            Self::Created(_) => SessionEventName::Created,
            Self::Connected { .. } => SessionEventName::Connected,
            Self::Error { .. } => SessionEventName::Error,
            Self::Disconnected { .. } => SessionEventName::Disconnected,
            Self::Message(_) => SessionEventName::Message,
        }
    }

    pub fn as_message(&self) -> Option<&CanonicalEvent> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }
}

/// Names callers subscribe to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SessionEventName {
    Created,
    Connected,
    Error,
    Disconnected,
    Message,
}

impl SessionEventName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "session_created",
            Self::Connected => "session_connected",
            Self::Error => "session_error",
            Self::Disconnected => "session_disconnected",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for SessionEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Clone)]
enum Delivery {
    Callback(Handler),
    Channel(mpsc::UnboundedSender<SessionEvent>),
}

#[derive(Clone)]
struct Entry {
    id: u64,
    filter: Option<SessionEventName>,
    delivery: Delivery,
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl Listeners {
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        filter: Option<SessionEventName>,
        handler: Handler,
    ) -> Subscription {
        self.insert(filter, Delivery::Callback(handler))
    }

    pub(crate) fn channel(self: &Arc<Self>) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.insert(None, Delivery::Channel(tx));
        rx
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    /// Delivers `event` to every matching listener.
    ///
    /// The registry lock is released before handlers run, so a handler may
    /// subscribe, unsubscribe, or call back into the session.
    pub(crate) fn emit(&self, event: &SessionEvent) {
        let name = event.name();
        let snapshot: Vec<Entry> = self
            .entries()
            .iter()
            .filter(|entry| entry.filter.map_or(true, |filter| filter == name))
            .cloned()
            .collect();

        let mut closed = Vec::new();
        for entry in snapshot {
            match entry.delivery {
                Delivery::Callback(handler) => handler(event),
                Delivery::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        closed.push(entry.id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            self.entries().retain(|entry| !closed.contains(&entry.id));
        }
    }

    fn insert(
        self: &Arc<Self>,
        filter: Option<SessionEventName>,
        delivery: Delivery,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push(Entry {
            id,
            filter,
            delivery,
        });
        Subscription {
            id,
            listeners: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("registered", &self.len())
            .finish()
    }
}

/// Handle returned by [`Session::on`](crate::session::Session::on).
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    /// Removes the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.listeners
            .upgrade()
            .map_or(false, |listeners| listeners.remove(self.id))
    }
}
