//! Dispatch table from message kind to the handlers interested in it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use pawnhub_shared::{MessageKind, ServerMessage};
use parking_lot::Mutex;
use tracing::{trace, warn};

/// Callback invoked with every inbound message of the kind it registered for.
pub type Handler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

struct Entry {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Table {
    next_id: u64,
    handlers: HashMap<MessageKind, Vec<Entry>>,
}

/// Registered handlers, invoked in registration order.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    table: Arc<Mutex<Table>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`.
    ///
    /// The returned [`Subscription`] removes exactly this handler; dropping it
    /// leaves the handler registered.
    pub fn on<F>(&self, kind: MessageKind, handler: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        let mut table = self.table.lock();
        table.next_id += 1;
        let id = table.next_id;
        table.handlers.entry(kind).or_default().push(Entry {
            id,
            handler: Arc::new(handler),
        });

        Subscription {
            kind,
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Invoke every handler registered for the message's kind.
    ///
    /// Returns how many handlers ran. Handlers run outside the lock, so they
    /// may register or remove handlers themselves; such changes apply from the
    /// next message on.
    pub fn dispatch(&self, message: &ServerMessage) -> usize {
        let Some(kind) = message.kind() else {
            trace!("Ignoring message of unknown type");
            return 0;
        };

        let handlers: Vec<Handler> = {
            let table = self.table.lock();
            match table.handlers.get(&kind) {
                Some(entries) => entries.iter().map(|e| e.handler.clone()).collect(),
                None => return 0,
            }
        };

        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: MessageKind) -> usize {
        self.table
            .lock()
            .handlers
            .get(&kind)
            .map_or(0, |entries| entries.len())
    }
}

/// Handle returned by [`HandlerRegistry::on`].
#[derive(Debug, Clone)]
pub struct Subscription {
    kind: MessageKind,
    id: u64,
    table: Weak<Mutex<Table>>,
}

impl Subscription {
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Remove the handler. Returns `false` (and logs a warning) when it was
    /// already removed.
    pub fn unsubscribe(&self) -> bool {
        let removed = self.table.upgrade().is_some_and(|table| {
            let mut table = table.lock();
            let Some(entries) = table.handlers.get_mut(&self.kind) else {
                return false;
            };
            match entries.iter().position(|e| e.id == self.id) {
                Some(index) => {
                    entries.remove(index);
                    true
                }
                None => false,
            }
        });

        if !removed {
            warn!(kind = %self.kind, "Did not find handler to deregister");
        }
        removed
    }
}
