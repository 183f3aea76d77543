//! In-process publish/subscribe dispatch of protocol messages.
//!
//! Listeners subscribe to one exact message type. `emit` is synchronous: every
//! listener for the message's type runs before `emit` returns, in the order the
//! listeners were registered. Listener panics are not caught.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::protocol::{Message, MessageKind, MessageType};

type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Typed message dispatcher shared by every host-side component
#[derive(Clone, Default)]
pub struct MessageBus {
    listeners: Arc<RwLock<Vec<(MessageKind, Handler)>>>,
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl MessageBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for messages of type `M`
    pub fn listen<M, F>(&self, handler: F)
    where
        M: MessageType,
        F: Fn(&M) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |message: &Message| {
            if let Some(typed) = M::downcast(message) {
                handler(typed);
            }
        });
        self.listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((M::KIND, handler));
    }

    /// Register a listener that sees every message
    pub fn listen_all<F>(&self, handler: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for kind in MessageKind::ALL {
            listeners.push((*kind, handler.clone()));
        }
    }

    /// Deliver a message to every listener of its exact type
    pub fn emit(&self, message: impl Into<Message>) {
        let message = message.into();
        let kind = message.kind();

        // Snapshot so listeners may register more listeners or emit re-entrantly
        let handlers: Vec<Handler> = self
            .listeners
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, handler)| handler.clone())
            .collect();

        tracing::trace!(message = kind.name(), listeners = handlers.len(), "emit");
        for handler in handlers {
            handler(&message);
        }
    }

    /// Number of registered listener slots
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .map_or(0, |listeners| listeners.len())
    }
}
