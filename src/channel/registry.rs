//! Inbound event handler registry
//!
//! Each subscription owns an unbounded receiver. Dropping the [`Subscription`]
//! removes its handler, so a view that subscribes on mount and drops on
//! teardown never leaves a stale handler behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::mpsc;

type Handlers = HashMap<String, Vec<(u64, mpsc::UnboundedSender<String>)>>;

/// Per-event list of live subscribers
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Handlers>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a handler for `event`
    pub fn subscribe(self: &Arc<Self>, event: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        if let Ok(mut map) = self.handlers.write() {
            map.entry(event.to_string()).or_default().push((id, tx));
        }

        Subscription {
            id,
            event: event.to_string(),
            rx,
            registry: Arc::downgrade(self),
        }
    }

    /// Deliver `payload` to every subscriber of `event`, returning how many
    /// received it. Subscribers whose receiver is gone are pruned.
    pub fn dispatch(&self, event: &str, payload: &str) -> usize {
        let mut delivered = 0;
        let mut stale = Vec::new();

        if let Ok(map) = self.handlers.read() {
            if let Some(list) = map.get(event) {
                for (id, tx) in list {
                    if tx.send(payload.to_string()).is_ok() {
                        delivered += 1;
                    } else {
                        stale.push(*id);
                    }
                }
            }
        }

        for id in stale {
            self.remove(event, id);
        }

        delivered
    }

    /// Number of live handlers for `event`
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .read()
            .map(|map| map.get(event).map_or(0, |list| list.len()))
            .unwrap_or(0)
    }

    fn remove(&self, event: &str, id: u64) {
        if let Ok(mut map) = self.handlers.write() {
            if let Some(list) = map.get_mut(event) {
                list.retain(|(handler_id, _)| *handler_id != id);
                if list.is_empty() {
                    map.remove(event);
                }
            }
        }
    }

    /// Drop every handler; pending receivers see the stream end
    pub fn clear(&self) {
        if let Ok(mut map) = self.handlers.write() {
            map.clear();
        }
    }
}

/// A registered inbound handler. Deregisters itself on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    event: String,
    rx: mpsc::UnboundedReceiver<String>,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    /// Wait for the next payload. `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`]
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event, self.id);
        }
    }
}
