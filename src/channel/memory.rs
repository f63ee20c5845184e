//! In-process channel
//!
//! Records every emission and lets the caller play the remote peer by
//! injecting inbound events.

use super::registry::{HandlerRegistry, Subscription};
use super::{ChannelError, ProgressChannel, INSTALL_EVENT, PROGRESS_EVENT};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct MemoryChannel {
    inbound: Arc<HandlerRegistry>,
    outbound: Arc<HandlerRegistry>,
    emitted: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self {
            inbound: HandlerRegistry::new(),
            outbound: HandlerRegistry::new(),
            emitted: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, as `(event, payload)` pairs
    pub fn emitted(&self) -> Vec<(String, String)> {
        self.emitted.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Deliver an inbound event to subscribers, as the peer would
    pub fn inject(&self, event: &str, payload: &str) -> usize {
        self.inbound.dispatch(event, payload)
    }

    /// Peer-side view of outbound events
    pub fn peer_subscribe(&self, event: &str) -> Subscription {
        self.outbound.subscribe(event)
    }

    /// Number of live inbound handlers for `event`
    pub fn handler_count(&self, event: &str) -> usize {
        self.inbound.handler_count(event)
    }

    /// Reject further emissions and end all subscriptions
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.inbound.clear();
        self.outbound.clear();
    }
}

impl ProgressChannel for MemoryChannel {
    fn emit(&self, event: &str, payload: &str) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        if let Ok(mut emitted) = self.emitted.lock() {
            emitted.push((event.to_string(), payload.to_string()));
        }
        self.outbound.dispatch(event, payload);
        Ok(())
    }

    fn subscribe(&self, event: &str) -> Subscription {
        self.inbound.subscribe(event)
    }
}

/// Answer every install request on `channel` with a short scripted run of
/// progress messages, `step` apart. Used by offline mode.
pub fn spawn_scripted_peer(channel: Arc<MemoryChannel>, step: Duration) -> JoinHandle<()> {
    let mut requests = channel.peer_subscribe(INSTALL_EVENT);

    tokio::spawn(async move {
        while let Some(model) = requests.recv().await {
            tracing::debug!(%model, "scripted peer received install request");
            let script = [
                format!("Resolving {}...", model),
                "Downloading weights...".to_string(),
                "Verifying checksums...".to_string(),
                format!("Installation complete: {} ready", model),
            ];
            for line in script {
                tokio::time::sleep(step).await;
                channel.inject(PROGRESS_EVENT, &line);
            }
        }
    })
}
