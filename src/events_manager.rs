//! Event Manager: the internal broadcast subject, host-emitter passthrough,
//! and event-wait gate evaluation (`single`, `all`, `correlate`).
//!
//! The internal subject is a [`tokio::sync::broadcast`] channel. Each gate
//! and each node-event listener subscribes its own receiver and filters by
//! type, so listener lifecycle is a matter of dropping a receiver rather
//! than maintaining a manual callback registry — the same shape the
//! teacher's `stream.rs` uses for its `StreamMultiplexer`, adapted from a
//! single-consumer `mpsc` to a multi-subscriber `broadcast` since the
//! Observer (`observer.rs`) needs independent fan-out per subscriber.

use crate::error::{FlowError, Result};
use crate::event::GraphEvent;
use crate::node::WaitStrategy;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{timeout, Duration};

pub type HostListener = Arc<dyn Fn(&GraphEvent) + Send + Sync>;

/// Capacity of the internal broadcast channel. Slow subscribers that fall
/// behind by more than this many events will observe a `Lagged` error on
/// their next `recv` and skip ahead; this is surfaced as a debug log rather
/// than a fatal error by callers.
const CHANNEL_CAPACITY: usize = 1024;

/// Owns the event bus for one [`crate::flow::GraphFlow`].
pub struct EventManager {
    sender: broadcast::Sender<GraphEvent>,
    host_listeners: RwLock<HashMap<String, Vec<HostListener>>>,
}

impl Default for EventManager {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        EventManager {
            sender,
            host_listeners: RwLock::new(HashMap::new()),
        }
    }
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event on the internal subject and on the host emitter.
    pub async fn emit(&self, kind: impl Into<String>, payload: Option<serde_json::Value>) -> GraphEvent {
        let event = GraphEvent::new(kind, payload);
        // No receivers is not an error: the event still reached the host emitter.
        let _ = self.sender.send(event.clone());
        if let Some(listeners) = self.host_listeners.read().await.get(&event.kind) {
            for listener in listeners {
                listener(&event);
            }
        }
        event
    }

    /// Subscribe to the raw internal event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.sender.subscribe()
    }

    /// Register a host-facing listener for `event_name`.
    pub async fn on(&self, event_name: impl Into<String>, listener: HostListener) {
        self.host_listeners
            .write()
            .await
            .entry(event_name.into())
            .or_default()
            .push(listener);
    }

    /// Remove all host-facing listeners for `event_name`.
    pub async fn off(&self, event_name: &str) {
        self.host_listeners.write().await.remove(event_name);
    }

    /// Evaluate a `when` gate: wait for `events` to satisfy `strategy` within
    /// `timeout_ms`, returning the gathered events on success.
    pub async fn wait_for(
        &self,
        node: &str,
        events: &[String],
        timeout_ms: u64,
        strategy: &WaitStrategy,
    ) -> Result<Vec<GraphEvent>> {
        let mut receiver = self.subscribe();
        let wanted: std::collections::HashSet<&str> = events.iter().map(String::as_str).collect();
        let mut last_correlation_attempt: Option<Vec<GraphEvent>> = None;

        let gather = async {
            match strategy {
                WaitStrategy::Single => loop {
                    match receiver.recv().await {
                        Ok(ev) if wanted.contains(ev.kind.as_str()) => return vec![ev],
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => {
                            return Vec::new();
                        }
                    }
                },
                WaitStrategy::All => {
                    let mut gathered: HashMap<String, GraphEvent> = HashMap::new();
                    loop {
                        if wanted.iter().all(|w| gathered.contains_key(*w)) {
                            return gathered.into_values().collect();
                        }
                        match receiver.recv().await {
                            Ok(ev) if wanted.contains(ev.kind.as_str()) => {
                                gathered.insert(ev.kind.clone(), ev);
                            }
                            Ok(_) => continue,
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => {
                                return gathered.into_values().collect();
                            }
                        }
                    }
                }
                WaitStrategy::Correlate(predicate) => loop {
                    let mut gathered: HashMap<String, GraphEvent> = HashMap::new();
                    'gather: loop {
                        if wanted.iter().all(|w| gathered.contains_key(*w)) {
                            break 'gather;
                        }
                        match receiver.recv().await {
                            Ok(ev) if wanted.contains(ev.kind.as_str()) => {
                                gathered.insert(ev.kind.clone(), ev);
                            }
                            Ok(_) => continue,
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => break 'gather,
                        }
                    }
                    let values: Vec<GraphEvent> = gathered.into_values().collect();
                    if values.len() < wanted.len() {
                        // Channel closed before we gathered one of each; give up.
                        return values;
                    }
                    if predicate(&values) {
                        return values;
                    }
                    // Correlation failed; remember it, discard, and keep
                    // listening until the timeout.
                    last_correlation_attempt = Some(values);
                },
            }
        };

        match timeout(Duration::from_millis(timeout_ms), gather).await {
            Ok(events) => {
                if events.len() < wanted.len() {
                    Err(FlowError::EventWaitTimeout {
                        node: node.to_string(),
                        timeout_ms,
                        events: events.into_iter().map(|e| e.kind).collect::<Vec<_>>(),
                    })
                } else {
                    Ok(events)
                }
            }
            Err(_) => {
                if let Some(attempt) = last_correlation_attempt {
                    Err(FlowError::CorrelationFailed {
                        node: node.to_string(),
                        events: attempt.into_iter().map(|e| e.kind).collect(),
                    })
                } else {
                    Err(FlowError::EventWaitTimeout {
                        node: node.to_string(),
                        timeout_ms,
                        events: events.to_vec(),
                    })
                }
            }
        }
    }
}
