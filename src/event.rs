//! Graph events: the single wire format carried on the internal broadcast
//! subject and handed to the host event emitter.
//!
//! Timestamps are monotonic milliseconds since the first event observed by
//! the process (an [`std::time::Instant`]-based clock), not wall-clock time.
//! This keeps ordering assertions independent of system clock adjustments,
//! unlike a `chrono::Utc::now()` timestamp.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Instant;

fn epoch() -> &'static Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now)
}

/// Milliseconds elapsed since this process observed its first event.
pub fn monotonic_millis() -> u64 {
    epoch().elapsed().as_millis() as u64
}

/// The stable set of event names the core itself emits. User-defined event
/// names are transparent passthroughs and are represented as plain strings.
pub mod well_known {
    pub const GRAPH_STARTED: &str = "graphStarted";
    pub const GRAPH_COMPLETED: &str = "graphCompleted";
    pub const GRAPH_ERROR: &str = "graphError";
    pub const NODE_STARTED: &str = "nodeStarted";
    pub const NODE_COMPLETED: &str = "nodeCompleted";
    pub const NODE_ERROR: &str = "nodeError";
    pub const NODE_STATE_CHANGED: &str = "nodeStateChanged";
}

/// A single event: a name, an optional JSON payload, and a monotonic
/// timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEvent {
    /// Event name. Core events use [`well_known`] constants; user events are
    /// whatever the caller passed to `emit`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional event payload.
    pub payload: Option<Value>,
    /// Monotonic milliseconds since process start of event emission.
    pub timestamp: u64,
}

impl GraphEvent {
    /// Construct a new event stamped with the current monotonic time.
    pub fn new(kind: impl Into<String>, payload: Option<Value>) -> Self {
        GraphEvent {
            kind: kind.into(),
            payload,
            timestamp: monotonic_millis(),
        }
    }
}

/// Payload shape for [`well_known::NODE_STATE_CHANGED`] events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangePayload {
    /// Name of the node performing the write.
    pub name: String,
    /// Property key that changed.
    pub property: String,
    /// Previous value (`None` if the property did not previously exist).
    pub old_value: Option<Value>,
    /// New value.
    pub new_value: Value,
    /// Whole-context snapshot taken immediately after the write.
    pub context: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_millis_is_nondecreasing() {
        let a = monotonic_millis();
        let b = monotonic_millis();
        assert!(b >= a);
    }

    #[test]
    fn event_round_trips_through_json() {
        let ev = GraphEvent::new(well_known::NODE_STARTED, Some(serde_json::json!({"x": 1})));
        let s = serde_json::to_string(&ev).unwrap();
        let back: GraphEvent = serde_json::from_str(&s).unwrap();
        assert_eq!(back.kind, well_known::NODE_STARTED);
    }
}
