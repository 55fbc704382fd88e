//! A typed, reactive workflow engine: directed graphs of async,
//! user-defined nodes executing against a schema-validated shared context,
//! with event-driven triggers and waits, retry, and a reactive observation
//! layer.
//!
//! # Quick start
//!
//! ```rust
//! use reactive_flow::{GraphDefinition, GraphFlow, NodeConfig, PermissiveSchema};
//! use reactive_flow::node::closure;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let inc = NodeConfig::new(
//!     "inc",
//!     closure(|ctx, _params| {
//!         Box::pin(async move {
//!             let v = ctx.get("value").and_then(|v| v.as_i64()).unwrap_or(0);
//!             ctx.set("value", json!(v + 1));
//!             Ok(())
//!         })
//!     }),
//! );
//!
//! let def = GraphDefinition::new("counter", Arc::new(PermissiveSchema), json!({"value": 0}))
//!     .with_nodes(vec![inc]);
//! let flow = GraphFlow::new(def).unwrap();
//! let result = flow.execute("inc", None, None).await.unwrap();
//! assert_eq!(result["value"], json!(1));
//! # }
//! ```
//!
//! # Module organization
//!
//! - **Context & Schema** — [`context`]: the schema-validated, write-
//!   intercepting shared state nodes execute against.
//! - **Events** — [`event`]: the wire format for everything the engine
//!   emits, stamped with a monotonic clock.
//! - **Execution control** — [`retry`], [`next`]: retry policy and typed
//!   successor routing.
//! - **Node definition** — [`node`]: declarative node configuration and the
//!   [`node::NodeBody`] trait node logic implements.
//! - **Event dispatch** — [`events_manager`]: the broadcast event bus and
//!   `single`/`all`/`correlate` wait-gate evaluation.
//! - **Orchestration** — [`flow`]: the `GraphFlow` wiring all of the above
//!   together behind `execute`/`emit`/`load`.
//! - **Observation** — [`observer`]: derived reactive streams over a flow's
//!   events and state.
//! - **Multi-graph execution** — [`controller`]: sequential, parallel, and
//!   concurrency-limited execution of many flows.
//! - **Inspection** — [`visualization`]: static DOT/Mermaid/ASCII rendering
//!   of a graph's node/edge shape.
//! - **Errors** — [`error`]: the crate-wide `FlowError` enum and `Result`
//!   alias.

pub mod context;
pub mod controller;
pub mod error;
pub mod event;
pub mod events_manager;
pub mod flow;
pub mod logger;
pub mod next;
pub mod node;
pub mod observer;
pub mod retry;
pub mod visualization;

pub use context::{ContextSchema, ContextView, JsonSchema, PermissiveSchema};
pub use controller::{execute_parallel, execute_parallel_bounded, execute_sequential, FlowOutcome, FlowTask};
pub use error::{FlowError, Result};
pub use event::{well_known, GraphEvent, StateChangePayload};
pub use events_manager::{EventManager, HostListener};
pub use flow::{GraphDefinition, GraphFlow};
pub use logger::{LogEntry, Logger};
pub use next::{Next, Predicate};
pub use node::{NodeBody, NodeConfig, WaitStrategy, WhenConfig};
pub use observer::{LetterStream, Observer, StateOptions};
pub use retry::{RetryPolicy, RetryState};
pub use visualization::{visualize, VisualizationFormat, VisualizationOptions};
