//! Node configuration: the declarative shape of one unit of work in a
//! graph, and the [`NodeBody`] trait its executable logic implements.

use crate::context::ContextSchema;
use crate::error::Result;
use crate::event::GraphEvent;
use crate::next::{Next, Predicate};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// The executable body of a node. Implement this directly for stateful
/// nodes, or use [`closure`] to adapt a plain async closure.
#[async_trait]
pub trait NodeBody: Send + Sync {
    /// Run the node's logic against a live, write-intercepting view of the
    /// context, with an optional call-time parameter bag.
    async fn execute(&self, ctx: &mut crate::context::ContextView<'_>, params: Option<&Value>) -> Result<()>;
}

type ClosureFut<'a> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

struct ClosureBody<F>(F);

#[async_trait]
impl<F> NodeBody for ClosureBody<F>
where
    F: for<'a> Fn(&'a mut crate::context::ContextView<'_>, Option<&'a Value>) -> ClosureFut<'a>
        + Send
        + Sync,
{
    async fn execute(&self, ctx: &mut crate::context::ContextView<'_>, params: Option<&Value>) -> Result<()> {
        (self.0)(ctx, params).await
    }
}

/// Adapt a plain async closure `Fn(&mut ContextView, Option<&Value>) -> impl Future<Output = Result<()>>`
/// into a [`NodeBody`].
pub fn closure<F>(f: F) -> Arc<dyn NodeBody>
where
    F: for<'a> Fn(&'a mut crate::context::ContextView<'_>, Option<&'a Value>) -> ClosureFut<'a>
        + Send
        + Sync
        + 'static,
{
    Arc::new(ClosureBody(f))
}

/// How an event-wait gate decides it has gathered enough events.
pub enum WaitStrategy {
    /// Resolve on the first arrival among the configured events.
    Single,
    /// Resolve once at least one instance of every configured event has
    /// arrived.
    All,
    /// Gather one instance per configured event, then invoke the given
    /// predicate; resolve iff it returns true. Non-matching gathers are
    /// discarded and listening continues until the timeout.
    Correlate(Arc<dyn Fn(&[GraphEvent]) -> bool + Send + Sync>),
}

impl std::fmt::Debug for WaitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitStrategy::Single => write!(f, "Single"),
            WaitStrategy::All => write!(f, "All"),
            WaitStrategy::Correlate(_) => write!(f, "Correlate(<fn>)"),
        }
    }
}

/// An event-wait gate evaluated before a node executes.
pub struct WhenConfig {
    pub events: Vec<String>,
    pub timeout_ms: u64,
    pub strategy: WaitStrategy,
}

impl WhenConfig {
    pub fn single(events: impl IntoIterator<Item = impl Into<String>>, timeout_ms: u64) -> Self {
        WhenConfig {
            events: events.into_iter().map(Into::into).collect(),
            timeout_ms,
            strategy: WaitStrategy::Single,
        }
    }

    pub fn all(events: impl IntoIterator<Item = impl Into<String>>, timeout_ms: u64) -> Self {
        WhenConfig {
            events: events.into_iter().map(Into::into).collect(),
            timeout_ms,
            strategy: WaitStrategy::All,
        }
    }

    pub fn correlate(
        events: impl IntoIterator<Item = impl Into<String>>,
        timeout_ms: u64,
        correlation: impl Fn(&[GraphEvent]) -> bool + Send + Sync + 'static,
    ) -> Self {
        WhenConfig {
            events: events.into_iter().map(Into::into).collect(),
            timeout_ms,
            strategy: WaitStrategy::Correlate(Arc::new(correlation)),
        }
    }
}

/// The declarative configuration of one node.
pub struct NodeConfig {
    pub name: String,
    pub execute: Arc<dyn NodeBody>,
    /// Successor edges, evaluated in declaration order after a successful
    /// execution (only when not triggered by an event).
    pub next: Vec<Next>,
    /// Optional condition gate; when false, the node is silently skipped.
    pub condition: Option<Predicate>,
    /// Optional schema for the call-time parameter bag.
    pub params_schema: Option<Arc<dyn ContextSchema>>,
    pub retry: RetryPolicy,
    /// Optional event-wait gate evaluated before `condition`/`execute`.
    pub when: Option<WhenConfig>,
    /// Event names that, on emission, dispatch this node out-of-band.
    pub events: Vec<String>,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, execute: Arc<dyn NodeBody>) -> Self {
        NodeConfig {
            name: name.into(),
            execute,
            next: Vec::new(),
            condition: None,
            params_schema: None,
            retry: RetryPolicy::default(),
            when: None,
            events: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: Vec<Next>) -> Self {
        self.next = next;
        self
    }

    pub fn with_condition(mut self, condition: Predicate) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_params_schema(mut self, schema: Arc<dyn ContextSchema>) -> Self {
        self.params_schema = Some(schema);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_when(mut self, when: WhenConfig) -> Self {
        self.when = Some(when);
        self
    }

    pub fn with_events(mut self, events: Vec<String>) -> Self {
        self.events = events;
        self
    }
}
