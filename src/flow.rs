//! Graph Flow: the component wiring Context, Event Manager, and Node
//! Executor together behind the public `execute`/`emit`/`load` surface.

use crate::context::{validate_initial, ContextSchema, ContextView};
use crate::error::{FlowError, Result};
use crate::event::{well_known, GraphEvent};
use crate::events_manager::EventManager;
use crate::logger::Logger;
use crate::next::resolve as resolve_next;
use crate::node::NodeConfig;
use crate::retry::RetryState;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A graph definition: schema, initial context, node set, and optional
/// entry point / graph-level event triggers.
pub struct GraphDefinition {
    pub name: String,
    pub schema: Arc<dyn ContextSchema>,
    pub context: Value,
    pub nodes: Vec<NodeConfig>,
    pub entry_node: Option<String>,
    /// Event names that, when emitted, run the whole graph from `entry_node`
    /// against a fresh clone of the initial context overlaid by the event
    /// payload.
    pub graph_events: Vec<String>,
    pub on_error: Option<Arc<dyn Fn(&FlowError, &Value) + Send + Sync>>,
}

impl GraphDefinition {
    pub fn new(name: impl Into<String>, schema: Arc<dyn ContextSchema>, context: Value) -> Self {
        GraphDefinition {
            name: name.into(),
            schema,
            context,
            nodes: Vec::new(),
            entry_node: None,
            graph_events: Vec::new(),
            on_error: None,
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<NodeConfig>) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_entry_node(mut self, entry: impl Into<String>) -> Self {
        self.entry_node = Some(entry.into());
        self
    }

    pub fn with_graph_events(mut self, events: Vec<String>) -> Self {
        self.graph_events = events;
        self
    }

    pub fn with_on_error(mut self, handler: Arc<dyn Fn(&FlowError, &Value) + Send + Sync>) -> Self {
        self.on_error = Some(handler);
        self
    }
}

/// One instantiated graph: schema-bound context, node registry, event bus,
/// and log buffer.
pub struct GraphFlow {
    name: String,
    schema: RwLock<Arc<dyn ContextSchema>>,
    initial_context: RwLock<Value>,
    context: Mutex<Map<String, Value>>,
    nodes: RwLock<HashMap<String, Arc<NodeConfig>>>,
    entry_node: RwLock<Option<String>>,
    graph_events: RwLock<Vec<String>>,
    on_error: RwLock<Option<Arc<dyn Fn(&FlowError, &Value) + Send + Sync>>>,
    events: Arc<EventManager>,
    logger: Arc<Logger>,
    state_tx: watch::Sender<Value>,
    listener_tasks: Mutex<Vec<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl GraphFlow {
    /// Construct a flow from a [`GraphDefinition`], validating the initial
    /// context against the schema.
    pub fn new(def: GraphDefinition) -> Result<Arc<Self>> {
        let context = validate_initial(def.schema.as_ref(), def.context.clone())?;
        let (state_tx, _) = watch::channel(Value::Object(context.clone()));
        let mut registry = HashMap::new();
        for node in def.nodes {
            registry.insert(node.name.clone(), Arc::new(node));
        }
        let flow = Arc::new(GraphFlow {
            name: def.name,
            schema: RwLock::new(def.schema),
            initial_context: RwLock::new(def.context),
            context: Mutex::new(context),
            nodes: RwLock::new(registry),
            entry_node: RwLock::new(def.entry_node),
            graph_events: RwLock::new(def.graph_events),
            on_error: RwLock::new(def.on_error),
            events: Arc::new(EventManager::new()),
            logger: Arc::new(Logger::new()),
            state_tx,
            listener_tasks: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });
        let flow_for_setup = flow.clone();
        // setup_event_listeners/setup_graph_event_listeners need to run on an
        // async runtime; new() is synchronous (mirrors the teacher's
        // builder-returns-Arc pattern), so this only spawns the registration
        // itself, which is cheap and idempotent.
        tokio::spawn(async move {
            flow_for_setup.setup_event_listeners().await;
            flow_for_setup.setup_graph_event_listeners().await;
        });
        Ok(flow)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to the event manager, for the Observer to subscribe against.
    pub fn events(&self) -> Arc<EventManager> {
        self.events.clone()
    }

    /// Register a host-facing listener for `event_name` directly on the
    /// flow, without going through [`GraphFlow::events`].
    pub async fn on(&self, event_name: impl Into<String>, listener: crate::events_manager::HostListener) {
        self.events.on(event_name, listener).await;
    }

    /// Remove all host-facing listeners for `event_name`.
    pub async fn off(&self, event_name: &str) {
        self.events.off(event_name).await;
    }

    /// Watch channel tracking the latest whole-context snapshot.
    pub fn state_receiver(&self) -> watch::Receiver<Value> {
        self.state_tx.subscribe()
    }

    pub async fn get_context(&self) -> Value {
        Value::Object(self.context.lock().await.clone())
    }

    pub async fn get_nodes(&self) -> Vec<String> {
        self.nodes.read().await.keys().cloned().collect()
    }

    pub async fn get_logs(&self) -> Vec<crate::logger::LogEntry> {
        self.logger.entries().await
    }

    pub async fn clear_logs(&self) {
        self.logger.clear().await;
    }

    pub async fn set_verbose(&self, verbose: bool) {
        self.logger.set_verbose(verbose);
    }

    pub async fn add_node(&self, node: NodeConfig) {
        self.nodes.write().await.insert(node.name.clone(), Arc::new(node));
        self.setup_event_listeners().await;
    }

    pub async fn remove_node(&self, name: &str) {
        self.nodes.write().await.remove(name);
        self.setup_event_listeners().await;
    }

    /// Replace the graph wholesale: clears node-owned event listeners, loads
    /// the new definition's nodes/schema/context, re-registers listeners.
    /// External (non-node) listeners registered via `on` are preserved,
    /// since `abort_listener_tasks` only tears down node-dispatch tasks.
    pub async fn load(&self, def: GraphDefinition) -> Result<()> {
        self.abort_listener_tasks().await;
        let context = validate_initial(def.schema.as_ref(), def.context.clone())?;
        *self.schema.write().await = def.schema;
        *self.initial_context.write().await = def.context;
        *self.context.lock().await = context.clone();
        let _ = self.state_tx.send(Value::Object(context));
        let mut registry = HashMap::new();
        for node in def.nodes {
            registry.insert(node.name.clone(), Arc::new(node));
        }
        *self.nodes.write().await = registry;
        *self.entry_node.write().await = def.entry_node;
        *self.graph_events.write().await = def.graph_events;
        *self.on_error.write().await = def.on_error;
        self.setup_event_listeners().await;
        self.setup_graph_event_listeners().await;
        Ok(())
    }

    async fn abort_listener_tasks(&self) {
        let mut tasks = self.listener_tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Register one dispatch task per `(node, event)` pair declared via
    /// `NodeConfig::events`. Idempotent: prior node-owned tasks are aborted
    /// first (P4).
    async fn setup_event_listeners(self: &Arc<Self>) {
        self.abort_listener_tasks().await;
        let nodes = self.nodes.read().await;
        let mut tasks = Vec::new();
        for node in nodes.values() {
            for event_name in &node.events {
                let flow = self.clone();
                let node_name = node.name.clone();
                let mut receiver = self.events.subscribe();
                let wanted = event_name.clone();
                tasks.push(tokio::spawn(async move {
                    loop {
                        match receiver.recv().await {
                            Ok(ev) if ev.kind == wanted => {
                                flow.dispatch_from_event(&node_name, ev).await;
                            }
                            Ok(_) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }));
            }
        }
        drop(nodes);
        *self.listener_tasks.lock().await = tasks;
    }

    /// Register one dispatch task per graph-level event: runs the whole
    /// graph from `entry_node` against a fresh clone of the initial context
    /// overlaid by the event payload.
    async fn setup_graph_event_listeners(self: &Arc<Self>) {
        let graph_events = self.graph_events.read().await.clone();
        let Some(entry) = self.entry_node.read().await.clone() else {
            return;
        };
        let mut tasks = self.listener_tasks.lock().await;
        for event_name in graph_events {
            let flow = self.clone();
            let mut receiver = self.events.subscribe();
            let entry = entry.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(ev) if ev.kind == event_name => {
                            let overlay = ev.payload.clone();
                            let _ = flow.execute(&entry, None, overlay).await;
                        }
                        Ok(_) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }
    }

    async fn dispatch_from_event(self: &Arc<Self>, node_name: &str, event: GraphEvent) {
        if let Some(Value::Object(patch)) = event.payload.as_ref() {
            let mut ctx = self.context.lock().await;
            for (k, v) in patch {
                ctx.insert(k.clone(), v.clone());
            }
        }
        if let Err(e) = self.execute_node(node_name, None, true).await {
            self.logger
                .error(format!("event-triggered node '{node_name}' failed"), json!({"error": e.to_string()}))
                .await;
            self.events
                .emit(well_known::NODE_ERROR, Some(json!({"node": node_name, "error": e.to_string()})))
                .await;
        }
    }

    /// Publish `event_name` and synchronously dispatch every node listening
    /// for it, in insertion order, each against a fresh clone of the
    /// current context merged with `payload`. Event-triggered executions
    /// never cascade successors.
    pub async fn emit(self: &Arc<Self>, event_name: impl Into<String>, payload: Option<Value>) {
        let event_name = event_name.into();
        let event = self.events.emit(event_name.clone(), payload.clone()).await;
        let matching: Vec<String> = {
            let nodes = self.nodes.read().await;
            nodes
                .values()
                .filter(|n| n.events.iter().any(|e| e == &event_name))
                .map(|n| n.name.clone())
                .collect()
        };
        for node_name in matching {
            self.dispatch_from_event(&node_name, event.clone()).await;
        }
    }

    /// Run the graph starting at `start_node`. Emits `graphStarted` before
    /// and `graphCompleted`/`graphError` after.
    #[tracing::instrument(skip(self, params, context_overlay), fields(graph = %self.name))]
    pub async fn execute(
        self: &Arc<Self>,
        start_node: &str,
        params: Option<Value>,
        context_overlay: Option<Value>,
    ) -> Result<Value> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(FlowError::NodeNotFound(start_node.to_string()));
        }
        if !self.nodes.read().await.contains_key(start_node) {
            return Err(FlowError::NodeNotFound(start_node.to_string()));
        }
        {
            let node = self.nodes.read().await.get(start_node).cloned();
            if let Some(node) = node {
                if node.params_schema.is_some() && params.is_none() {
                    return Err(FlowError::ParamsRequired(start_node.to_string()));
                }
            }
        }
        if let Some(Value::Object(patch)) = context_overlay {
            let mut ctx = self.context.lock().await;
            for (k, v) in patch {
                ctx.insert(k, v);
            }
        }
        self.logger.info(format!("graph '{}' started at '{start_node}'", self.name), json!({})).await;
        self.events.emit(well_known::GRAPH_STARTED, None).await;
        let result = self.execute_node(start_node, params.as_ref(), false).await;
        let snapshot = self.get_context().await;
        match result {
            Ok(()) => {
                self.logger.info(format!("graph '{}' completed", self.name), json!({})).await;
                self.events
                    .emit(well_known::GRAPH_COMPLETED, Some(snapshot.clone()))
                    .await;
                Ok(snapshot)
            }
            Err(e) => {
                self.logger
                    .error(format!("graph '{}' failed", self.name), json!({"error": e.to_string()}))
                    .await;
                self.events
                    .emit(
                        well_known::GRAPH_ERROR,
                        Some(json!({"error": e.to_string(), "context": snapshot})),
                    )
                    .await;
                if let Some(handler) = self.on_error.read().await.as_ref() {
                    handler(&e, &snapshot);
                }
                Err(e)
            }
        }
    }

    /// The Node Executor algorithm (spec §4.2), recursive over successors.
    fn execute_node<'a>(
        self: &'a Arc<Self>,
        name: &'a str,
        params: Option<&'a Value>,
        triggered_by_event: bool,
    ) -> BoxFuture<'a, Result<()>> {
        use tracing::Instrument;
        let span = tracing::info_span!("execute_node", graph = %self.name, node = %name, triggered_by_event);
        Box::pin(async move {
            let node = self
                .nodes
                .read()
                .await
                .get(name)
                .cloned()
                .ok_or_else(|| FlowError::NodeNotFound(name.to_string()))?;

            // 2. Event-wait gate.
            if let Some(when) = &node.when {
                if !triggered_by_event {
                    self.logger
                        .debug(format!("node '{name}' waiting for events"), json!({"events": when.events}))
                        .await;
                    self.events
                        .wait_for(name, &when.events, when.timeout_ms, &when.strategy)
                        .await?;
                }
            }

            // 3. Condition gate.
            if let Some(condition) = &node.condition {
                let snapshot = self.get_context().await;
                if !condition(&snapshot) {
                    self.logger
                        .debug(format!("node '{name}' skipped by condition"), json!({}))
                        .await;
                    return Ok(());
                }
            }

            // 4. Emit nodeStarted.
            let snapshot = self.get_context().await;
            self.logger.info(format!("node '{name}' started"), json!({})).await;
            self.events
                .emit(well_known::NODE_STARTED, Some(json!({"name": name, "context": snapshot})))
                .await;

            // 5. Param validation.
            if let Some(schema) = &node.params_schema {
                match params {
                    None => return Err(FlowError::ParamsRequired(name.to_string())),
                    Some(p) => schema
                        .validate(p)
                        .map_err(|e| FlowError::param_invalid(name, e))?,
                }
            }

            // 6-7. Write-intercepting view + retry loop.
            let mut retry_state = RetryState::default();
            loop {
                let mut ctx = self.context.lock().await;
                let mut view = ContextView::new(name, &mut ctx);
                let attempt_result = node.execute.execute(&mut view, params).await;
                let pending = view.take_pending();
                drop(ctx);

                for change in &pending {
                    self.logger
                        .debug(format!("node '{name}' changed '{}'", change.property), json!({}))
                        .await;
                    self.events
                        .emit(well_known::NODE_STATE_CHANGED, Some(json!(change)))
                        .await;
                    let _ = self.state_tx.send(change.context.clone());
                }

                match attempt_result {
                    Ok(()) => break,
                    Err(e) => {
                        retry_state.record_attempt(&e);
                        if retry_state.should_retry(&node.retry) {
                            self.logger
                                .debug(
                                    format!("node '{name}' attempt {} failed, retrying", retry_state.attempts),
                                    json!({"error": e.to_string()}),
                                )
                                .await;
                            tokio::time::sleep(node.retry.delay).await;
                            continue;
                        }
                        let exhausted = FlowError::RetryExhausted {
                            node: name.to_string(),
                            attempts: retry_state.attempts,
                            error: e.to_string(),
                        };
                        if node.retry.continue_on_failed {
                            self.logger
                                .warn(format!("node '{name}' exhausted retries, continuing"), json!({"error": exhausted.to_string()}))
                                .await;
                            break;
                        }
                        self.events
                            .emit(well_known::NODE_ERROR, Some(json!({"name": name, "error": exhausted.to_string()})))
                            .await;
                        return Err(exhausted);
                    }
                }
            }

            // 8. Checkpoint validation.
            let final_snapshot = self.get_context().await;
            let schema = self.schema.read().await;
            if let Err(e) = schema.validate(&final_snapshot) {
                let err = FlowError::context_invalid(name, e);
                self.events
                    .emit(well_known::NODE_ERROR, Some(json!({"name": name, "error": err.to_string()})))
                    .await;
                return Err(err);
            }
            drop(schema);

            // 9. Emit nodeCompleted.
            self.logger.info(format!("node '{name}' completed"), json!({})).await;
            self.events
                .emit(well_known::NODE_COMPLETED, Some(json!({"name": name, "context": final_snapshot})))
                .await;

            // 10. Successor selection (skipped for event-triggered dispatches).
            // Invariant 2: a dangling successor name is logged and skipped,
            // never fatal to the traversal.
            if !triggered_by_event {
                let successors = resolve_next(&node.next, &final_snapshot);
                for successor in successors {
                    if !self.nodes.read().await.contains_key(&successor) {
                        self.logger
                            .warn(format!("successor '{successor}' of node '{name}' not found, skipping"), json!({}))
                            .await;
                        continue;
                    }
                    self.execute_node(&successor, None, false).await?;
                }
            }

            Ok(())
        }.instrument(span))
    }

    /// Terminate the flow: aborts all listener tasks and drops the event
    /// subject's senders, so outstanding Observer subscriptions complete.
    pub async fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.abort_listener_tasks().await;
    }
}
