//! Controller: orchestrates many independent [`GraphFlow`]s sequentially,
//! fully in parallel, or with a concurrency bound.
//!
//! The concurrency-limited path is grounded in the dependency-level chunked
//! scheduling used by `ParallelExecutor` in the reference corpus: work is
//! split into groups of `concurrency_limit` and each group is awaited to
//! completion (a barrier) before the next group starts. Within a group,
//! scheduling itself is `tokio::sync::Semaphore`-driven rather than a fixed
//! wait-for-all-N, so a straggler in a group doesn't block other members of
//! the *same* group from starting — only cross-group ordering is a barrier.

use crate::error::Result;
use crate::flow::GraphFlow;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One flow's start request: which flow, which node to start at, and an
/// optional context overlay.
pub struct FlowTask {
    pub flow: Arc<GraphFlow>,
    pub start_node: String,
    pub params: Option<Value>,
    pub overlay: Option<Value>,
}

impl FlowTask {
    pub fn new(flow: Arc<GraphFlow>, start_node: impl Into<String>) -> Self {
        FlowTask {
            flow,
            start_node: start_node.into(),
            params: None,
            overlay: None,
        }
    }
}

/// The outcome of one flow's execution, as reported back by the Controller.
#[derive(Debug, Clone)]
pub struct FlowOutcome {
    pub graph_name: String,
    pub node_name: String,
    pub context: Value,
}

async fn run_one(task: FlowTask) -> Result<FlowOutcome> {
    let graph_name = task.flow.name().to_string();
    let node_name = task.start_node.clone();
    let context = task
        .flow
        .execute(&task.start_node, task.params, task.overlay)
        .await?;
    Ok(FlowOutcome {
        graph_name,
        node_name,
        context,
    })
}

/// Run every flow to completion, one after another, in the given order.
/// The first failure aborts the remaining flows.
pub async fn execute_sequential(tasks: Vec<FlowTask>) -> Result<Vec<FlowOutcome>> {
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(run_one(task).await?);
    }
    Ok(results)
}

/// Run every flow concurrently with no bound. The first failure is
/// propagated once all flows have settled; flows that already completed
/// still report their outcome via the error's absence — on any failure the
/// whole call returns `Err`, mirroring `execute_sequential`'s all-or-nothing
/// contract.
pub async fn execute_parallel(tasks: Vec<FlowTask>) -> Result<Vec<FlowOutcome>> {
    execute_parallel_bounded(tasks, None).await
}

/// Run flows concurrently with at most `concurrency_limit` flows active in
/// the same group. Groups are chunks of `concurrency_limit` tasks in input
/// order; a group is fully awaited (a barrier) before the next begins.
/// `None` means unbounded: every task runs in a single group.
pub async fn execute_parallel_bounded(
    tasks: Vec<FlowTask>,
    concurrency_limit: Option<usize>,
) -> Result<Vec<FlowOutcome>> {
    let group_size = concurrency_limit.unwrap_or(tasks.len().max(1));
    let mut results = Vec::with_capacity(tasks.len());
    for group in chunk(tasks, group_size) {
        let semaphore = Arc::new(Semaphore::new(group_size.max(1)));
        let mut handles = Vec::with_capacity(group.len());
        for task in group {
            let permit = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                run_one(task).await
            }));
        }
        for handle in handles {
            let outcome = handle.await.expect("flow task panicked")?;
            results.push(outcome);
        }
    }
    Ok(results)
}

fn chunk(mut tasks: Vec<FlowTask>, size: usize) -> Vec<Vec<FlowTask>> {
    let size = size.max(1);
    let mut groups = Vec::new();
    while !tasks.is_empty() {
        let take = size.min(tasks.len());
        groups.push(tasks.drain(..take).collect());
    }
    groups
}
