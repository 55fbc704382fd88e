//! Integration tests exercising full flows end to end: retry, event-wait
//! gates, the Observer, and the Controller's concurrency bound, mirroring
//! the scenario catalog the engine's design was validated against.

use reactive_flow::node::closure;
use reactive_flow::{
    execute_parallel_bounded, FlowTask, GraphDefinition, GraphFlow, NodeConfig, Observer,
    PermissiveSchema, WhenConfig,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn simple_increment_scenario_s1() {
    let inc = NodeConfig::new(
        "inc",
        closure(|ctx, _| {
            Box::pin(async move {
                let v = ctx.get("value").and_then(|v| v.as_i64()).unwrap_or(0);
                ctx.set("value", json!(v + 1));
                Ok(())
            })
        }),
    );
    let def = GraphDefinition::new("s1", Arc::new(PermissiveSchema), json!({"value": 0}))
        .with_nodes(vec![inc]);
    let flow = GraphFlow::new(def).unwrap();
    let result = flow.execute("inc", None, None).await.unwrap();
    assert_eq!(result["value"], json!(1));
}

#[tokio::test]
async fn correlated_wait_scenario_s4() {
    let message = Arc::new(tokio::sync::Mutex::new(None::<String>));
    let m2 = message.clone();
    let node = NodeConfig::new(
        "settle",
        closure(move |ctx, _| {
            let m3 = m2.clone();
            Box::pin(async move {
                ctx.set("settled", json!(true));
                *m3.lock().await = Some("matched".to_string());
                Ok(())
            })
        }),
    )
    .with_when(WhenConfig::correlate(
        vec!["payment", "stock"],
        500,
        |events| {
            let ids: Vec<_> = events
                .iter()
                .map(|e| e.payload.as_ref().and_then(|p| p.get("id").cloned()))
                .collect();
            ids.len() == 2 && ids[0] == ids[1]
        },
    ));
    let def = GraphDefinition::new("s4", Arc::new(PermissiveSchema), json!({}))
        .with_nodes(vec![node]);
    let flow = GraphFlow::new(def).unwrap();

    let flow_for_wait = flow.clone();
    let handle = tokio::spawn(async move { flow_for_wait.execute("settle", None, None).await });

    tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
    flow.emit("payment", Some(json!({"id": "x"}))).await;
    tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
    flow.emit("stock", Some(json!({"id": "x"}))).await;

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result["settled"], json!(true));
}

#[tokio::test]
async fn correlated_wait_times_out_on_mismatched_ids() {
    let node = NodeConfig::new(
        "settle",
        closure(|ctx, _| {
            Box::pin(async move {
                ctx.set("settled", json!(true));
                Ok(())
            })
        }),
    )
    .with_when(WhenConfig::correlate(
        vec!["payment", "stock"],
        100,
        |events| {
            let ids: Vec<_> = events
                .iter()
                .map(|e| e.payload.as_ref().and_then(|p| p.get("id").cloned()))
                .collect();
            ids.len() == 2 && ids[0] == ids[1]
        },
    ));
    let def = GraphDefinition::new("s4b", Arc::new(PermissiveSchema), json!({}))
        .with_nodes(vec![node]);
    let flow = GraphFlow::new(def).unwrap();

    let flow_for_wait = flow.clone();
    let handle = tokio::spawn(async move { flow_for_wait.execute("settle", None, None).await });

    tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    flow.emit("payment", Some(json!({"id": "x"}))).await;
    flow.emit("stock", Some(json!({"id": "y"}))).await;

    let result = handle.await.unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn controller_parallel_with_limit_scenario_s5() {
    let double_node = NodeConfig::new(
        "double",
        closure(|ctx, _| {
            Box::pin(async move {
                let v = ctx.get("value").and_then(|v| v.as_i64()).unwrap_or(0);
                ctx.set("value", json!(v * 2));
                Ok(())
            })
        }),
    );
    let add_node = NodeConfig::new(
        "add",
        closure(|ctx, _| {
            Box::pin(async move {
                let v = ctx.get("value").and_then(|v| v.as_i64()).unwrap_or(0);
                ctx.set("value", json!(v + 3));
                Ok(())
            })
        }),
    );
    let g1 = GraphFlow::new(
        GraphDefinition::new("g1", Arc::new(PermissiveSchema), json!({"value": 1}))
            .with_nodes(vec![double_node]),
    )
    .unwrap();
    let g2 = GraphFlow::new(
        GraphDefinition::new("g2", Arc::new(PermissiveSchema), json!({"value": 2}))
            .with_nodes(vec![add_node]),
    )
    .unwrap();

    let tasks = vec![FlowTask::new(g1, "double"), FlowTask::new(g2, "add")];
    let results = execute_parallel_bounded(tasks, Some(2)).await.unwrap();
    let g1_result = results.iter().find(|r| r.graph_name == "g1").unwrap();
    let g2_result = results.iter().find(|r| r.graph_name == "g2").unwrap();
    assert_eq!(g1_result.context["value"], json!(2));
    assert_eq!(g2_result.context["value"], json!(5));
}

#[tokio::test]
async fn load_replaces_nodes_and_preserves_external_listeners() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let a = NodeConfig::new("a", closure(|_ctx, _| Box::pin(async move { Ok(()) })));
    let def = GraphDefinition::new("s6", Arc::new(PermissiveSchema), json!({}))
        .with_nodes(vec![a]);
    let flow = GraphFlow::new(def).unwrap();

    let completions = Arc::new(AtomicUsize::new(0));
    let c2 = completions.clone();
    flow.on(
        reactive_flow::well_known::NODE_COMPLETED,
        Arc::new(move |_ev| {
            c2.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .await;

    flow.execute("a", None, None).await.unwrap();
    assert_eq!(completions.load(Ordering::SeqCst), 1);

    let new_a = NodeConfig::new("a", closure(|_ctx, _| Box::pin(async move { Ok(()) })));
    let new_b = NodeConfig::new("b", closure(|_ctx, _| Box::pin(async move { Ok(()) })));
    let new_def = GraphDefinition::new("s6-reloaded", Arc::new(PermissiveSchema), json!({}))
        .with_nodes(vec![new_a, new_b]);
    flow.load(new_def).await.unwrap();

    let mut names = flow.get_nodes().await;
    names.sort();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

    // The external listener registered via `on` before `load` must survive
    // the reload (S6): only node-owned dispatch tasks are torn down.
    flow.execute("a", None, None).await.unwrap();
    assert_eq!(completions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn observer_state_stream_reports_only_distinct_snapshots() {
    use futures::StreamExt;

    let inc = NodeConfig::new(
        "inc",
        closure(|ctx, _| {
            Box::pin(async move {
                ctx.set("value", json!(1));
                ctx.set("value", json!(1));
                ctx.set("value", json!(2));
                Ok(())
            })
        }),
    );
    let def = GraphDefinition::new("observed", Arc::new(PermissiveSchema), json!({"value": 0}))
        .with_nodes(vec![inc]);
    let flow = GraphFlow::new(def).unwrap();
    let observer = Observer::new(flow.clone());
    let mut stream = Box::pin(observer.state(Default::default()));

    let initial = stream.next().await.unwrap();
    assert_eq!(initial["value"], json!(0));

    flow.execute("inc", None, None).await.unwrap();
    let updated = stream.next().await.unwrap();
    assert_eq!(updated["value"], json!(2));
}
