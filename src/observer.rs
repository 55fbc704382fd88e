//! Observer: derived reactive streams over a flow's event and state
//! subjects.
//!
//! Each derived stream is implemented as a filtered/mapped view over the
//! flow's broadcast event stream (or its watch-based state snapshot),
//! using `tokio_stream`/`futures` combinators, with an explicit JSON
//! equality dedup — the transport itself (`broadcast`) makes no uniqueness
//! guarantee, so distinct-until-changed is applied here rather than assumed.

use crate::event::{well_known, GraphEvent};
use crate::flow::GraphFlow;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, WatchStream};

/// Options controlling the `state()` stream.
#[derive(Debug, Clone, Default)]
pub struct StateOptions {
    /// Collapse bursts of updates closer together than this into one
    /// emission (the latest value in the burst).
    pub debounce: Option<Duration>,
    /// Restrict emissions to snapshots where one of these top-level keys
    /// changed. Empty means no restriction.
    pub properties: Vec<String>,
    /// Optional letter-by-letter progressive rendering of one string
    /// property, driven off the same snapshot stream.
    pub stream: Option<LetterStream>,
}

/// Configuration for `state()`'s optional "streaming" mode: when the named
/// property is a string, each new value is replayed to `on_letter`
/// character by character at `interval`, then `on_complete` fires. Intended
/// for UI progressive rendering (e.g. a typewriter effect over an LLM
/// response field) — it is a side channel alongside the ordinary snapshot
/// stream, not a replacement for it.
#[derive(Clone)]
pub struct LetterStream {
    pub property: String,
    pub interval: Duration,
    pub on_letter: Arc<dyn Fn(&str, char) + Send + Sync>,
    pub on_complete: Arc<dyn Fn(&str) + Send + Sync>,
}

impl std::fmt::Debug for LetterStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LetterStream")
            .field("property", &self.property)
            .field("interval", &self.interval)
            .finish()
    }
}

/// The reactive layer over a single [`GraphFlow`].
pub struct Observer {
    flow: Arc<GraphFlow>,
}

impl Observer {
    pub fn new(flow: Arc<GraphFlow>) -> Self {
        Observer { flow }
    }

    /// Current context plus subsequent whole-context snapshots, optionally
    /// debounced and restricted to changes touching `options.properties`.
    pub fn state(&self, options: StateOptions) -> impl Stream<Item = Value> + Send {
        let inner = WatchStream::new(self.flow.state_receiver()).filter_map(|v| async move { Some(v) });
        let debounced = debounce_stream(inner, options.debounce);
        let properties = options.properties.clone();
        let deduped = dedup_stream_by(debounced, move |v| {
            if properties.is_empty() {
                v.clone()
            } else {
                project(v, &properties, None)
            }
        });
        match options.stream {
            None => futures::stream::StreamExt::boxed(deduped),
            Some(cfg) => futures::stream::StreamExt::boxed(deduped.inspect(move |value| {
                let Some(text) = value.get(&cfg.property).and_then(|v| v.as_str()) else {
                    return;
                };
                let text = text.to_string();
                let cfg = cfg.clone();
                tokio::spawn(async move {
                    for ch in text.chars() {
                        (cfg.on_letter)(&cfg.property, ch);
                        tokio::time::sleep(cfg.interval).await;
                    }
                    (cfg.on_complete)(&cfg.property);
                });
            })),
        }
    }

    /// Context snapshots at each state change attributable to `name`.
    pub fn node(&self, name: impl Into<String>) -> impl Stream<Item = Value> + Send {
        let name = name.into();
        self.state_change_stream(move |payload| payload["name"] == Value::String(name.clone()))
    }

    /// Context snapshots at each state change attributable to any of
    /// `names`.
    pub fn nodes(&self, names: Vec<String>) -> impl Stream<Item = Value> + Send {
        self.state_change_stream(move |payload| {
            payload["name"]
                .as_str()
                .map(|n| names.iter().any(|w| w == n))
                .unwrap_or(false)
        })
    }

    /// Objects restricted to `keys` (plus the emitting node's name) at each
    /// state change touching one of those keys. Emits an initial value
    /// derived from the current snapshot so subscribers don't hang on idle
    /// state.
    pub fn property(&self, keys: Vec<String>) -> impl Stream<Item = Value> + Send {
        let flow = self.flow.clone();
        let raw = async_stream::stream! {
            let initial = flow.get_context().await;
            yield project(&initial, &keys, None);

            let mut receiver = flow.events().subscribe();
            loop {
                match receiver.recv().await {
                    Ok(ev) if ev.kind == well_known::NODE_STATE_CHANGED => {
                        let Some(payload) = ev.payload else { continue };
                        let touched = payload["property"].as_str().unwrap_or("");
                        if keys.iter().any(|k| k == touched) {
                            yield project(&payload["context"], &keys, payload["name"].as_str());
                        }
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        dedup_stream(raw)
    }

    /// Raw events of a given type.
    pub fn event(&self, kind: impl Into<String>) -> impl Stream<Item = GraphEvent> + Send {
        let kind = kind.into();
        BroadcastStream::new(self.flow.events().subscribe())
            .filter_map(move |item| {
                let kind = kind.clone();
                async move {
                    let ev = ok_event(item)?;
                    (ev.kind == kind).then_some(ev)
                }
            })
    }

    /// Resolve with the first item of `stream` satisfying `predicate`.
    pub async fn until<S, T, P>(mut stream: S, predicate: P) -> Option<T>
    where
        S: Stream<Item = T> + Send + Unpin,
        P: Fn(&T) -> bool,
    {
        while let Some(item) = stream.next().await {
            if predicate(&item) {
                return Some(item);
            }
        }
        None
    }

    /// Gather one of each event type in `types`, then invoke `correlation`;
    /// resolves on success, times out otherwise.
    pub async fn wait_for_correlated_events(
        &self,
        types: Vec<String>,
        timeout_ms: u64,
        correlation: impl Fn(&[GraphEvent]) -> bool + Send + Sync + 'static,
    ) -> crate::error::Result<Vec<GraphEvent>> {
        self.flow
            .events()
            .wait_for(
                "__observer__",
                &types,
                timeout_ms,
                &crate::node::WaitStrategy::Correlate(Arc::new(correlation)),
            )
            .await
    }

    fn state_change_stream(
        &self,
        matches: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> impl Stream<Item = Value> + Send {
        let stream = BroadcastStream::new(self.flow.events().subscribe()).filter_map(move |item| {
            let matches = &matches;
            let result = ok_event(item).and_then(|ev| {
                if ev.kind != well_known::NODE_STATE_CHANGED {
                    return None;
                }
                let payload = ev.payload?;
                matches(&payload).then(|| payload["context"].clone())
            });
            async move { result }
        });
        dedup_stream(stream)
    }
}

fn ok_event(item: Result<GraphEvent, BroadcastStreamRecvError>) -> Option<GraphEvent> {
    item.ok()
}

fn project(context: &Value, keys: &[String], name: Option<&str>) -> Value {
    let mut obj = serde_json::Map::new();
    for key in keys {
        if let Some(v) = context.get(key) {
            obj.insert(key.clone(), v.clone());
        }
    }
    if let Some(name) = name {
        obj.insert("name".to_string(), Value::String(name.to_string()));
    }
    Value::Object(obj)
}

fn dedup_stream<S>(stream: S) -> impl Stream<Item = Value> + Send
where
    S: Stream<Item = Value> + Send,
{
    dedup_stream_by(stream, |v| v.clone())
}

/// Distinct-until-changed over a derived key, emitting the original item.
/// Used by `state()` so a `properties` filter can restrict which changes
/// count without discarding the rest of the snapshot from the emitted value.
fn dedup_stream_by<S, F>(stream: S, mut key_of: F) -> impl Stream<Item = Value> + Send
where
    S: Stream<Item = Value> + Send,
    F: FnMut(&Value) -> Value + Send + 'static,
{
    stream.scan(None::<Value>, move |last, item| {
        let key = key_of(&item);
        let emit = last.as_ref() != Some(&key);
        *last = Some(key);
        futures::future::ready(Some(if emit { Some(item) } else { None }))
    })
    .filter_map(futures::future::ready)
}

fn debounce_stream<S>(stream: S, debounce: Option<Duration>) -> impl Stream<Item = Value> + Send
where
    S: Stream<Item = Value> + Send + 'static,
{
    // Without a debounce window, pass every emission through unchanged.
    // With one, collapse bursts by only emitting once no further item
    // arrives within the window (last-value-wins), implemented with
    // `tokio_stream`'s timeout-based chunking rather than a custom timer.
    match debounce {
        None => futures::stream::StreamExt::boxed(stream),
        Some(window) => futures::stream::StreamExt::boxed(
            tokio_stream::StreamExt::chunks_timeout(stream, usize::MAX, window)
                .filter_map(|chunk| async move { chunk.into_iter().last() }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PermissiveSchema;
    use crate::flow::GraphDefinition;
    use crate::node::{closure, NodeConfig};
    use serde_json::json;

    #[tokio::test]
    async fn property_stream_emits_initial_then_updates() {
        let node = NodeConfig::new(
            "inc",
            closure(|ctx, _| {
                Box::pin(async move {
                    let v = ctx.get("value").and_then(|v| v.as_i64()).unwrap_or(0);
                    ctx.set("value", json!(v + 1));
                    Ok(())
                })
            }),
        );
        let def = GraphDefinition::new("obs", Arc::new(PermissiveSchema), json!({"value": 0}))
            .with_nodes(vec![node]);
        let flow = GraphFlow::new(def).unwrap();
        let observer = Observer::new(flow.clone());
        let mut stream = Box::pin(observer.property(vec!["value".to_string()]));
        let initial = stream.next().await.unwrap();
        assert_eq!(initial["value"], json!(0));
        flow.execute("inc", None, None).await.unwrap();
        let updated = stream.next().await.unwrap();
        assert_eq!(updated["value"], json!(1));
    }

    #[tokio::test]
    async fn state_stream_respects_properties_filter() {
        let node = NodeConfig::new(
            "touch",
            closure(|ctx, _| {
                Box::pin(async move {
                    ctx.set("watched", json!(1));
                    ctx.set("ignored", json!(99));
                    Ok(())
                })
            }),
        );
        let def = GraphDefinition::new(
            "filtered",
            Arc::new(PermissiveSchema),
            json!({"watched": 0, "ignored": 0}),
        )
        .with_nodes(vec![node]);
        let flow = GraphFlow::new(def).unwrap();
        let observer = Observer::new(flow.clone());
        let options = StateOptions {
            properties: vec!["watched".to_string()],
            ..Default::default()
        };
        let mut stream = Box::pin(observer.state(options));
        let initial = stream.next().await.unwrap();
        assert_eq!(initial["watched"], json!(0));
        flow.execute("touch", None, None).await.unwrap();
        let updated = stream.next().await.unwrap();
        assert_eq!(updated["watched"], json!(1));
        assert_eq!(updated["ignored"], json!(99));
    }

    #[tokio::test]
    async fn state_stream_letter_mode_replays_a_string_property() {
        let node = NodeConfig::new(
            "greet",
            closure(|ctx, _| {
                Box::pin(async move {
                    ctx.set("message", json!("hi"));
                    Ok(())
                })
            }),
        );
        let def = GraphDefinition::new("typewriter", Arc::new(PermissiveSchema), json!({"message": ""}))
            .with_nodes(vec![node]);
        let flow = GraphFlow::new(def).unwrap();
        let observer = Observer::new(flow.clone());
        let letters = Arc::new(tokio::sync::Mutex::new(Vec::<char>::new()));
        let completed = Arc::new(tokio::sync::Mutex::new(false));
        let l2 = letters.clone();
        let c2 = completed.clone();
        let options = StateOptions {
            stream: Some(LetterStream {
                property: "message".to_string(),
                interval: Duration::from_millis(1),
                on_letter: Arc::new(move |_prop, ch| {
                    let l3 = l2.clone();
                    tokio::spawn(async move { l3.lock().await.push(ch) });
                }),
                on_complete: Arc::new(move |_prop| {
                    let c3 = c2.clone();
                    tokio::spawn(async move { *c3.lock().await = true });
                }),
            }),
            ..Default::default()
        };
        let mut stream = Box::pin(observer.state(options));
        let _initial = stream.next().await.unwrap();
        flow.execute("greet", None, None).await.unwrap();
        let _updated = stream.next().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(letters.lock().await.as_slice(), &['h', 'i']);
        assert!(*completed.lock().await);
    }

    #[tokio::test]
    async fn until_resolves_on_first_match() {
        let node = NodeConfig::new(
            "inc",
            closure(|ctx, _| {
                Box::pin(async move {
                    ctx.set("value", json!(99));
                    Ok(())
                })
            }),
        );
        let def = GraphDefinition::new("until", Arc::new(PermissiveSchema), json!({"value": 0}))
            .with_nodes(vec![node]);
        let flow = GraphFlow::new(def).unwrap();
        let observer = Observer::new(flow.clone());
        let stream = Box::pin(observer.node("inc"));
        let wait = tokio::spawn(async move {
            Observer::until(stream, |ctx: &Value| ctx["value"] == json!(99)).await
        });
        flow.execute("inc", None, None).await.unwrap();
        let found = wait.await.unwrap();
        assert!(found.is_some());
    }
}
