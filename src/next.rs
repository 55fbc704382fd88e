//! Successor edges: the `Next` sum type that replaces a runtime
//! `next: string | {node, condition}[] | (ctx) => string[]` union with a
//! typed Rust enum, in the spirit of the teacher's `Command`/`GotoTarget`
//! dynamic-routing design.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A boolean gate evaluated against the live context.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A function computing the list of successor node names from the live
/// context.
pub type NextFn = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

/// One successor edge declaration.
#[derive(Clone)]
pub enum Next {
    /// Always traverse to the named node.
    Unconditional(String),
    /// Traverse to the named node only when the predicate holds against the
    /// context at the moment successors are resolved.
    Guarded(String, Predicate),
    /// Compute the list of successor names from the context. Each returned
    /// name is treated as unconditional.
    Computed(NextFn),
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Next::Unconditional(name) => f.debug_tuple("Unconditional").field(name).finish(),
            Next::Guarded(name, _) => f.debug_tuple("Guarded").field(name).field(&"<fn>").finish(),
            Next::Computed(_) => f.debug_tuple("Computed").field(&"<fn>").finish(),
        }
    }
}

impl Next {
    /// An unconditional successor.
    pub fn to(name: impl Into<String>) -> Self {
        Next::Unconditional(name.into())
    }

    /// A successor gated on a predicate over the context.
    pub fn when(name: impl Into<String>, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Next::Guarded(name.into(), Arc::new(predicate))
    }

    /// A dynamically computed list of successors.
    pub fn computed(f: impl Fn(&Value) -> Vec<String> + Send + Sync + 'static) -> Self {
        Next::Computed(Arc::new(f))
    }
}

/// Resolve a declared list of `Next` entries against the live context,
/// returning the names of surviving successors in declaration order.
///
/// A `Computed` entry may itself expand to several names; they are spliced
/// in at that entry's position, preserving overall declaration order.
pub fn resolve(entries: &[Next], context: &Value) -> Vec<String> {
    let mut out = Vec::new();
    for entry in entries {
        match entry {
            Next::Unconditional(name) => out.push(name.clone()),
            Next::Guarded(name, predicate) => {
                if predicate(context) {
                    out.push(name.clone());
                }
            }
            Next::Computed(f) => out.extend(f(context)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unconditional_always_survives() {
        let entries = vec![Next::to("a")];
        assert_eq!(resolve(&entries, &json!({})), vec!["a"]);
    }

    #[test]
    fn guard_filters_by_predicate() {
        let entries = vec![
            Next::when("low", |ctx| ctx["v"].as_i64().unwrap_or(0) < 10),
            Next::when("high", |ctx| ctx["v"].as_i64().unwrap_or(0) >= 10),
        ];
        assert_eq!(resolve(&entries, &json!({"v": 3})), vec!["low"]);
        assert_eq!(resolve(&entries, &json!({"v": 30})), vec!["high"]);
    }

    #[test]
    fn computed_expands_in_place() {
        let entries = vec![
            Next::to("first"),
            Next::computed(|_| vec!["mid1".to_string(), "mid2".to_string()]),
            Next::to("last"),
        ];
        assert_eq!(
            resolve(&entries, &json!({})),
            vec!["first", "mid1", "mid2", "last"]
        );
    }
}
