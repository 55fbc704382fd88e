//! Visualizer: static rendering of a graph's node/edge shape, with no
//! runtime behavior. Mirrors the three textual formats the reference
//! corpus's `visualization` module supports, since a headless engine still
//! needs a way to inspect graph shape without a GUI.

use crate::next::Next;
use crate::node::NodeConfig;
use std::fmt::Write as _;

/// Output format for [`visualize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizationFormat {
    Dot,
    Mermaid,
    Ascii,
}

/// Knobs for [`visualize`].
#[derive(Debug, Clone)]
pub struct VisualizationOptions {
    pub format: VisualizationFormat,
    pub title: Option<String>,
}

impl Default for VisualizationOptions {
    fn default() -> Self {
        VisualizationOptions {
            format: VisualizationFormat::Dot,
            title: None,
        }
    }
}

/// One edge in the static description: source node, target node, and a
/// humanized label for guarded/computed successors.
struct Edge {
    from: String,
    to: String,
    label: Option<&'static str>,
}

fn collect_edges(nodes: &[NodeConfig]) -> Vec<Edge> {
    let mut edges = Vec::new();
    for node in nodes {
        for next in &node.next {
            match next {
                Next::Unconditional(target) => edges.push(Edge {
                    from: node.name.clone(),
                    to: target.clone(),
                    label: None,
                }),
                Next::Guarded(target, _) => edges.push(Edge {
                    from: node.name.clone(),
                    to: target.clone(),
                    label: Some("guarded"),
                }),
                Next::Computed(_) => edges.push(Edge {
                    from: node.name.clone(),
                    to: "<computed>".to_string(),
                    label: Some("computed"),
                }),
            }
        }
        for event_name in &node.events {
            edges.push(Edge {
                from: format!("event:{event_name}"),
                to: node.name.clone(),
                label: Some("triggers"),
            });
        }
    }
    edges
}

/// Render a graph's static structure as a string in the requested format.
pub fn visualize(nodes: &[NodeConfig], options: &VisualizationOptions) -> String {
    let edges = collect_edges(nodes);
    match options.format {
        VisualizationFormat::Dot => render_dot(nodes, &edges, options),
        VisualizationFormat::Mermaid => render_mermaid(nodes, &edges, options),
        VisualizationFormat::Ascii => render_ascii(nodes, &edges),
    }
}

fn render_dot(nodes: &[NodeConfig], edges: &[Edge], options: &VisualizationOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {{");
    if let Some(title) = &options.title {
        let _ = writeln!(out, "  label=\"{title}\";");
    }
    for node in nodes {
        let _ = writeln!(out, "  \"{}\";", node.name);
    }
    for edge in edges {
        match edge.label {
            Some(label) => {
                let _ = writeln!(out, "  \"{}\" -> \"{}\" [label=\"{}\"];", edge.from, edge.to, label);
            }
            None => {
                let _ = writeln!(out, "  \"{}\" -> \"{}\";", edge.from, edge.to);
            }
        }
    }
    out.push_str("}\n");
    out
}

fn render_mermaid(nodes: &[NodeConfig], edges: &[Edge], options: &VisualizationOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "flowchart TD");
    if let Some(title) = &options.title {
        let _ = writeln!(out, "  %% {title}");
    }
    for node in nodes {
        let _ = writeln!(out, "  {}[{}]", node.name, node.name);
    }
    for edge in edges {
        match edge.label {
            Some(label) => {
                let _ = writeln!(out, "  {} -->|{}| {}", edge.from, label, edge.to);
            }
            None => {
                let _ = writeln!(out, "  {} --> {}", edge.from, edge.to);
            }
        }
    }
    out
}

fn render_ascii(nodes: &[NodeConfig], edges: &[Edge]) -> String {
    let mut out = String::new();
    for node in nodes {
        let _ = writeln!(out, "[{}]", node.name);
    }
    out.push('\n');
    for edge in edges {
        match edge.label {
            Some(label) => {
                let _ = writeln!(out, "{} --({})--> {}", edge.from, label, edge.to);
            }
            None => {
                let _ = writeln!(out, "{} --> {}", edge.from, edge.to);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::closure;
    use serde_json::json;

    fn sample_nodes() -> Vec<NodeConfig> {
        let a = NodeConfig::new(
            "a",
            closure(|_ctx, _| Box::pin(async move { Ok(()) })),
        )
        .with_next(vec![Next::to("b"), Next::when("c", |ctx| ctx["v"] == json!(1))]);
        let b = NodeConfig::new("b", closure(|_ctx, _| Box::pin(async move { Ok(()) })));
        let c = NodeConfig::new("c", closure(|_ctx, _| Box::pin(async move { Ok(()) })));
        vec![a, b, c]
    }

    #[test]
    fn dot_output_contains_all_nodes_and_edges() {
        let nodes = sample_nodes();
        let out = visualize(&nodes, &VisualizationOptions::default());
        assert!(out.contains("digraph"));
        assert!(out.contains("\"a\" -> \"b\""));
        assert!(out.contains("label=\"guarded\""));
    }

    #[test]
    fn mermaid_output_uses_flowchart_syntax() {
        let nodes = sample_nodes();
        let options = VisualizationOptions {
            format: VisualizationFormat::Mermaid,
            title: Some("demo".to_string()),
        };
        let out = visualize(&nodes, &options);
        assert!(out.starts_with("flowchart TD"));
        assert!(out.contains("a --> b"));
    }

    #[test]
    fn ascii_output_lists_every_node() {
        let nodes = sample_nodes();
        let options = VisualizationOptions {
            format: VisualizationFormat::Ascii,
            title: None,
        };
        let out = visualize(&nodes, &options);
        assert!(out.contains("[a]"));
        assert!(out.contains("[b]"));
        assert!(out.contains("[c]"));
    }
}
