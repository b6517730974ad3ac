use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use huap_trace::TraceService;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::graph::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Error,
    Cancelled,
}

pub struct GraphRun {
    pub outcome: RunOutcome,
    pub state: Map<String, Value>,
    pub error: Option<String>,
}

/// Drives a [`Graph`] from a start node, threading trace spans around every
/// node visit.
pub struct GraphRunner<'a> {
    graph: &'a Graph,
    tracer: Option<&'a mut TraceService>,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> GraphRunner<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self { graph, tracer: None, cancel: None }
    }

    pub fn with_tracer(mut self, tracer: &'a mut TraceService) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Runs the graph to completion. Never returns an `Err` — failures are
    /// represented in [`GraphRun::outcome`]/`error` so a failed run still
    /// produces a complete trace file.
    pub async fn run(&mut self, start_node: &str, initial_state: Map<String, Value>) -> GraphRun {
        if self.graph.node(start_node).is_none() {
            let message = format!("start node {start_node:?} not found in graph");
            if let Some(tracer) = self.tracer.as_deref_mut() {
                tracer.error(&message, None);
            }
            return GraphRun { outcome: RunOutcome::Error, state: initial_state, error: Some(message) };
        }

        let mut state = initial_state;
        let mut frontier: VecDeque<String> = VecDeque::from([start_node.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(node_name) = frontier.pop_front() {
            if self.is_cancelled() {
                let message = "run cancelled".to_string();
                if let Some(tracer) = self.tracer.as_deref_mut() {
                    tracer.error(&message, Some(&node_name));
                }
                return GraphRun { outcome: RunOutcome::Cancelled, state, error: Some(message) };
            }

            if visited.contains(&node_name) {
                tracing::warn!(node = %node_name, "node already visited, skipping (cycle guard)");
                continue;
            }
            visited.insert(node_name.clone());

            let Some(node) = self.graph.node(&node_name) else {
                tracing::warn!(node = %node_name, "node not found, skipping");
                continue;
            };

            if let Some(tracer) = self.tracer.as_deref_mut() {
                tracer.node_enter(&node_name, Some(&Value::Object(state.clone())));
            }

            let started = Instant::now();
            let result = node.call(state.clone()).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(update) => {
                    state.extend(update.clone());
                    if let Some(tracer) = self.tracer.as_deref_mut() {
                        tracer.node_exit(&node_name, Some(&Value::Object(update)), duration_ms);
                    }
                    for next in self.graph.next_nodes(&node_name, &state) {
                        frontier.push_back(next);
                    }
                }
                Err(message) => {
                    if let Some(tracer) = self.tracer.as_deref_mut() {
                        tracer.node_exit(&node_name, None, duration_ms);
                        tracer.error(&message, Some(&node_name));
                    }
                    return GraphRun { outcome: RunOutcome::Error, state, error: Some(message) };
                }
            }
        }

        GraphRun { outcome: RunOutcome::Success, state, error: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};
    use huap_trace::{TraceService, TraceServiceConfig};
    use serde_json::json;
    use std::sync::Arc;

    fn service(dir: &std::path::Path) -> TraceService {
        TraceService::new(TraceServiceConfig { output_dir: dir.to_path_buf(), ..TraceServiceConfig::default() }).unwrap()
    }

    #[tokio::test]
    async fn hello_graph_runs_start_greet_end() {
        let mut graph = Graph::new();
        graph.add_node(Node::new(
            "start",
            Arc::new(|mut state: Map<String, Value>| async move {
                let message = state.remove("message").unwrap_or(json!(""));
                let mut update = Map::new();
                update.insert("echoed".to_string(), message);
                Ok(update)
            }),
        ));
        graph.add_node(Node::new(
            "greet",
            Arc::new(|state: Map<String, Value>| async move {
                let echoed = state.get("echoed").and_then(Value::as_str).unwrap_or("");
                let mut update = Map::new();
                update.insert("greeting".to_string(), json!(format!("Hello, {echoed}!")));
                Ok(update)
            }),
        ));
        graph.add_node(Node::new("end", Arc::new(|_state: Map<String, Value>| async move {
            let mut update = Map::new();
            update.insert("status".to_string(), json!("complete"));
            Ok(update)
        })));
        graph.add_edge(Edge::new("start", Some("greet".to_string()), None));
        graph.add_edge(Edge::new("greet", Some("end".to_string()), None));

        let dir = tempfile::tempdir().unwrap();
        let mut tracer = service(dir.path());
        let trace_path = dir.path().join("hello.trace.jsonl");
        tracer.start_run(None, Some("hello"), None, Some(json!({"message": "hi"})), None, None, Some(&trace_path)).unwrap();

        let mut initial = Map::new();
        initial.insert("message".to_string(), json!("hi"));
        let run = GraphRunner::new(&graph).with_tracer(&mut tracer).run("start", initial).await;
        tracer.end_run("success", Some(Value::Object(run.state.clone())), None);

        assert_eq!(run.outcome, RunOutcome::Success);
        assert_eq!(run.state.get("greeting"), Some(&json!("Hello, hi!")));
        assert_eq!(run.state.get("status"), Some(&json!("complete")));
    }

    #[tokio::test]
    async fn cycle_guard_prevents_infinite_loop() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("a", Arc::new(|state: Map<String, Value>| async move { Ok(state) })));
        graph.add_edge(Edge::new("a", Some("a".to_string()), None));
        let run = GraphRunner::new(&graph).run("a", Map::new()).await;
        assert_eq!(run.outcome, RunOutcome::Success);
    }

    #[tokio::test]
    async fn node_failure_surfaces_as_error_outcome() {
        let mut graph = Graph::new();
        graph.add_node(Node::new(
            "boom",
            Arc::new(|_state: Map<String, Value>| async move { Err("kaboom".to_string()) }),
        ));
        let run = GraphRunner::new(&graph).run("boom", Map::new()).await;
        assert_eq!(run.outcome, RunOutcome::Error);
        assert_eq!(run.error.as_deref(), Some("kaboom"));
    }

    #[tokio::test]
    async fn zero_node_graph_start_missing_is_error() {
        let graph = Graph::new();
        let run = GraphRunner::new(&graph).run("nowhere", Map::new()).await;
        assert_eq!(run.outcome, RunOutcome::Error);
    }
}
