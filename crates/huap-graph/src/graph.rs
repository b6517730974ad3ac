use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::condition::{Condition, ParseError};

pub type NodeOutput = Result<Map<String, Value>, String>;
pub type BoxedNodeFuture = Pin<Box<dyn Future<Output = NodeOutput> + Send>>;

/// A node implementation: an async function from state to a state update.
/// Closures over owned state avoid threading a lifetime through the trait
/// object — the executor clones state once per node visit.
pub trait NodeFn: Send + Sync {
    fn call(&self, state: Map<String, Value>) -> BoxedNodeFuture;
}

impl<F, Fut> NodeFn for F
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = NodeOutput> + Send + 'static,
{
    fn call(&self, state: Map<String, Value>) -> BoxedNodeFuture {
        Box::pin(self(state))
    }
}

pub struct Node {
    pub name: String,
    pub description: String,
    func: Arc<dyn NodeFn>,
}

impl Node {
    pub fn new(name: impl Into<String>, func: Arc<dyn NodeFn>) -> Self {
        Self { name: name.into(), description: String::new(), func }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn call(&self, state: Map<String, Value>) -> BoxedNodeFuture {
        self.func.call(state)
    }
}

/// An edge between two nodes. `target: None` denotes a terminal edge.
pub struct Edge {
    pub source: String,
    pub target: Option<String>,
    pub condition: Option<Condition>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: Option<String>, condition: Option<Condition>) -> Self {
        Self { source: source.into(), target, condition }
    }

    /// A missing condition always passes; a present one evaluates against
    /// state and treats parse/runtime failure as `false` (already baked into
    /// `Condition::eval`).
    pub fn passes(&self, state: &Map<String, Value>) -> bool {
        self.condition.as_ref().map(|c| c.eval(state)).unwrap_or(true)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("start node {0:?} not found in graph")]
    StartNodeNotFound(String),
    #[error("edge target {0:?} not found among nodes")]
    DanglingEdgeTarget(String),
    #[error("invalid edge condition: {0}")]
    BadCondition(#[from] ParseError),
    #[error("no node implementation registered for {0:?}")]
    UnregisteredNode(String),
}

/// A DAG of nodes and edges.
#[derive(Default)]
pub struct Graph {
    pub(crate) nodes: HashMap<String, Node>,
    pub(crate) edges: HashMap<String, Vec<Edge>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.name.clone(), node);
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.entry(edge.source.clone()).or_default().push(edge);
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn next_nodes(&self, current: &str, state: &Map<String, Value>) -> Vec<String> {
        self.edges
            .get(current)
            .into_iter()
            .flatten()
            .filter(|edge| edge.passes(state))
            .filter_map(|edge| edge.target.clone())
            .collect()
    }

    /// Checks edge targets reference known nodes; does not check reachability.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (source, edges) in &self.edges {
            if !self.nodes.contains_key(source) {
                errors.push(format!("edge source {source:?} not found in nodes"));
            }
            for edge in edges {
                if let Some(target) = &edge.target {
                    if !self.nodes.contains_key(target) {
                        errors.push(format!("edge target {target:?} not found in nodes"));
                    }
                }
            }
        }
        errors
    }
}

/// The YAML graph definition document loaded from a workflow file.
#[derive(Debug, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
}

#[derive(Debug, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub run: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct EdgeDef {
    pub from: String,
    pub to: Option<String>,
    pub condition: Option<String>,
}

/// Builds a [`Graph`] from a parsed definition, resolving each node's `run`
/// identifier against a statically-built registry rather than importing code
/// at runtime by dotted path.
pub fn build_graph(
    def: &GraphDefinition,
    registry: &HashMap<String, Arc<dyn NodeFn>>,
) -> Result<Graph, GraphError> {
    let mut graph = Graph::new();
    for node_def in &def.nodes {
        let func = registry
            .get(&node_def.run)
            .cloned()
            .ok_or_else(|| GraphError::UnregisteredNode(node_def.run.clone()))?;
        graph.add_node(Node::new(&node_def.name, func).with_description(node_def.description.clone()));
    }
    for edge_def in &def.edges {
        let condition = edge_def.condition.as_deref().map(Condition::parse).transpose()?;
        graph.add_edge(Edge::new(edge_def.from.clone(), edge_def.to.clone(), condition));
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn NodeFn> {
        Arc::new(|state: Map<String, Value>| async move { Ok(state) })
    }

    #[test]
    fn next_nodes_respects_condition() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("a", noop()));
        graph.add_node(Node::new("b", noop()));
        graph.add_edge(Edge::new("a", Some("b".to_string()), Some(Condition::parse("ready == true").unwrap())));

        let mut state = Map::new();
        assert!(graph.next_nodes("a", &state).is_empty());
        state.insert("ready".to_string(), Value::Bool(true));
        assert_eq!(graph.next_nodes("a", &state), vec!["b".to_string()]);
    }

    #[test]
    fn validate_flags_dangling_target() {
        let mut graph = Graph::new();
        graph.add_node(Node::new("a", noop()));
        graph.add_edge(Edge::new("a", Some("ghost".to_string()), None));
        assert_eq!(graph.validate().len(), 1);
    }

    #[test]
    fn build_graph_rejects_unregistered_node() {
        let def = GraphDefinition {
            nodes: vec![NodeDef { name: "a".into(), run: "missing_fn".into(), description: String::new() }],
            edges: vec![],
        };
        let registry = HashMap::new();
        assert!(matches!(build_graph(&def, &registry), Err(GraphError::UnregisteredNode(_))));
    }
}
