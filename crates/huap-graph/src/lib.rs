//! DAG graph executor with a restricted edge-condition expression language.

mod condition;
mod graph;
mod runner;

pub use condition::{Condition, ParseError};
pub use graph::{build_graph, Edge, EdgeDef, Graph, GraphDefinition, GraphError, Node, NodeDef, NodeFn, NodeOutput};
pub use runner::{GraphRun, GraphRunner, RunOutcome};
