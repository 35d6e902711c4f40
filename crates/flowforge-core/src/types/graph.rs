//! Workflow graph representation.
//!
//! A workflow is a directed graph of typed processing steps. The graph is an
//! immutable description: validation and execution never mutate it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The type of processing step a node performs.
///
/// Serialized in SCREAMING_SNAKE_CASE to match the wire format of workflow
/// definitions. Node types not known to this engine deserialize as
/// [`NodeType::Unknown`] and are skipped at execution time rather than
/// rejecting the whole graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Dataset,
    Preprocess,
    Split,
    Model,
    Evaluate,
    Visualize,
    Save,
    Unknown,
}

impl From<String> for NodeType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "DATASET" => NodeType::Dataset,
            "PREPROCESS" => NodeType::Preprocess,
            "SPLIT" => NodeType::Split,
            "MODEL" => NodeType::Model,
            "EVALUATE" => NodeType::Evaluate,
            "VISUALIZE" => NodeType::Visualize,
            "SAVE" => NodeType::Save,
            _ => NodeType::Unknown,
        }
    }
}

impl From<NodeType> for String {
    fn from(value: NodeType) -> Self {
        value.to_string()
    }
}

impl NodeType {
    /// Node types permitted directly upstream of this one.
    pub fn allowed_upstream(&self) -> &'static [NodeType] {
        use NodeType::*;
        match self {
            Dataset => &[],
            Preprocess => &[Dataset, Preprocess],
            Split => &[Dataset, Preprocess],
            Model => &[Split, Dataset, Preprocess],
            Evaluate => &[Model],
            Visualize => &[Model, Evaluate],
            Save => &[Model],
            Unknown => &[],
        }
    }

    /// Whether the node type requires at least one upstream edge.
    pub fn requires_upstream(&self) -> bool {
        matches!(self, NodeType::Preprocess | NodeType::Split | NodeType::Model)
    }

    /// Whether more than one upstream edge is ambiguous for this type
    /// (only the first discovered upstream is used at execution time).
    pub fn single_upstream_expected(&self) -> bool {
        matches!(
            self,
            NodeType::Model | NodeType::Evaluate | NodeType::Visualize
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Dataset => "DATASET",
            NodeType::Preprocess => "PREPROCESS",
            NodeType::Split => "SPLIT",
            NodeType::Model => "MODEL",
            NodeType::Evaluate => "EVALUATE",
            NodeType::Visualize => "VISUALIZE",
            NodeType::Save => "SAVE",
            NodeType::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A single typed processing step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within the graph.
    pub id: String,
    /// The processing step this node performs.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Step configuration. Keys depend on the node type.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, serde_json::Value>,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            config: HashMap::new(),
        }
    }

    /// Sets a configuration value, consuming and returning the node.
    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(|v| v.as_f64())
    }

    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(|v| v.as_u64())
    }

    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(|v| v.as_bool())
    }

    /// Reads a configuration key as a list of strings, accepting both a JSON
    /// array of strings and a single string.
    pub fn config_str_list(&self, key: &str) -> Vec<String> {
        match self.config.get(key) {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

/// A directed dependency between two nodes. No weight, no label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub source: String,
    pub target: String,
}

impl WorkflowEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// The full node and edge set submitted for one execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Looks up a node by id.
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Source ids of edges pointing at `id`, in edge declaration order.
    pub fn upstream_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.target == id)
            .map(|e| e.source.as_str())
            .collect()
    }

    /// Target ids of edges leaving `id`, in edge declaration order.
    pub fn downstream_of(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Number of nodes of the given type.
    pub fn count_of(&self, node_type: NodeType) -> usize {
        self.nodes.iter().filter(|n| n.node_type == node_type).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_json_round_trip() {
        let graph = WorkflowGraph::new(
            vec![
                WorkflowNode::new("ds", NodeType::Dataset)
                    .with_config("dataset", serde_json::json!("iris")),
                WorkflowNode::new("mdl", NodeType::Model)
                    .with_config("algorithm", serde_json::json!("logistic_regression")),
            ],
            vec![WorkflowEdge::new("ds", "mdl")],
        );

        let json = graph.to_json().expect("serialize");
        let parsed = WorkflowGraph::from_json(&json).expect("parse");
        assert_eq!(parsed, graph);
    }

    #[test]
    fn node_type_uses_wire_names() {
        let json = r#"{"id":"a","type":"PREPROCESS"}"#;
        let node: WorkflowNode = serde_json::from_str(json).expect("parse node");
        assert_eq!(node.node_type, NodeType::Preprocess);
        assert!(node.config.is_empty());
    }

    #[test]
    fn foreign_node_type_parses_as_unknown() {
        let json = r#"{"id":"a","type":"QUANTUM_ANNEAL"}"#;
        let node: WorkflowNode = serde_json::from_str(json).expect("parse node");
        assert_eq!(node.node_type, NodeType::Unknown);
    }

    #[test]
    fn upstream_preserves_edge_order() {
        let graph = WorkflowGraph::new(
            vec![
                WorkflowNode::new("a", NodeType::Model),
                WorkflowNode::new("b", NodeType::Model),
                WorkflowNode::new("c", NodeType::Evaluate),
            ],
            vec![WorkflowEdge::new("b", "c"), WorkflowEdge::new("a", "c")],
        );
        assert_eq!(graph.upstream_of("c"), vec!["b", "a"]);
    }

    #[test]
    fn config_str_list_accepts_scalar_and_array() {
        let node = WorkflowNode::new("e", NodeType::Evaluate)
            .with_config("metrics", serde_json::json!(["accuracy", "f1"]));
        assert_eq!(node.config_str_list("metrics"), vec!["accuracy", "f1"]);

        let node = WorkflowNode::new("e", NodeType::Evaluate)
            .with_config("metrics", serde_json::json!("accuracy"));
        assert_eq!(node.config_str_list("metrics"), vec!["accuracy"]);
        assert!(node.config_str_list("missing").is_empty());
    }
}
