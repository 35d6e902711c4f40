//! Structural and semantic validation of workflow graphs.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use flowforge_core::{NodeType, RegistryLookup, WorkflowGraph, WorkflowNode};

use crate::order::topological_order;

/// One validation finding, error or warning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Node the issue concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Config field the issue concerns, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Issue {
    fn graph(message: impl Into<String>) -> Self {
        Self {
            node_id: None,
            field: None,
            message: message.into(),
        }
    }

    fn node(node_id: &str, message: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.to_string()),
            field: None,
            message: message.into(),
        }
    }

    fn field(node_id: &str, field: &str, message: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.to_string()),
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

/// Outcome of validating one graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    /// Stable execution order; present only when the graph is acyclic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_order: Option<Vec<String>>,
}

impl ValidationReport {
    /// Error messages flattened for error reporting.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|i| i.message.clone()).collect()
    }
}

/// Graph validator. Checks are applied independently and accumulate; the
/// validator never short-circuits on the first problem.
pub struct Validator<'a> {
    registries: &'a dyn RegistryLookup,
}

impl<'a> Validator<'a> {
    /// Creates a validator over the injected plugin catalogs.
    pub fn new(registries: &'a dyn RegistryLookup) -> Self {
        Self { registries }
    }

    pub fn validate(&self, graph: &WorkflowGraph) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.check_structure(graph, &mut errors);
        if graph.count_of(NodeType::Dataset) > 1 {
            // Each execution path expects a single data source; a second
            // DATASET load replaces the first in the pipeline state.
            warnings.push(Issue::graph(
                "multiple DATASET nodes; each load replaces the previous data",
            ));
        }
        self.check_orphans(graph, &mut errors);
        self.check_connections(graph, &mut errors, &mut warnings);
        for node in &graph.nodes {
            self.check_node_config(node, &mut errors, &mut warnings);
        }

        let execution_order = if let Some(cycle_node) = find_cycle(graph) {
            errors.push(Issue::node(
                &cycle_node,
                format!("graph contains a cycle through node '{}'", cycle_node),
            ));
            None
        } else {
            Some(topological_order(graph))
        };

        let valid = errors.is_empty();
        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            errors = errors.len(),
            warnings = warnings.len(),
            valid,
            "Graph validated"
        );

        ValidationReport {
            valid,
            errors,
            warnings,
            execution_order,
        }
    }

    fn check_structure(&self, graph: &WorkflowGraph, errors: &mut Vec<Issue>) {
        if graph.nodes.is_empty() {
            errors.push(Issue::graph("workflow must contain at least one node"));
        }
        if graph.count_of(NodeType::Dataset) == 0 {
            errors.push(Issue::graph("workflow must contain a DATASET node"));
        }
        if graph.count_of(NodeType::Model) == 0 {
            errors.push(Issue::graph("workflow must contain a MODEL node"));
        }

        let mut seen = HashSet::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            if !seen.insert(node.id.as_str()) {
                errors.push(Issue::node(&node.id, format!("duplicate node id '{}'", node.id)));
            }
        }

        for edge in &graph.edges {
            if graph.node(&edge.source).is_none() {
                errors.push(Issue::graph(format!(
                    "edge references unknown source node '{}'",
                    edge.source
                )));
            }
            if graph.node(&edge.target).is_none() {
                errors.push(Issue::graph(format!(
                    "edge references unknown target node '{}'",
                    edge.target
                )));
            }
        }
    }

    fn check_orphans(&self, graph: &WorkflowGraph, errors: &mut Vec<Issue>) {
        for node in &graph.nodes {
            // Unknown nodes are warned about and skipped at execution time;
            // they take no part in connectivity rules.
            if matches!(node.node_type, NodeType::Dataset | NodeType::Unknown) {
                continue;
            }
            let connected = graph
                .edges
                .iter()
                .any(|e| e.source == node.id || e.target == node.id);
            if !connected {
                errors.push(Issue::node(
                    &node.id,
                    format!("{} node '{}' is not connected to the workflow", node.node_type, node.id),
                ));
            }
        }
    }

    fn check_connections(
        &self,
        graph: &WorkflowGraph,
        errors: &mut Vec<Issue>,
        warnings: &mut Vec<Issue>,
    ) {
        for node in &graph.nodes {
            if node.node_type == NodeType::Unknown {
                continue;
            }
            let upstream = graph.upstream_of(&node.id);
            let allowed = node.node_type.allowed_upstream();

            for source_id in &upstream {
                let Some(source) = graph.node(source_id) else {
                    // Unknown endpoint already reported by the structure check.
                    continue;
                };
                if source.node_type == NodeType::Unknown {
                    continue;
                }
                if !allowed.contains(&source.node_type) {
                    errors.push(Issue::node(
                        &node.id,
                        format!(
                            "{} node '{}' cannot receive input from {} node '{}'",
                            node.node_type, node.id, source.node_type, source.id
                        ),
                    ));
                }
            }

            if node.node_type.requires_upstream() && upstream.is_empty() {
                errors.push(Issue::node(
                    &node.id,
                    format!("{} node '{}' requires an input connection", node.node_type, node.id),
                ));
            }

            if node.node_type.single_upstream_expected() && upstream.len() > 1 {
                warnings.push(Issue::node(
                    &node.id,
                    format!(
                        "{} node '{}' has {} inputs; only the first ('{}') is used",
                        node.node_type,
                        node.id,
                        upstream.len(),
                        upstream[0]
                    ),
                ));
            }
        }
    }

    fn check_node_config(
        &self,
        node: &WorkflowNode,
        errors: &mut Vec<Issue>,
        warnings: &mut Vec<Issue>,
    ) {
        match node.node_type {
            NodeType::Dataset => {
                match node.config_str("dataset") {
                    Some(reference) if !reference.trim().is_empty() => {}
                    _ => errors.push(Issue::field(&node.id, "dataset", "a dataset must be selected")),
                }
                let problem_type = node.config_str("problem_type").unwrap_or("classification");
                match problem_type.parse::<flowforge_core::ProblemType>() {
                    Ok(_) => {
                        // Both supported problem types are supervised.
                        if node.config_str("target_column").map_or(true, str::is_empty) {
                            errors.push(Issue::field(
                                &node.id,
                                "target_column",
                                format!("{} requires a target column", problem_type),
                            ));
                        }
                    }
                    Err(message) => {
                        errors.push(Issue::field(&node.id, "problem_type", message));
                    }
                }
            }
            NodeType::Preprocess => {
                for slug in operation_slugs(node) {
                    if !self.registries.has_operation(&slug) {
                        errors.push(Issue::field(
                            &node.id,
                            "operations",
                            format!("unknown preprocessing operation '{}'", slug),
                        ));
                    }
                }
            }
            NodeType::Split => match node.config_f64("test_size") {
                Some(v) if (0.1..=0.5).contains(&v) => {}
                Some(v) => errors.push(Issue::field(
                    &node.id,
                    "test_size",
                    format!("test_size must be between 0.1 and 0.5, got {}", v),
                )),
                None => errors.push(Issue::field(&node.id, "test_size", "test_size is required")),
            },
            NodeType::Model => match node.config_str("algorithm") {
                Some(slug) if self.registries.has_algorithm(slug) => {}
                Some(slug) => errors.push(Issue::field(
                    &node.id,
                    "algorithm",
                    format!("unknown algorithm '{}'", slug),
                )),
                None => errors.push(Issue::field(&node.id, "algorithm", "an algorithm must be selected")),
            },
            NodeType::Evaluate => {
                if node.config_str_list("metrics").is_empty() {
                    errors.push(Issue::field(
                        &node.id,
                        "metrics",
                        "at least one metric must be selected",
                    ));
                }
            }
            NodeType::Visualize => {
                if node.config_str_list("plots").is_empty() {
                    warnings.push(Issue::field(
                        &node.id,
                        "plots",
                        "no plots selected; the node will produce no output",
                    ));
                }
            }
            NodeType::Save => {}
            NodeType::Unknown => {
                warnings.push(Issue::node(
                    &node.id,
                    format!("node '{}' has an unrecognized type and will be skipped", node.id),
                ));
            }
        }
    }
}

/// Preprocessing steps may be plain slugs or `{slug, params}` objects.
fn operation_slugs(node: &WorkflowNode) -> Vec<String> {
    let Some(serde_json::Value::Array(items)) = node.config_value("operations") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => {
                map.get("slug").and_then(|v| v.as_str()).map(str::to_string)
            }
            _ => None,
        })
        .collect()
}

/// Depth-first cycle detection with an explicit recursion stack. Returns a
/// node on a cycle, or None when the graph is acyclic.
fn find_cycle(graph: &WorkflowGraph) -> Option<String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &graph.edges {
        if ids.contains(edge.source.as_str()) && ids.contains(edge.target.as_str()) {
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_stack: HashSet<&str> = HashSet::new();

    fn visit<'g>(
        id: &'g str,
        adjacency: &HashMap<&'g str, Vec<&'g str>>,
        visited: &mut HashSet<&'g str>,
        in_stack: &mut HashSet<&'g str>,
    ) -> Option<String> {
        visited.insert(id);
        in_stack.insert(id);
        if let Some(neighbors) = adjacency.get(id) {
            for &neighbor in neighbors {
                if in_stack.contains(neighbor) {
                    // Back-edge into the current stack.
                    return Some(neighbor.to_string());
                }
                if !visited.contains(neighbor) {
                    if let Some(found) = visit(neighbor, adjacency, visited, in_stack) {
                        return Some(found);
                    }
                }
            }
        }
        in_stack.remove(id);
        None
    }

    for node in &graph.nodes {
        if !visited.contains(node.id.as_str()) {
            if let Some(found) = visit(node.id.as_str(), &adjacency, &mut visited, &mut in_stack) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_core::{WorkflowEdge, WorkflowNode};
    use serde_json::json;

    struct StubCatalog;

    impl RegistryLookup for StubCatalog {
        fn has_algorithm(&self, slug: &str) -> bool {
            matches!(slug, "logistic_regression" | "linear_regression")
        }
        fn has_operation(&self, slug: &str) -> bool {
            matches!(slug, "impute_mean" | "standard_scale")
        }
        fn has_metric(&self, key: &str) -> bool {
            matches!(key, "accuracy" | "f1")
        }
        fn has_plot(&self, key: &str) -> bool {
            key == "confusion_matrix"
        }
    }

    fn dataset_node(id: &str) -> WorkflowNode {
        WorkflowNode::new(id, NodeType::Dataset)
            .with_config("dataset", json!("iris"))
            .with_config("problem_type", json!("classification"))
            .with_config("target_column", json!("species"))
    }

    fn model_node(id: &str) -> WorkflowNode {
        WorkflowNode::new(id, NodeType::Model).with_config("algorithm", json!("logistic_regression"))
    }

    fn validate(graph: &WorkflowGraph) -> ValidationReport {
        Validator::new(&StubCatalog).validate(graph)
    }

    #[test]
    fn minimal_pipeline_is_valid() {
        let graph = WorkflowGraph::new(
            vec![dataset_node("ds"), model_node("ml")],
            vec![WorkflowEdge::new("ds", "ml")],
        );
        let report = validate(&graph);
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.execution_order, Some(vec!["ds".into(), "ml".into()]));
    }

    #[test]
    fn empty_graph_accumulates_all_structure_errors() {
        let report = validate(&WorkflowGraph::new(vec![], vec![]));
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn missing_target_column_is_exactly_one_error_on_that_field() {
        let graph = WorkflowGraph::new(
            vec![
                WorkflowNode::new("ds", NodeType::Dataset)
                    .with_config("dataset", json!("iris"))
                    .with_config("problem_type", json!("classification")),
                model_node("ml"),
            ],
            vec![WorkflowEdge::new("ds", "ml")],
        );
        let report = validate(&graph);
        let target_errors: Vec<_> = report
            .errors
            .iter()
            .filter(|i| i.field.as_deref() == Some("target_column"))
            .collect();
        assert_eq!(target_errors.len(), 1);
        assert_eq!(target_errors[0].node_id.as_deref(), Some("ds"));
    }

    #[test]
    fn orphan_non_dataset_node_is_an_error() {
        let graph = WorkflowGraph::new(
            vec![dataset_node("ds"), model_node("ml"), WorkflowNode::new("ev", NodeType::Evaluate).with_config("metrics", json!(["accuracy"]))],
            vec![WorkflowEdge::new("ds", "ml")],
        );
        let report = validate(&graph);
        assert!(report
            .errors
            .iter()
            .any(|i| i.node_id.as_deref() == Some("ev") && i.message.contains("not connected")));
    }

    #[test]
    fn dataset_rejects_upstream_edges() {
        let graph = WorkflowGraph::new(
            vec![dataset_node("ds"), model_node("ml")],
            vec![WorkflowEdge::new("ds", "ml"), WorkflowEdge::new("ml", "ds")],
        );
        let report = validate(&graph);
        assert!(!report.valid);
        assert!(report
            .errors
            .iter()
            .any(|i| i.message.contains("cannot receive input")));
    }

    #[test]
    fn evaluate_with_two_upstreams_is_one_warning_not_error() {
        let graph = WorkflowGraph::new(
            vec![
                dataset_node("ds"),
                model_node("m1"),
                model_node("m2"),
                WorkflowNode::new("ev", NodeType::Evaluate).with_config("metrics", json!(["accuracy"])),
            ],
            vec![
                WorkflowEdge::new("ds", "m1"),
                WorkflowEdge::new("ds", "m2"),
                WorkflowEdge::new("m1", "ev"),
                WorkflowEdge::new("m2", "ev"),
            ],
        );
        let report = validate(&graph);
        assert!(report.valid, "errors: {:?}", report.errors);
        let multi_input: Vec<_> = report
            .warnings
            .iter()
            .filter(|i| i.node_id.as_deref() == Some("ev"))
            .collect();
        assert_eq!(multi_input.len(), 1);
        assert!(multi_input[0].message.contains("'m1'"));
    }

    #[test]
    fn cycle_is_rejected_without_execution_order() {
        let graph = WorkflowGraph::new(
            vec![
                dataset_node("ds"),
                WorkflowNode::new("p1", NodeType::Preprocess),
                WorkflowNode::new("p2", NodeType::Preprocess),
                model_node("ml"),
            ],
            vec![
                WorkflowEdge::new("ds", "p1"),
                WorkflowEdge::new("p1", "p2"),
                WorkflowEdge::new("p2", "p1"),
                WorkflowEdge::new("p2", "ml"),
            ],
        );
        let report = validate(&graph);
        assert!(!report.valid);
        assert!(report.execution_order.is_none());
        assert!(report.errors.iter().any(|i| i.message.contains("cycle")));
    }

    #[test]
    fn unknown_preprocess_slug_is_a_config_error() {
        let graph = WorkflowGraph::new(
            vec![
                dataset_node("ds"),
                WorkflowNode::new("pp", NodeType::Preprocess)
                    .with_config("operations", json!(["impute_mean", "quantum_fold"])),
                model_node("ml"),
            ],
            vec![WorkflowEdge::new("ds", "pp"), WorkflowEdge::new("pp", "ml")],
        );
        let report = validate(&graph);
        assert!(report
            .errors
            .iter()
            .any(|i| i.message.contains("quantum_fold")));
        // The known slug produced no issue.
        assert!(!report.errors.iter().any(|i| i.message.contains("impute_mean")));
    }

    #[test]
    fn split_test_size_bounds() {
        for (value, ok) in [(0.1, true), (0.5, true), (0.05, false), (0.9, false)] {
            let graph = WorkflowGraph::new(
                vec![
                    dataset_node("ds"),
                    WorkflowNode::new("sp", NodeType::Split).with_config("test_size", json!(value)),
                    model_node("ml"),
                ],
                vec![WorkflowEdge::new("ds", "sp"), WorkflowEdge::new("sp", "ml")],
            );
            let report = validate(&graph);
            assert_eq!(report.valid, ok, "test_size={}", value);
        }
    }

    #[test]
    fn visualize_without_plots_is_a_warning_only() {
        let graph = WorkflowGraph::new(
            vec![
                dataset_node("ds"),
                model_node("ml"),
                WorkflowNode::new("vz", NodeType::Visualize),
            ],
            vec![WorkflowEdge::new("ds", "ml"), WorkflowEdge::new("ml", "vz")],
        );
        let report = validate(&graph);
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].field.as_deref(), Some("plots"));
    }

    #[test]
    fn unknown_model_algorithm_is_an_error() {
        let graph = WorkflowGraph::new(
            vec![
                dataset_node("ds"),
                WorkflowNode::new("ml", NodeType::Model).with_config("algorithm", json!("skynet")),
            ],
            vec![WorkflowEdge::new("ds", "ml")],
        );
        let report = validate(&graph);
        assert!(report.errors.iter().any(|i| i.message.contains("skynet")));
    }
}
