//! Stable topological ordering.

use std::collections::{HashMap, VecDeque};

use flowforge_core::WorkflowGraph;

/// Computes a topological order with Kahn's algorithm.
///
/// Nodes enter the ready queue in the order their in-degree first reaches
/// zero; ties are broken by original node array order. The order is
/// therefore reproducible for identical input. Must only be called on an
/// acyclic graph; on a cycle the returned order is truncated.
pub fn topological_order(graph: &WorkflowGraph) -> Vec<String> {
    let index_of: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree: HashMap<&str, usize> =
        graph.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        // Edges with unknown endpoints are a validation error; skip them
        // here so ordering stays total over the declared nodes.
        if !index_of.contains_key(edge.source.as_str())
            || !index_of.contains_key(edge.target.as_str())
        {
            continue;
        }
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        *in_degree.entry(edge.target.as_str()).or_insert(0) += 1;
    }

    // Seed in node array order so independent sources keep their declared
    // relative position.
    let mut queue: VecDeque<&str> = graph
        .nodes
        .iter()
        .filter(|n| in_degree[n.id.as_str()] == 0)
        .map(|n| n.id.as_str())
        .collect();

    let mut order = Vec::with_capacity(graph.nodes.len());
    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());

        let Some(neighbors) = adjacency.get(id) else {
            continue;
        };
        let mut released: Vec<&str> = Vec::new();
        for &neighbor in neighbors {
            let degree = in_degree
                .get_mut(neighbor)
                .expect("neighbor registered in in-degree map");
            *degree -= 1;
            if *degree == 0 {
                released.push(neighbor);
            }
        }
        // Nodes released by the same dispatch tie-break on array order.
        released.sort_by_key(|id| index_of[id]);
        queue.extend(released);
    }

    order
}
