//! Flow network centrality
//!
//! Degree centrality counts distinct direct trading partners. Betweenness
//! uses Brandes' algorithm on the directed, unweighted flow graph: a region
//! scores once for every shortest connecting path it lies strictly inside,
//! split evenly when several shortest paths exist.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::analytics::types::CentralityMetrics;
use crate::feeds::Flow;

/// Directed adjacency over region indices
struct FlowGraph<'a> {
    nodes: Vec<&'a str>,
    successors: Vec<Vec<usize>>,
}

impl<'a> FlowGraph<'a> {
    fn new(flows: &'a [Flow]) -> Self {
        let ids: BTreeSet<&str> = flows
            .iter()
            .flat_map(|f| [f.source.as_str(), f.target.as_str()])
            .collect();
        let nodes: Vec<&str> = ids.into_iter().collect();
        let index: BTreeMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nodes.len()];
        for flow in flows {
            if flow.source == flow.target {
                continue;
            }
            if let (Some(&s), Some(&t)) = (index.get(flow.source.as_str()), index.get(flow.target.as_str())) {
                edges[s].insert(t);
            }
        }

        Self {
            nodes,
            successors: edges.into_iter().map(|e| e.into_iter().collect()).collect(),
        }
    }
}

/// `(in_degree, out_degree)` per region: distinct direct neighbors
pub fn degree_centrality(flows: &[Flow]) -> BTreeMap<String, (usize, usize)> {
    let graph = FlowGraph::new(flows);
    let mut in_degree = vec![0usize; graph.nodes.len()];
    for targets in &graph.successors {
        for &t in targets {
            in_degree[t] += 1;
        }
    }

    graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, id)| (id.to_string(), (in_degree[i], graph.successors[i].len())))
        .collect()
}

/// Unnormalized shortest-path betweenness per region
pub fn betweenness_centrality(flows: &[Flow]) -> BTreeMap<String, f64> {
    let graph = FlowGraph::new(flows);
    let n = graph.nodes.len();
    let mut betweenness = vec![0.0; n];

    for source in 0..n {
        let mut stack = Vec::with_capacity(n);
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0; n];
        let mut distance: Vec<Option<usize>> = vec![None; n];

        sigma[source] = 1.0;
        distance[source] = Some(0);

        let mut queue = VecDeque::new();
        queue.push_back(source);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            let Some(d_v) = distance[v] else {
                continue;
            };
            for &w in &graph.successors[v] {
                if distance[w].is_none() {
                    distance[w] = Some(d_v + 1);
                    queue.push_back(w);
                }
                if distance[w] == Some(d_v + 1) {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != source {
                betweenness[w] += delta[w];
            }
        }
    }

    graph
        .nodes
        .iter()
        .zip(betweenness)
        .map(|(id, score)| (id.to_string(), score))
        .collect()
}

/// Degree and betweenness for every region appearing in `flows`
pub fn compute_centrality(flows: &[Flow]) -> BTreeMap<String, CentralityMetrics> {
    let betweenness = betweenness_centrality(flows);

    degree_centrality(flows)
        .into_iter()
        .map(|(id, (in_degree, out_degree))| {
            let score = betweenness.get(&id).copied().unwrap_or(0.0);
            (
                id,
                CentralityMetrics {
                    in_degree,
                    out_degree,
                    betweenness: score,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn flows(edges: &[(&str, &str)]) -> Vec<Flow> {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        edges.iter().map(|(s, t)| Flow::new(s, t, date, 1.0)).collect()
    }

    #[test]
    fn test_degree_counts_distinct_neighbors() {
        let degrees = degree_centrality(&flows(&[("a", "b"), ("a", "b"), ("a", "c"), ("c", "a")]));
        assert_eq!(degrees["a"], (1, 2));
        assert_eq!(degrees["b"], (1, 0));
        assert_eq!(degrees["c"], (1, 1));
    }

    #[test]
    fn test_chain_betweenness() {
        // a -> b -> c: only b is strictly inside a shortest path
        let scores = betweenness_centrality(&flows(&[("a", "b"), ("b", "c")]));
        assert!((scores["b"] - 1.0).abs() < f64::EPSILON);
        assert_eq!(scores["a"], 0.0);
        assert_eq!(scores["c"], 0.0);
    }

    #[test]
    fn test_parallel_paths_split_credit() {
        // a -> {b, c} -> d
        let scores = betweenness_centrality(&flows(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]));
        assert!((scores["b"] - 0.5).abs() < f64::EPSILON);
        assert!((scores["c"] - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_star_hub() {
        // every spoke trades both ways with the hub
        let scores = betweenness_centrality(&flows(&[
            ("x", "hub"),
            ("hub", "x"),
            ("y", "hub"),
            ("hub", "y"),
            ("z", "hub"),
            ("hub", "z"),
        ]));
        // 3 spokes, 6 ordered spoke pairs all routed through the hub
        assert!((scores["hub"] - 6.0).abs() < f64::EPSILON);
        assert_eq!(scores["x"], 0.0);
    }

    #[test]
    fn test_compute_centrality_merges_metrics() {
        let metrics = compute_centrality(&flows(&[("a", "b"), ("b", "c"), ("b", "b")]));
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics["b"].in_degree, 1);
        assert_eq!(metrics["b"].out_degree, 1);
        assert!((metrics["b"].betweenness - 1.0).abs() < f64::EPSILON);
        assert!(compute_centrality(&[]).is_empty());
    }
}
