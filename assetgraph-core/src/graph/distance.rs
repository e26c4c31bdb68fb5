//! Distance Calculator
//!
//! Measures how many breadth-first layers of upstream and downstream nodes
//! surround a target, counting only nodes inside a selected item set.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::index::GraphIndex;
use super::node::Token;

/// Upstream and downstream layer counts around a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Distances {
    pub upstream: usize,
    pub downstream: usize,
}

impl Distances {
    pub fn new(upstream: usize, downstream: usize) -> Self {
        Self { upstream, downstream }
    }
}

impl From<Distances> for (usize, usize) {
    fn from(d: Distances) -> Self {
        (d.upstream, d.downstream)
    }
}

/// Compute the upstream/downstream depth of `target` within `selected`.
///
/// `selected` is the graph induced on the selected item set, so traversal
/// never leaves it. A target outside the set yields `(0, 0)`.
pub fn calculate_distances(selected: &GraphIndex, target: &str) -> Distances {
    if !selected.contains(target) {
        return Distances::default();
    }

    Distances {
        upstream: layer_count(selected, target, |g, t| g.upstream_of(t).collect()),
        downstream: layer_count(selected, target, |g, t| g.downstream_of(t).collect()),
    }
}

/// Count BFS layers reachable from `target`. Each direction keeps its own
/// visited set.
fn layer_count<'a, F>(selected: &'a GraphIndex, target: &'a str, neighbors: F) -> usize
where
    F: Fn(&'a GraphIndex, &str) -> Vec<&'a Token>,
{
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(target);
    let mut frontier: Vec<&str> = vec![target];
    let mut depth = 0;

    loop {
        let mut next = Vec::new();
        for &token in &frontier {
            for neighbor in neighbors(selected, token) {
                if visited.insert(neighbor.as_str()) {
                    next.push(neighbor.as_str());
                }
            }
        }

        if next.is_empty() {
            return depth;
        }
        depth += 1;
        frontier = next;
    }
}
