//! Graph Index
//!
//! The index owns every node of one computation together with its upstream
//! and downstream adjacency.
//!
//! # Algorithm
//!
//! Building runs in two passes:
//!
//! 1. Register every node under its token. Later duplicates replace the
//!    node record.
//! 2. For every declared upstream/downstream key, record the edge in both
//!    directions. Edges whose far end was never registered are dangling and
//!    are dropped.
//!
//! Registering all nodes first means edge validity does not depend on input
//! order.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::node::{NodeDescriptor, Token};
use crate::error::BuildError;

/// Adjacency-indexed dependency graph.
///
/// Immutable once built: anything that needs a different node set builds a
/// new index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphIndex {
    /// All nodes, keyed by token, in input order.
    nodes: IndexMap<Token, NodeDescriptor>,

    /// Token -> tokens it depends on.
    upstream: IndexMap<Token, IndexSet<Token>>,

    /// Token -> tokens that depend on it.
    downstream: IndexMap<Token, IndexSet<Token>>,
}

impl GraphIndex {
    /// Build an index from a flat node list.
    ///
    /// Never fails. Duplicate tokens keep the last node record while edges
    /// from every occurrence accumulate.
    pub fn build<I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = NodeDescriptor>,
    {
        let mut sources: Vec<NodeDescriptor> = Vec::new();
        let mut by_token: IndexMap<Token, NodeDescriptor> = IndexMap::new();

        for node in nodes {
            let token = node.token();
            if by_token.insert(token.clone(), node.clone()).is_some() {
                warn!(token = %token, "duplicate node token, keeping last record");
            }
            sources.push(node);
        }

        Self::link(by_token, &sources)
    }

    /// Build an index, rejecting duplicate tokens.
    pub fn build_strict<I>(nodes: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = NodeDescriptor>,
    {
        let mut by_token: IndexMap<Token, NodeDescriptor> = IndexMap::new();

        for node in nodes {
            let token = node.token();
            if by_token.contains_key(&token) {
                return Err(BuildError::DuplicateNode { token });
            }
            by_token.insert(token, node);
        }

        let sources: Vec<NodeDescriptor> = by_token.values().cloned().collect();
        Ok(Self::link(by_token, &sources))
    }

    /// Second pass: derive adjacency from the declared edges of `sources`.
    fn link(nodes: IndexMap<Token, NodeDescriptor>, sources: &[NodeDescriptor]) -> Self {
        let mut index = Self {
            upstream: nodes.keys().map(|t| (t.clone(), IndexSet::new())).collect(),
            downstream: nodes.keys().map(|t| (t.clone(), IndexSet::new())).collect(),
            nodes,
        };

        let mut dangling = 0usize;
        for node in sources {
            let token = node.token();
            for key in &node.upstream {
                if !index.add_edge(&key.to_token(), &token) {
                    dangling += 1;
                }
            }
            for key in &node.downstream {
                if !index.add_edge(&token, &key.to_token()) {
                    dangling += 1;
                }
            }
        }

        if dangling > 0 {
            debug!(dangling, "ignored edges to unknown nodes");
        }
        debug!(
            nodes = index.len(),
            edges = index.edge_count(),
            "built graph index"
        );

        index
    }

    /// Add an edge: `dependent` depends on `dependency`.
    ///
    /// Returns false (and records nothing) if either end is not indexed.
    fn add_edge(&mut self, dependency: &str, dependent: &str) -> bool {
        if !self.nodes.contains_key(dependency) || !self.nodes.contains_key(dependent) {
            return false;
        }
        if let Some(set) = self.downstream.get_mut(dependency) {
            set.insert(dependent.to_string());
        }
        if let Some(set) = self.upstream.get_mut(dependent) {
            set.insert(dependency.to_string());
        }
        true
    }

    /// Build a new index containing only the nodes that satisfy `keep`.
    ///
    /// Edges to removed nodes disappear. Node order is preserved.
    pub fn subgraph<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&NodeDescriptor) -> bool,
    {
        let nodes: IndexMap<Token, NodeDescriptor> = self
            .nodes
            .iter()
            .filter(|(_, node)| keep(*node))
            .map(|(token, node)| (token.clone(), node.clone()))
            .collect();

        self.restrict(nodes)
    }

    /// Build a new index over `tokens`, keeping the existing adjacency
    /// between them.
    pub fn induced(&self, tokens: &IndexSet<Token>) -> Self {
        let nodes: IndexMap<Token, NodeDescriptor> = self
            .nodes
            .iter()
            .filter(|(token, _)| tokens.contains(*token))
            .map(|(token, node)| (token.clone(), node.clone()))
            .collect();

        self.restrict(nodes)
    }

    /// Build a new index with the same adjacency and replaced descriptors.
    ///
    /// `nodes` must hold exactly the tokens of `self`.
    pub(crate) fn with_descriptors(&self, nodes: IndexMap<Token, NodeDescriptor>) -> Self {
        debug_assert_eq!(nodes.len(), self.nodes.len());
        Self {
            nodes,
            upstream: self.upstream.clone(),
            downstream: self.downstream.clone(),
        }
    }

    fn restrict(&self, nodes: IndexMap<Token, NodeDescriptor>) -> Self {
        let filter = |adjacency: &IndexMap<Token, IndexSet<Token>>| {
            nodes
                .keys()
                .map(|token| {
                    let kept: IndexSet<Token> = adjacency
                        .get(token)
                        .map(|set| set.iter().filter(|t| nodes.contains_key(*t)).cloned().collect())
                        .unwrap_or_default();
                    (token.clone(), kept)
                })
                .collect::<IndexMap<Token, IndexSet<Token>>>()
        };

        let upstream = filter(&self.upstream);
        let downstream = filter(&self.downstream);
        Self {
            nodes,
            upstream,
            downstream,
        }
    }

    /// Get a node by token.
    pub fn node(&self, token: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(token)
    }

    /// Check whether a token is indexed.
    pub fn contains(&self, token: &str) -> bool {
        self.nodes.contains_key(token)
    }

    /// Direct dependencies of a node. Unknown tokens yield an empty iterator.
    pub fn upstream_of<'a>(&'a self, token: &str) -> impl Iterator<Item = &'a Token> + 'a {
        self.upstream.get(token).into_iter().flat_map(|set| set.iter())
    }

    /// Direct dependents of a node. Unknown tokens yield an empty iterator.
    pub fn downstream_of<'a>(&'a self, token: &str) -> impl Iterator<Item = &'a Token> + 'a {
        self.downstream.get(token).into_iter().flat_map(|set| set.iter())
    }

    /// All tokens in input order.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.nodes.keys()
    }

    /// All nodes in input order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.values()
    }

    /// Token/node pairs in input order.
    pub fn entries(&self) -> impl Iterator<Item = (&Token, &NodeDescriptor)> {
        self.nodes.iter()
    }

    /// Nodes with no dependencies.
    pub fn roots(&self) -> Vec<&Token> {
        self.tokens()
            .filter(|t| self.upstream_of(t).next().is_none())
            .collect()
    }

    /// Nodes with no dependents.
    pub fn leaves(&self) -> Vec<&Token> {
        self.tokens()
            .filter(|t| self.downstream_of(t).next().is_none())
            .collect()
    }

    /// Get the total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct directed edges.
    pub fn edge_count(&self) -> usize {
        self.downstream.values().map(IndexSet::len).sum()
    }

    /// Tokens reachable from `start` by following `step`, up to `depth` hops
    /// (`None` for unbounded). The start token is not included.
    pub(crate) fn reachable<'a, F, I>(&'a self, start: &str, depth: Option<usize>, step: F) -> HashSet<&'a str>
    where
        F: Fn(&'a Self, &str) -> I,
        I: Iterator<Item = &'a Token>,
    {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut frontier: Vec<&str> = match self.nodes.get_key_value(start) {
            Some((token, _)) => vec![token.as_str()],
            None => return visited,
        };
        let mut hops = 0usize;

        while !frontier.is_empty() && depth.map_or(true, |max| hops < max) {
            let mut next = Vec::new();
            for token in frontier {
                for neighbor in step(self, token) {
                    if neighbor != start && visited.insert(neighbor.as_str()) {
                        next.push(neighbor.as_str());
                    }
                }
            }
            frontier = next;
            hops += 1;
        }

        visited
    }
}
