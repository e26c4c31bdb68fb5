//! Asset Dependency Graph
//!
//! This module turns the flat node list delivered by the node source into an
//! adjacency-indexed graph, and provides the operations that read it.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes are assets, identified by the token of their key
//! - Edges are dependencies: if B depends on A, there is an edge from A to B
//!
//! Cycles are tolerated. The graph is usually acyclic, but nothing here
//! relies on it.
//!
//! # Design Decisions
//!
//! 1. The index is rebuilt for every distinct node list rather than updated
//!    incrementally. Results derived from it can then be cached and shared
//!    without coordination.
//!
//! 2. The graph is indexed by token for O(1) lookups.
//!
//! 3. We maintain both upstream and downstream edges to enable efficient
//!    traversal in both directions.
//!
//! 4. Insertion-ordered maps keep every derived token list in input order.

mod annotations;
mod distance;
mod index;
mod node;

pub use annotations::{merge_annotations, Annotations};
pub use distance::{calculate_distances, Distances};
pub use index::GraphIndex;
pub use node::{
    AssetKey, MaterializationState, NodeDescriptor, NodeMetadata, RepositoryLocation, Token,
    TOKEN_ESCAPE, TOKEN_SEPARATOR,
};
