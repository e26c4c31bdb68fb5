//! Asset Graph Core
//!
//! This crate turns flat lists of asset descriptors into a navigable
//! dependency graph and answers selection queries against it.
//! It implements:
//!
//! - Graph indexing with symmetric upstream/downstream adjacency
//! - A selector language with traversal depths, wildcards and attributes
//! - Upstream and downstream layer distances within a selection
//! - Merging of late-arriving annotations into an existing index
//! - Memoized, staleness-checked background computation
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Node descriptors, the graph index, distances and annotations
//! - `query`: Selector parsing, scope filters and evaluation
//! - `dispatch`: Requests, the worker protocol, the result cache and the
//!   dispatcher
//! - `config`: Strategy and cache settings from JSON or the environment
//!
//! # Example
//!
//! ```rust,ignore
//! use assetgraph_core::dispatch::{Dispatcher, SelectionRequest};
//! use assetgraph_core::graph::NodeDescriptor;
//!
//! let nodes = vec![
//!     NodeDescriptor::new("a").with_downstream("b"),
//!     NodeDescriptor::new("b").with_upstream("a"),
//! ];
//!
//! let dispatcher = Dispatcher::inline();
//! let result = dispatcher
//!     .select(SelectionRequest::new(nodes, "a++"))
//!     .await
//!     .delivered()
//!     .unwrap();
//!
//! // Both assets match; "b" sits one layer below "a".
//! let selection = result.as_selection().unwrap();
//! assert_eq!(selection.matched().len(), 2);
//! assert_eq!(selection.distances("a").downstream, 1);
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod query;

pub use config::{DispatcherConfig, Strategy};
pub use dispatch::{ComputationRequest, ComputationResult, Dispatcher, Outcome, SelectionRequest};
pub use error::{BuildError, ConfigError, QuerySyntaxError, WorkerFault};
pub use graph::{calculate_distances, merge_annotations, GraphIndex, NodeDescriptor, Token};
pub use query::{select, Scope, Selection};
