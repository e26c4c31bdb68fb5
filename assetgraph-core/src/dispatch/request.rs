//! Computation Requests and Results
//!
//! A request bundles every input of one computation as plain data, so it can
//! be shipped to a worker and hashed into a cache key. Executing it is pure.

use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::error::QuerySyntaxError;
use crate::graph::{Annotations, Distances, GraphIndex, NodeDescriptor, Token};
use crate::query::{Evaluator, Scope, Selection};

/// Which pipeline a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    BuildGraph,
    Select,
}

impl RequestKind {
    /// The result delivered when a computation of this kind fails.
    pub fn empty_result(self) -> ComputationResult {
        match self {
            RequestKind::BuildGraph => ComputationResult::Graph(GraphIndex::default()),
            RequestKind::Select => ComputationResult::Selection(SelectionResult::default()),
        }
    }
}

/// Inputs of the scope + selector pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRequest {
    pub nodes: Vec<NodeDescriptor>,
    pub query: String,
    pub scope: Scope,
    pub annotations: IndexMap<Token, Annotations>,
}

impl SelectionRequest {
    pub fn new(nodes: Vec<NodeDescriptor>, query: impl Into<String>) -> Self {
        Self {
            nodes,
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_annotation(mut self, token: impl Into<Token>, annotations: Annotations) -> Self {
        self.annotations.insert(token.into(), annotations);
        self
    }

    fn execute(&self) -> SelectionResult {
        let index = GraphIndex::build(self.nodes.iter().cloned());
        let evaluator = Evaluator::new(&index)
            .scope(&self.scope)
            .annotations(&self.annotations);

        match evaluator.evaluate(&self.query) {
            Ok(selection) => SelectionResult {
                selection,
                error: None,
            },
            Err(error) => SelectionResult {
                selection: Selection {
                    scoped: evaluator.scoped_graph().tokens().cloned().collect(),
                    ..Selection::default()
                },
                error: Some(error),
            },
        }
    }
}

/// A unit of work for a [`GraphComputer`](super::GraphComputer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputationRequest {
    /// Build the graph index for a node list.
    BuildGraph { nodes: Vec<NodeDescriptor> },
    /// Scope, annotate and filter a node list.
    Select(SelectionRequest),
}

impl ComputationRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            ComputationRequest::BuildGraph { .. } => RequestKind::BuildGraph,
            ComputationRequest::Select(_) => RequestKind::Select,
        }
    }

    /// Deterministic serialization used as the memoization key.
    ///
    /// Annotations are keyed by token, so their insertion order does not
    /// affect the key. Node order does, since it decides result order.
    pub fn canonical_key(&self) -> Result<String, serde_json::Error> {
        let canonical = match self {
            ComputationRequest::BuildGraph { nodes } => CanonicalRequest::BuildGraph { nodes },
            ComputationRequest::Select(request) => CanonicalRequest::Select {
                nodes: &request.nodes,
                query: &request.query,
                scope: &request.scope,
                annotations: request.annotations.iter().collect(),
            },
        };
        serde_json::to_string(&canonical)
    }

    /// Run the pipeline in the current thread.
    pub fn execute(&self) -> ComputationResult {
        match self {
            ComputationRequest::BuildGraph { nodes } => {
                ComputationResult::Graph(GraphIndex::build(nodes.iter().cloned()))
            }
            ComputationRequest::Select(request) => ComputationResult::Selection(request.execute()),
        }
    }
}

/// Borrowed view of a request with every map sorted.
#[derive(Serialize)]
enum CanonicalRequest<'a> {
    BuildGraph {
        nodes: &'a [NodeDescriptor],
    },
    Select {
        nodes: &'a [NodeDescriptor],
        query: &'a str,
        scope: &'a Scope,
        annotations: BTreeMap<&'a Token, &'a Annotations>,
    },
}

impl From<SelectionRequest> for ComputationRequest {
    fn from(request: SelectionRequest) -> Self {
        ComputationRequest::Select(request)
    }
}

/// Selection plus the syntax error, if the selector did not parse.
///
/// On error `matched` is empty while `scoped` still lists the nodes in
/// scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub selection: Selection,
    pub error: Option<QuerySyntaxError>,
}

impl SelectionResult {
    pub fn matched(&self) -> &IndexSet<Token> {
        &self.selection.matched
    }

    pub fn scoped(&self) -> &IndexSet<Token> {
        &self.selection.scoped
    }

    pub fn distances(&self, token: &str) -> Distances {
        self.selection.distances(token)
    }
}

/// Output of a computation. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputationResult {
    Graph(GraphIndex),
    Selection(SelectionResult),
}

impl ComputationResult {
    pub fn as_graph(&self) -> Option<&GraphIndex> {
        match self {
            ComputationResult::Graph(graph) => Some(graph),
            ComputationResult::Selection(_) => None,
        }
    }

    pub fn as_selection(&self) -> Option<&SelectionResult> {
        match self {
            ComputationResult::Selection(selection) => Some(selection),
            ComputationResult::Graph(_) => None,
        }
    }

    /// Whether this is the empty default delivered after a fault.
    pub fn is_empty(&self) -> bool {
        match self {
            ComputationResult::Graph(graph) => graph.is_empty(),
            ComputationResult::Selection(result) => {
                result.selection.scoped.is_empty() && result.error.is_none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<NodeDescriptor> {
        vec![
            NodeDescriptor::new("a").with_downstream("b"),
            NodeDescriptor::new("b").with_upstream("a"),
        ]
    }

    #[test]
    fn canonical_key_is_stable_and_distinguishes_inputs() {
        let a = ComputationRequest::from(SelectionRequest::new(nodes(), "a++"));
        let b = ComputationRequest::from(SelectionRequest::new(nodes(), "a++"));
        let c = ComputationRequest::from(SelectionRequest::new(nodes(), "a+"));

        assert_eq!(a.canonical_key().unwrap(), b.canonical_key().unwrap());
        assert_ne!(a.canonical_key().unwrap(), c.canonical_key().unwrap());

        let scoped = ComputationRequest::from(
            SelectionRequest::new(nodes(), "a++").with_scope(Scope::all().group("g")),
        );
        assert_ne!(a.canonical_key().unwrap(), scoped.canonical_key().unwrap());
    }

    #[test]
    fn annotation_order_does_not_change_key() {
        let first = ComputationRequest::from(
            SelectionRequest::new(nodes(), "a++")
                .with_annotation("a", Annotations::default().owners(["x"]))
                .with_annotation("b", Annotations::default().kinds(["dbt"])),
        );
        let second = ComputationRequest::from(
            SelectionRequest::new(nodes(), "a++")
                .with_annotation("b", Annotations::default().kinds(["dbt"]))
                .with_annotation("a", Annotations::default().owners(["x"])),
        );
        assert_eq!(first.canonical_key().unwrap(), second.canonical_key().unwrap());

        let other = ComputationRequest::from(
            SelectionRequest::new(nodes(), "a++").with_annotation("a", Annotations::default().owners(["y"])),
        );
        assert_ne!(first.canonical_key().unwrap(), other.canonical_key().unwrap());
    }

    #[test]
    fn build_graph_executes_index_builder() {
        let result = ComputationRequest::BuildGraph { nodes: nodes() }.execute();
        let graph = result.as_graph().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.downstream_of("a").collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn selection_executes_example() {
        let result = ComputationRequest::from(SelectionRequest::new(nodes(), "a++")).execute();
        let selection = result.as_selection().unwrap();

        assert!(selection.error.is_none());
        assert_eq!(selection.matched().len(), 2);
        assert_eq!(selection.distances("a"), Distances::new(0, 1));
        assert_eq!(selection.distances("b"), Distances::new(1, 0));
    }

    #[test]
    fn syntax_error_travels_as_value() {
        let result = ComputationRequest::from(SelectionRequest::new(nodes(), "a+*")).execute();
        let selection = result.as_selection().unwrap();

        assert_eq!(selection.error.as_ref().map(|e| e.fragment.as_str()), Some("a+*"));
        assert!(selection.matched().is_empty());
        assert_eq!(selection.scoped().len(), 2);
        assert!(!result.is_empty());
    }

    #[test]
    fn empty_results_per_kind() {
        assert!(RequestKind::BuildGraph.empty_result().is_empty());
        assert!(RequestKind::Select.empty_result().is_empty());
        assert!(RequestKind::Select.empty_result().as_selection().is_some());
    }
}
