//! Selection Evaluator
//!
//! Evaluation runs in three steps:
//!
//! 1. Scope: drop nodes outside the job/group/repository scope or rejected by
//!    an exclusion rule or predicate.
//! 2. Merge: fold supplementary annotations into the scoped nodes.
//! 3. Select: resolve each clause to its roots, expand along the scoped
//!    adjacency, and union the results.
//!
//! Traversal only ever sees the scoped graph, so a `+` cannot reach outside
//! the scope.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parser::{wildcard_match, Attribute, Clause, SelectionQuery, Target};
use super::scope::Scope;
use crate::error::QuerySyntaxError;
use crate::graph::{calculate_distances, merge_annotations, Annotations, Distances, GraphIndex, NodeDescriptor, Token};

/// The outcome of evaluating a selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Tokens selected by the query, in input order.
    pub matched: IndexSet<Token>,

    /// Tokens visible after scoping, before the query narrowed them.
    pub scoped: IndexSet<Token>,

    /// Graph induced on `matched`, with merged metadata.
    pub graph: GraphIndex,
}

impl Selection {
    /// Upstream/downstream depth of `token` within this selection.
    pub fn distances(&self, token: &str) -> Distances {
        calculate_distances(&self.graph, token)
    }

    /// Whether a token was in scope but not selected by the query.
    pub fn filtered_by_query(&self, token: &str) -> bool {
        self.scoped.contains(token) && !self.matched.contains(token)
    }
}

/// Evaluates selectors against one graph index.
///
/// # Example
///
/// ```rust,ignore
/// let selection = Evaluator::new(&index)
///     .scope(&Scope::all().group("sales"))
///     .evaluate("orders+")?;
/// ```
pub struct Evaluator<'a> {
    index: &'a GraphIndex,
    scope: Option<&'a Scope>,
    annotations: Option<&'a IndexMap<Token, Annotations>>,
    exclude: Option<Box<dyn Fn(&NodeDescriptor) -> bool + 'a>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(index: &'a GraphIndex) -> Self {
        Self {
            index,
            scope: None,
            annotations: None,
            exclude: None,
        }
    }

    /// Restrict evaluation to a scope.
    pub fn scope(mut self, scope: &'a Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Merge these annotations into scoped nodes before selecting.
    pub fn annotations(mut self, annotations: &'a IndexMap<Token, Annotations>) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Exclude every node for which `predicate` returns true.
    pub fn exclude<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&NodeDescriptor) -> bool + 'a,
    {
        self.exclude = Some(Box::new(predicate));
        self
    }

    /// Build the scoped, annotated graph that selectors run against.
    pub fn scoped_graph(&self) -> GraphIndex {
        let scoped = if self.scope.map_or(true, Scope::is_unrestricted) && self.exclude.is_none() {
            self.index.clone()
        } else {
            self.index.subgraph(|node| {
                self.scope.map_or(true, |scope| scope.admits(node))
                    && !self.exclude.as_ref().map_or(false, |exclude| exclude(node))
            })
        };

        match self.annotations {
            Some(annotations) if !annotations.is_empty() => merge_annotations(&scoped, annotations.iter()),
            _ => scoped,
        }
    }

    /// Parse and evaluate a selector string.
    pub fn evaluate(&self, query: &str) -> Result<Selection, QuerySyntaxError> {
        let parsed = SelectionQuery::parse(query)?;
        Ok(self.evaluate_parsed(&parsed))
    }

    /// Evaluate an already parsed selector.
    pub fn evaluate_parsed(&self, query: &SelectionQuery) -> Selection {
        let scoped_graph = self.scoped_graph();
        let scoped: IndexSet<Token> = scoped_graph.tokens().cloned().collect();

        let matched: IndexSet<Token> = if query.is_empty() {
            scoped.clone()
        } else {
            let mut hits: HashSet<&str> = HashSet::new();
            for clause in query.clauses() {
                hits.extend(select_clause(&scoped_graph, clause));
            }
            scoped
                .iter()
                .filter(|token| hits.contains(token.as_str()))
                .cloned()
                .collect()
        };

        debug!(
            scoped = scoped.len(),
            matched = matched.len(),
            clauses = query.clauses().len(),
            "evaluated selection"
        );

        let graph = scoped_graph.induced(&matched);
        Selection {
            matched,
            scoped,
            graph,
        }
    }
}

/// Evaluate `query` over `index` with no scope, annotations or predicate.
pub fn select(index: &GraphIndex, query: &str) -> Result<Selection, QuerySyntaxError> {
    Evaluator::new(index).evaluate(query)
}

/// Tokens selected by one clause: its roots plus their traversal.
fn select_clause<'g>(graph: &'g GraphIndex, clause: &Clause) -> HashSet<&'g str> {
    let roots: Vec<&'g Token> = graph
        .entries()
        .filter(|(_, node)| target_matches(&clause.target, node))
        .map(|(token, _)| token)
        .collect();

    let mut selected: HashSet<&'g str> = roots.iter().map(|t| t.as_str()).collect();
    for root in &roots {
        if let Some(depth) = clause.upstream {
            selected.extend(graph.reachable(root, depth.limit(), |g, t| g.upstream_of(t)));
        }
        if let Some(depth) = clause.downstream {
            selected.extend(graph.reachable(root, depth.limit(), |g, t| g.downstream_of(t)));
        }
    }

    selected
}

fn target_matches(target: &Target, node: &NodeDescriptor) -> bool {
    match target {
        Target::All => true,
        Target::Token(token) => node.token() == *token,
        Target::Pattern(pattern) => wildcard_match(pattern, &node.token()),
        Target::Attribute(attribute) => attribute_matches(attribute, node),
    }
}

fn attribute_matches(attribute: &Attribute, node: &NodeDescriptor) -> bool {
    let metadata = &node.metadata;
    match attribute {
        Attribute::Kind(kind) => metadata.kinds.iter().any(|k| k.eq_ignore_ascii_case(kind)),
        Attribute::Owner(owner) => metadata.owners.iter().any(|o| o == owner),
        Attribute::Group(group) => node.group.as_deref() == Some(group.as_str()),
        Attribute::Job(job) => node.in_job(job),
        Attribute::Tag { key, value } => match (metadata.tags.get(key), value) {
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
            (None, _) => false,
        },
    }
}
