//! Selection Queries
//!
//! This module implements the selector language the console uses to narrow
//! the asset graph, e.g. `raw_orders++` or `*kind:dbt`.
//!
//! # Concepts
//!
//! ## Scope
//!
//! Containment filters (job, group, repository, location) plus exclusion
//! rules. Scoping happens first; the selector never sees nodes outside it.
//!
//! ## Clauses
//!
//! A selector is a list of clauses. Each clause names a starting set of
//! nodes (a token, a wildcard pattern or an attribute) and optionally how
//! many layers upstream and downstream to extend it. The selection is the
//! union of all clauses.
//!
//! ## Selection
//!
//! Evaluation returns both the matched tokens and the scoped tokens, so a
//! caller can tell "outside the scope" from "not matched by the query".

mod evaluator;
mod parser;
mod scope;

pub use evaluator::{select, Evaluator, Selection};
pub use parser::{Attribute, Clause, Depth, SelectionQuery, Target};
pub use scope::{ExclusionRule, Scope};
