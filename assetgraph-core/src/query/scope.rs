//! Query Scope
//!
//! A scope narrows the graph before a selector runs: to one job, one asset
//! group, one repository or code location, minus anything an exclusion rule
//! rejects. Scopes are plain data so they can travel to the worker and take
//! part in the canonical request form.

use serde::{Deserialize, Serialize};

use crate::graph::NodeDescriptor;

/// Serializable exclusion predicate over node descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExclusionRule {
    /// Exclude one node by token.
    Token(String),
    /// Exclude nodes carrying this compute kind, ignoring ASCII case.
    Kind(String),
    /// Exclude nodes in this asset group.
    Group(String),
    /// Exclude nodes with this tag (any value when `value` is `None`).
    Tag { key: String, value: Option<String> },
    /// Exclude nodes that cannot be materialized (source assets).
    NotMaterializable,
}

impl ExclusionRule {
    pub fn excludes(&self, node: &NodeDescriptor) -> bool {
        match self {
            ExclusionRule::Token(token) => node.token() == *token,
            ExclusionRule::Kind(kind) => node.metadata.kinds.iter().any(|k| k.eq_ignore_ascii_case(kind)),
            ExclusionRule::Group(group) => node.group.as_deref() == Some(group.as_str()),
            ExclusionRule::Tag { key, value } => match (node.metadata.tags.get(key), value) {
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
                (None, _) => false,
            },
            ExclusionRule::NotMaterializable => !node.metadata.is_materializable,
        }
    }
}

/// Containment filters applied before query evaluation.
///
/// Every field left unset imposes no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    pub job: Option<String>,
    pub group: Option<String>,
    pub repository: Option<String>,
    pub location: Option<String>,
    pub exclude: Vec<ExclusionRule>,
}

impl Scope {
    /// A scope that admits every node.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn repository(mut self, name: impl Into<String>, location: impl Into<String>) -> Self {
        self.repository = Some(name.into());
        self.location = Some(location.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn excluding(mut self, rule: ExclusionRule) -> Self {
        self.exclude.push(rule);
        self
    }

    /// Whether this scope restricts anything at all.
    pub fn is_unrestricted(&self) -> bool {
        *self == Self::default()
    }

    /// Check whether a node is visible in this scope.
    pub fn admits(&self, node: &NodeDescriptor) -> bool {
        if let Some(job) = &self.job {
            if !node.in_job(job) {
                return false;
            }
        }
        if let Some(group) = &self.group {
            if node.group.as_ref() != Some(group) {
                return false;
            }
        }
        if let Some(name) = &self.repository {
            if node.repository.as_ref().map(|r| &r.name) != Some(name) {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if node.repository.as_ref().map(|r| &r.location) != Some(location) {
                return false;
            }
        }

        !self.exclude.iter().any(|rule| rule.excludes(node))
    }
}
