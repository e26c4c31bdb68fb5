//! Graph Nodes
//!
//! This module defines the node descriptors that the graph index is built
//! from, and the key/token pair that identifies them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Canonical string form of an [`AssetKey`].
///
/// Tokens are the unique identifiers used by the index, the query language
/// and the dispatcher cache.
pub type Token = String;

/// Separator placed between path segments when forming a token.
pub const TOKEN_SEPARATOR: char = '/';

/// Escapes a separator or another escape inside a segment.
pub const TOKEN_ESCAPE: char = '\\';

/// Identity of an asset: an ordered sequence of path segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey {
    path: SmallVec<[String; 4]>,
}

impl AssetKey {
    /// Create a key from its path segments.
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a key back from its token. Inverse of [`to_token`](Self::to_token).
    pub fn from_token(token: &str) -> Self {
        let mut path = SmallVec::new();
        let mut segment = String::new();
        let mut chars = token.chars();

        while let Some(c) = chars.next() {
            match c {
                TOKEN_ESCAPE => {
                    if let Some(next) = chars.next() {
                        segment.push(next);
                    }
                }
                TOKEN_SEPARATOR => path.push(std::mem::take(&mut segment)),
                c => segment.push(c),
            }
        }
        path.push(segment);

        Self { path }
    }

    /// Get the path segments.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// A key with no segments. Such nodes still index under the empty token.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Join the segments into the key's token.
    ///
    /// Separators and escapes inside a segment are escaped, so distinct keys
    /// never share a token: `["a/b"]` becomes `a\/b`, `["a", "b"]` becomes
    /// `a/b`.
    pub fn to_token(&self) -> Token {
        let mut token = String::new();
        for (i, segment) in self.path.iter().enumerate() {
            if i > 0 {
                token.push(TOKEN_SEPARATOR);
            }
            for c in segment.chars() {
                if c == TOKEN_SEPARATOR || c == TOKEN_ESCAPE {
                    token.push(TOKEN_ESCAPE);
                }
                token.push(c);
            }
        }
        token
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

impl From<&str> for AssetKey {
    fn from(token: &str) -> Self {
        Self::from_token(token)
    }
}

/// Repository a node was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryLocation {
    /// Repository name.
    pub name: String,
    /// Name of the code location hosting the repository.
    pub location: String,
}

impl RepositoryLocation {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
        }
    }
}

/// Latest known materialization state of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializationState {
    /// Never materialized.
    Missing,
    /// A materialization is in progress.
    InProgress,
    /// The latest materialization succeeded.
    Materialized,
    /// The latest materialization attempt failed.
    Failed,
}

/// Open-ended metadata attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMetadata {
    /// User-defined tags. Ordered so the canonical request form is stable.
    pub tags: BTreeMap<String, String>,

    /// Compute kind labels (e.g. `dbt`, `python`).
    pub kinds: Vec<String>,

    /// Whether the asset can be materialized from the console.
    pub is_materializable: bool,

    /// Owner identifiers (users or teams).
    pub owners: Vec<String>,

    /// Latest materialization state, if known.
    pub materialization: Option<MaterializationState>,
}

/// A node as supplied by the node source, before indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Identity of the node.
    pub key: AssetKey,

    /// Keys this node depends on.
    #[serde(default)]
    pub upstream: Vec<AssetKey>,

    /// Keys that depend on this node.
    #[serde(default)]
    pub downstream: Vec<AssetKey>,

    /// Jobs that contain this node.
    #[serde(default)]
    pub jobs: Vec<String>,

    /// Asset group the node belongs to.
    #[serde(default)]
    pub group: Option<String>,

    /// Repository and code location the node was loaded from.
    #[serde(default)]
    pub repository: Option<RepositoryLocation>,

    #[serde(default)]
    pub metadata: NodeMetadata,
}

impl NodeDescriptor {
    /// Create a descriptor with no edges, containers or metadata.
    pub fn new(key: impl Into<AssetKey>) -> Self {
        Self {
            key: key.into(),
            upstream: Vec::new(),
            downstream: Vec::new(),
            jobs: Vec::new(),
            group: None,
            repository: None,
            metadata: NodeMetadata::default(),
        }
    }

    /// The node's token.
    pub fn token(&self) -> Token {
        self.key.to_token()
    }

    /// Declare an upstream dependency.
    pub fn with_upstream(mut self, key: impl Into<AssetKey>) -> Self {
        self.upstream.push(key.into());
        self
    }

    /// Declare a downstream dependent.
    pub fn with_downstream(mut self, key: impl Into<AssetKey>) -> Self {
        self.downstream.push(key.into());
        self
    }

    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.jobs.push(job.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_repository(mut self, repository: RepositoryLocation) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.metadata.kinds.push(kind.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.metadata.owners.push(owner.into());
        self
    }

    pub fn materializable(mut self) -> Self {
        self.metadata.is_materializable = true;
        self
    }

    /// Check whether the node belongs to the given job.
    pub fn in_job(&self, job: &str) -> bool {
        self.jobs.iter().any(|j| j == job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_joins_path_segments() {
        let key = AssetKey::new(["warehouse", "orders", "daily"]);
        assert_eq!(key.to_token(), "warehouse/orders/daily");
        assert_eq!(key.to_string(), "warehouse/orders/daily");
    }

    #[test]
    fn token_round_trips_through_key() {
        let key = AssetKey::from_token("raw/events");
        assert_eq!(key.path(), ["raw".to_string(), "events".to_string()]);
        assert_eq!(key.to_token(), "raw/events");
    }

    #[test]
    fn separator_inside_segment_keeps_keys_distinct() {
        let nested = AssetKey::new(["a/b"]);
        let split = AssetKey::new(["a", "b"]);

        assert_eq!(nested.to_token(), "a\\/b");
        assert_eq!(split.to_token(), "a/b");
        assert_eq!(AssetKey::from_token(&nested.to_token()), nested);
        assert_eq!(AssetKey::from_token(&split.to_token()), split);

        let odd = AssetKey::new(["c:\\tmp", "x"]);
        assert_eq!(AssetKey::from_token(&odd.to_token()), odd);
    }

    #[test]
    fn key_serializes_as_plain_list() {
        let key = AssetKey::new(["a", "b"]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let node: NodeDescriptor =
            serde_json::from_str(r#"{"key": ["x"], "downstream": [["y"]]}"#).unwrap();
        assert_eq!(node.token(), "x");
        assert_eq!(node.downstream, vec![AssetKey::from("y")]);
        assert!(node.upstream.is_empty());
        assert!(node.group.is_none());
        assert!(!node.metadata.is_materializable);
    }

    #[test]
    fn builder_methods_fill_containers() {
        let node = NodeDescriptor::new("a")
            .with_job("nightly")
            .with_group("core")
            .with_kind("dbt")
            .with_tag("tier", "gold")
            .materializable();

        assert!(node.in_job("nightly"));
        assert!(!node.in_job("hourly"));
        assert_eq!(node.group.as_deref(), Some("core"));
        assert_eq!(node.metadata.kinds, vec!["dbt".to_string()]);
        assert_eq!(node.metadata.tags.get("tier").map(String::as_str), Some("gold"));
        assert!(node.metadata.is_materializable);
    }
}
