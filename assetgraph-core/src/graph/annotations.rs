//! Supplementary Data Merge
//!
//! Annotations are fetched separately from the node list (materialization
//! status, compute kinds, ownership) and folded into node metadata before a
//! query runs, so attribute selectors see the same view the console renders.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::index::GraphIndex;
use super::node::{MaterializationState, NodeDescriptor, NodeMetadata, Token};

/// Per-node annotation bundle.
///
/// Every field is optional: an absent field leaves the node's existing
/// metadata untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    pub materialization: Option<MaterializationState>,
    pub kinds: Option<Vec<String>>,
    pub owners: Option<Vec<String>>,
    pub tags: Option<BTreeMap<String, String>>,
}

impl Annotations {
    pub fn materialization(mut self, state: MaterializationState) -> Self {
        self.materialization = Some(state);
        self
    }

    pub fn kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kinds = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    pub fn owners<I, S>(mut self, owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owners = Some(owners.into_iter().map(Into::into).collect());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Overwrite `metadata` with every field this bundle carries.
    fn apply(&self, metadata: &mut NodeMetadata) {
        if let Some(state) = self.materialization {
            metadata.materialization = Some(state);
        }
        if let Some(kinds) = &self.kinds {
            metadata.kinds = kinds.clone();
        }
        if let Some(owners) = &self.owners {
            metadata.owners = owners.clone();
        }
        if let Some(tags) = &self.tags {
            metadata.tags = tags.clone();
        }
    }
}

/// Fold annotations into the nodes of `index`, producing a new index.
///
/// Entries are applied in order, so a later bundle for the same token wins
/// field by field. Bundles for tokens not in the index are ignored.
pub fn merge_annotations<'a, I>(index: &GraphIndex, annotations: I) -> GraphIndex
where
    I: IntoIterator<Item = (&'a Token, &'a Annotations)>,
{
    let mut nodes: IndexMap<Token, NodeDescriptor> = index
        .nodes()
        .map(|node| (node.token(), node.clone()))
        .collect();

    let mut applied = 0usize;
    let mut ignored = 0usize;
    for (token, bundle) in annotations {
        match nodes.get_mut(token) {
            Some(node) => {
                bundle.apply(&mut node.metadata);
                applied += 1;
            }
            None => ignored += 1,
        }
    }

    debug!(applied, ignored, "merged node annotations");
    index.with_descriptors(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> GraphIndex {
        GraphIndex::build(vec![
            NodeDescriptor::new("a")
                .with_downstream("b")
                .with_kind("python")
                .with_owner("team:data"),
            NodeDescriptor::new("b").with_tag("tier", "gold"),
        ])
    }

    #[test]
    fn merge_overwrites_present_fields_only() {
        let annotations = vec![(
            "a".to_string(),
            Annotations::default().materialization(MaterializationState::Materialized),
        )];
        let merged = merge_annotations(&index(), annotations.iter().map(|(t, a)| (t, a)));

        let a = merged.node("a").unwrap();
        assert_eq!(a.metadata.materialization, Some(MaterializationState::Materialized));
        assert_eq!(a.metadata.kinds, vec!["python".to_string()]);
        assert_eq!(a.metadata.owners, vec!["team:data".to_string()]);
    }

    #[test]
    fn later_bundles_win() {
        let annotations = vec![
            ("b".to_string(), Annotations::default().kinds(["dbt"])),
            ("b".to_string(), Annotations::default().kinds(["snowflake"])),
        ];
        let merged = merge_annotations(&index(), annotations.iter().map(|(t, a)| (t, a)));

        assert_eq!(merged.node("b").unwrap().metadata.kinds, vec!["snowflake".to_string()]);
        assert_eq!(
            merged.node("b").unwrap().metadata.tags.get("tier").map(String::as_str),
            Some("gold")
        );
    }

    #[test]
    fn unknown_tokens_are_ignored_and_edges_kept() {
        let base = index();
        let annotations = vec![("ghost".to_string(), Annotations::default().owners(["nobody"]))];
        let merged = merge_annotations(&base, annotations.iter().map(|(t, a)| (t, a)));

        assert!(!merged.contains("ghost"));
        assert_eq!(merged.len(), base.len());
        assert_eq!(merged.downstream_of("a").collect::<Vec<_>>(), vec!["b"]);
        // Source index is untouched.
        assert_eq!(base, index());
    }
}
