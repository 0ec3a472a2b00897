//! Update records applied to job rows.
//!
//! Every consumer of an update checks typed `Option` fields for
//! presence; nothing is probed for dynamically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::tokens::TokenSet;

/// Per-architecture artifact locators.
///
/// Backed by a `BTreeMap` so the architecture keys always iterate in
/// sorted order; the persisted `arches` and `artifacts` strings are
/// both derived from that one order and therefore zip back together
/// position-for-position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet(BTreeMap<String, String>);

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, arch: &str, locator: &str) {
        self.0.insert(arch.to_string(), locator.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Architecture tags, sorted, space-separated.
    pub fn arches_string(&self) -> String {
        self.0.keys().cloned().collect::<Vec<_>>().join(" ")
    }

    /// Retrieval locators in the same key order, space-separated.
    pub fn locators_string(&self) -> String {
        self.0.values().cloned().collect::<Vec<_>>().join(" ")
    }

    /// Reassemble from the two persisted parallel lists.
    pub fn from_parallel(arches: &str, locators: &str) -> Result<Self> {
        let arches: Vec<&str> = arches.split_whitespace().collect();
        let locators: Vec<&str> = locators.split_whitespace().collect();
        if arches.len() != locators.len() {
            return Err(Error::ArtifactListMismatch {
                arches: arches.len(),
                artifacts: locators.len(),
            });
        }
        Ok(Self(
            arches
                .into_iter()
                .zip(locators)
                .map(|(a, l)| (a.to_string(), l.to_string()))
                .collect(),
        ))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(a, l)| (a.as_str(), l.as_str()))
    }
}

impl FromIterator<(String, String)> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An inbound build-completion notification, as delivered by the
/// external webhook collaborator.
///
/// `tokens` and `artifacts` are populated by backends that report
/// everything in one shot; when absent, the orchestrator fetches the
/// metadata artifact separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildEvent {
    pub id: i64,
    pub package: String,
    pub revision: String,
    pub reference: String,
    pub maintainer: String,
    pub succeeded: bool,
    #[serde(default)]
    pub logurl: Option<String>,
    /// Build start, unix seconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Build wall-clock time, seconds.
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub tokens: Option<TokenSet>,
    #[serde(default)]
    pub artifacts: Option<ArtifactSet>,
}

/// Contents of a fetched metadata artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub id: i64,
    pub package: String,
    pub revision: String,
    pub reference: String,
    pub maintainer: String,
    pub tokens: TokenSet,
    #[serde(default)]
    pub announce: Option<String>,
    pub artifacts: ArtifactSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arches_and_locators_share_one_sort_order() {
        let mut set = ArtifactSet::new();
        set.insert("x86_64", "https://example.com/b");
        set.insert("noarch", "https://example.com/c");
        set.insert("x86", "https://example.com/a");

        assert_eq!(set.arches_string(), "noarch x86 x86_64");
        assert_eq!(
            set.locators_string(),
            "https://example.com/c https://example.com/a https://example.com/b"
        );

        // zipping the two persisted strings reproduces the mapping
        let rebuilt =
            ArtifactSet::from_parallel(&set.arches_string(), &set.locators_string()).unwrap();
        assert_eq!(rebuilt, set);
    }

    #[test]
    fn mismatched_parallel_lists_are_rejected() {
        let err = ArtifactSet::from_parallel("x86 x86_64", "only-one").unwrap_err();
        assert!(matches!(
            err,
            Error::ArtifactListMismatch {
                arches: 2,
                artifacts: 1
            }
        ));
    }
}
