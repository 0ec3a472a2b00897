//! Package metadata produced by the script analyzer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::tokens::TokenSet;

/// Build-script dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    /// The primary port-script dialect, statically analyzable.
    Port,
    /// A free-form legacy shell build script; nothing can be inferred.
    Legacy,
}

/// Target architectures a package builds for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arches {
    /// Explicit architecture tags.
    Listed(Vec<String>),
    /// Architecture-independent.
    NoArch,
}

impl Arches {
    /// The native pair built when a script declares nothing.
    pub fn default_native() -> Self {
        Arches::Listed(vec!["x86".to_string(), "x86_64".to_string()])
    }
}

impl fmt::Display for Arches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arches::Listed(list) => f.write_str(&list.join(" ")),
            Arches::NoArch => f.write_str("noarch"),
        }
    }
}

/// What a package needs in order to build.
///
/// Produced by the analyzer, folded into the job record and into the
/// parameters handed to the backend. Not persisted standalone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub kind: Option<ScriptKind>,
    /// Build script filename within the source checkout.
    pub script: String,
    /// Build-time package dependencies.
    pub depends: BTreeSet<String>,
    pub arches: Arches,
    pub tokens: TokenSet,
    /// Restriction flags declared by the script.
    pub restrict: BTreeSet<String>,
    pub announce: Option<String>,
}

impl PackageMetadata {
    /// The degraded result for unanalyzable input.
    pub fn empty() -> Self {
        Self {
            kind: None,
            script: String::new(),
            depends: BTreeSet::new(),
            arches: Arches::Listed(Vec::new()),
            tokens: TokenSet::new(),
            restrict: BTreeSet::new(),
            announce: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arches_display() {
        assert_eq!(Arches::NoArch.to_string(), "noarch");
        assert_eq!(Arches::default_native().to_string(), "x86 x86_64");
    }

    #[test]
    fn empty_metadata_has_no_kind() {
        let meta = PackageMetadata::empty();
        assert!(meta.kind.is_none());
        assert!(meta.depends.is_empty());
    }
}
