//! Behavior tokens.
//!
//! Tokens are free-form flags controlling opt-in/opt-out build
//! behavior. They arrive from three places: the per-maintainer
//! defaults file, the build request itself, and the build script's
//! own token list discovered at metadata time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Skip the build entirely.
pub const TOKEN_NOBUILD: &str = "nobuild";
/// Build, but never publish the result.
pub const TOKEN_NODEPLOY: &str = "nodeploy";
/// Opt in to automatic publication.
pub const TOKEN_DEPLOY: &str = "deploy";
/// Route the build to the AppVeyor backend.
pub const TOKEN_APPVEYOR: &str = "appveyor";
/// Maintainer has disabled the service for themselves.
pub const TOKEN_DISABLE: &str = "disable";

/// An ordered set of behavior tokens.
///
/// Persisted as a single space-separated string; parsing is
/// whitespace-splitting, so token order in the source text is
/// irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TokenSet(BTreeSet<String>);

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(s: &str) -> Self {
        Self(s.split_whitespace().map(str::to_string).collect())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn insert(&mut self, token: &str) {
        self.0.insert(token.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Union of `self` and `other`.
    pub fn merged(&self, other: &TokenSet) -> TokenSet {
        TokenSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn disables_build(&self) -> bool {
        self.contains(TOKEN_NOBUILD)
    }

    pub fn disabled(&self) -> bool {
        self.contains(TOKEN_DISABLE)
    }

    pub fn selects_appveyor(&self) -> bool {
        self.contains(TOKEN_APPVEYOR)
    }
}

impl fmt::Display for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for token in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(token)?;
            first = false;
        }
        Ok(())
    }
}

impl From<String> for TokenSet {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<TokenSet> for String {
    fn from(tokens: TokenSet) -> Self {
        tokens.to_string()
    }
}

impl FromIterator<String> for TokenSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_whitespace() {
        let tokens = TokenSet::parse("  deploy   nobuild\tappveyor ");
        assert!(tokens.contains("deploy"));
        assert!(tokens.disables_build());
        assert!(tokens.selects_appveyor());
        assert_eq!(tokens.to_string(), "appveyor deploy nobuild");
    }

    #[test]
    fn merged_is_a_union() {
        let a = TokenSet::parse("deploy");
        let b = TokenSet::parse("deploy nodeploy");
        assert_eq!(a.merged(&b).to_string(), "deploy nodeploy");
    }

    #[test]
    fn empty_round_trip() {
        let tokens = TokenSet::parse("");
        assert!(tokens.is_empty());
        assert_eq!(tokens.to_string(), "");
    }
}
