//! Deploy gating policy.

use serde::{Deserialize, Serialize};

use crate::tokens::{TOKEN_DEPLOY, TOKEN_NOBUILD, TOKEN_NODEPLOY, TokenSet};

/// Which jobs are eligible for automatic publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployPolicy {
    /// Only pushes to this reference are published.
    pub mainline_reference: String,
    /// The reserved scratch package, never published.
    pub sandbox_package: String,
}

impl Default for DeployPolicy {
    fn default() -> Self {
        Self {
            mainline_reference: "refs/heads/master".to_string(),
            sandbox_package: "playground".to_string(),
        }
    }
}

impl DeployPolicy {
    /// Token-level gate: publication is opt-in via `deploy`, and
    /// `nobuild`/`nodeploy` always win.
    pub fn tokens_allow(tokens: &TokenSet) -> bool {
        if tokens.contains(TOKEN_NOBUILD) || tokens.contains(TOKEN_NODEPLOY) {
            return false;
        }
        tokens.contains(TOKEN_DEPLOY)
    }

    /// Full automatic-publication gate.
    pub fn eligible(&self, reference: &str, package: &str, tokens: &TokenSet) -> bool {
        self.branch_and_package_allow(reference, package) && Self::tokens_allow(tokens)
    }

    /// Operator force-publish path: bypasses the token gate, keeps the
    /// branch and package checks.
    pub fn branch_and_package_allow(&self, reference: &str, package: &str) -> bool {
        reference == self.mainline_reference && package != self.sandbox_package
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> DeployPolicy {
        DeployPolicy::default()
    }

    #[test]
    fn deploy_is_opt_in() {
        assert!(!DeployPolicy::tokens_allow(&TokenSet::parse("")));
        assert!(DeployPolicy::tokens_allow(&TokenSet::parse("deploy")));
    }

    #[test]
    fn nobuild_and_nodeploy_always_win() {
        assert!(!DeployPolicy::tokens_allow(&TokenSet::parse("deploy nodeploy")));
        assert!(!DeployPolicy::tokens_allow(&TokenSet::parse("deploy nobuild")));
    }

    #[test]
    fn mainline_and_sandbox_checks() {
        let p = policy();
        let deploy = TokenSet::parse("deploy");
        assert!(p.eligible("refs/heads/master", "zlib", &deploy));
        assert!(!p.eligible("refs/heads/topic", "zlib", &deploy));
        assert!(!p.eligible("refs/heads/master", "playground", &deploy));
    }

    #[test]
    fn force_path_keeps_branch_and_package_checks() {
        let p = policy();
        assert!(p.branch_and_package_allow("refs/heads/master", "zlib"));
        assert!(!p.branch_and_package_allow("refs/heads/master", "playground"));
        assert!(!p.branch_and_package_allow("refs/heads/topic", "zlib"));
    }
}
