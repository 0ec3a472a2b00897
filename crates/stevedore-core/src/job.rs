//! The job record and its status state machine.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;
use crate::tokens::TokenSet;

/// Lifecycle status of a build job.
///
/// Statuses advance monotonically along the edges in
/// [`JobStatus::can_transition`]; there are no retry edges, a job that
/// cannot advance is simply left in place and reconsidered on the next
/// orchestrator wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum JobStatus {
    /// Row created, no backend engaged yet.
    #[display("requested")]
    #[serde(rename = "requested")]
    Requested,
    /// Submitted to a backend; a backend handle is recorded.
    #[display("pending")]
    #[serde(rename = "pending")]
    Pending,
    /// The backend reported a passing build.
    #[display("build succeeded")]
    #[serde(rename = "build succeeded")]
    BuildSucceeded,
    /// The backend reported a failing build.
    #[display("build failed")]
    #[serde(rename = "build failed")]
    BuildFailed,
    /// Waiting for the metadata artifact to become retrievable.
    #[display("fetching metadata")]
    #[serde(rename = "fetching metadata")]
    FetchingMetadata,
    /// Binary artifact bundles are being downloaded and staged.
    #[display("fetching")]
    #[serde(rename = "fetching")]
    Fetching,
    /// All artifacts staged; rescan signal not yet raised.
    #[display("deploying")]
    #[serde(rename = "deploying")]
    Deploying,
    /// Staged and signalled to the downstream indexer.
    #[display("deployed")]
    #[serde(rename = "deployed")]
    Deployed,
    /// A `nobuild` token was discovered at metadata time.
    #[display("not built")]
    #[serde(rename = "not built")]
    NotBuilt,
    /// Unrecoverable processing fault.
    #[display("errored")]
    #[serde(rename = "errored")]
    Errored,
}

impl JobStatus {
    /// Whether `self -> next` is a legal state machine edge.
    pub fn can_transition(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Requested, Pending)
                | (Pending, BuildSucceeded)
                | (Pending, BuildFailed)
                | (BuildSucceeded, FetchingMetadata)
                | (BuildSucceeded, Fetching)
                | (BuildSucceeded, NotBuilt)
                | (FetchingMetadata, Fetching)
                | (FetchingMetadata, NotBuilt)
                | (FetchingMetadata, Errored)
                | (FetchingMetadata, BuildSucceeded)
                | (Fetching, Deploying)
                | (Fetching, Errored)
                | (Deploying, Deployed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::BuildFailed
                | JobStatus::Deployed
                | JobStatus::NotBuilt
                | JobStatus::Errored
        )
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "requested" => JobStatus::Requested,
            "pending" => JobStatus::Pending,
            "build succeeded" => JobStatus::BuildSucceeded,
            "build failed" => JobStatus::BuildFailed,
            "fetching metadata" => JobStatus::FetchingMetadata,
            "fetching" => JobStatus::Fetching,
            "deploying" => JobStatus::Deploying,
            "deployed" => JobStatus::Deployed,
            "not built" => JobStatus::NotBuilt,
            "errored" => JobStatus::Errored,
            other => return Err(Error::UnknownStatus(other.to_string())),
        })
    }
}

/// External CI service that executes builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum Backend {
    #[display("github")]
    #[serde(rename = "github")]
    Github,
    #[display("appveyor")]
    #[serde(rename = "appveyor")]
    Appveyor,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "github" => Backend::Github,
            "appveyor" => Backend::Appveyor,
            other => return Err(Error::UnknownBackend(other.to_string())),
        })
    }
}

/// One tracked build attempt.
///
/// `id` is the build number, the correlation key across every external
/// system. `package`, `revision`, `reference` and `maintainer` are
/// immutable once set; everything else advances under the exclusive
/// ownership rules of the dispatcher and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub package: String,
    pub revision: String,
    pub reference: String,
    pub maintainer: String,
    pub status: JobStatus,
    pub backend: Option<Backend>,
    pub backend_id: Option<String>,
    /// Space-separated architecture tags, sorted; pairs position-wise
    /// with `artifacts`.
    pub arches: Option<String>,
    /// Space-separated retrieval locators in `arches` key order.
    pub artifacts: Option<String>,
    pub tokens: TokenSet,
    /// Request time, unix seconds.
    pub timestamp: Option<i64>,
    /// Build wall-clock time, seconds.
    pub duration: Option<i64>,
    pub logurl: Option<String>,
    pub announce: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Requested,
            JobStatus::Pending,
            JobStatus::BuildSucceeded,
            JobStatus::BuildFailed,
            JobStatus::FetchingMetadata,
            JobStatus::Fetching,
            JobStatus::Deploying,
            JobStatus::Deployed,
            JobStatus::NotBuilt,
            JobStatus::Errored,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn legal_edges_only() {
        use JobStatus::*;

        assert!(Requested.can_transition(Pending));
        assert!(Pending.can_transition(BuildSucceeded));
        assert!(Pending.can_transition(BuildFailed));
        assert!(BuildSucceeded.can_transition(FetchingMetadata));
        assert!(BuildSucceeded.can_transition(Fetching));
        assert!(FetchingMetadata.can_transition(Fetching));
        assert!(Fetching.can_transition(Deploying));
        assert!(Deploying.can_transition(Deployed));

        // no skipping ahead or moving backwards
        assert!(!Requested.can_transition(BuildSucceeded));
        assert!(!Pending.can_transition(Fetching));
        assert!(!Deploying.can_transition(Fetching));
        assert!(!BuildFailed.can_transition(FetchingMetadata));
        assert!(!Deployed.can_transition(Requested));
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::BuildFailed.is_terminal());
        assert!(JobStatus::Deployed.is_terminal());
        assert!(JobStatus::NotBuilt.is_terminal());
        assert!(JobStatus::Errored.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Fetching.is_terminal());
    }
}
