//! Analyzer error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("cannot read source checkout {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("no build script found in source checkout")]
    NoScript,

    #[error("source checkout contains {0} {1} scripts, expected exactly one")]
    TooManyScripts(usize, &'static str),

    #[error("evaluator failed: {0}")]
    Evaluator(String),

    #[error("cross host {0:?} has no known package prefix")]
    UnknownCrossHost(String),

    #[error("capability {0:?} requires CROSS_HOST to be set")]
    MissingCrossHost(&'static str),
}

pub type AnalyzerResult<T> = std::result::Result<T, AnalyzerError>;
