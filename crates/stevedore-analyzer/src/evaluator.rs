//! External evaluator invocation.
//!
//! The preferred extraction strategy: have the dialect's own
//! interpreter dump the fully evaluated variable values. Prerequisite
//! checks are suppressed so the dump works on a bare orchestrator
//! host with none of the package's dependencies installed.

use std::path::Path;

use crate::error::{AnalyzerError, AnalyzerResult};
use crate::vars::{DUMP_VARS, ScriptVars, parse_dump};

/// Environment knob understood by the evaluator; disables interactive
/// prerequisite probing.
const SUPPRESS_CHECKS: (&str, &str) = ("PORT_NOCHECK", "1");

/// Run `<evaluator> <script> vars NAME…` and parse the dump.
pub async fn extract(
    evaluator: &str,
    source_dir: &Path,
    script: &str,
) -> AnalyzerResult<ScriptVars> {
    let output = tokio::process::Command::new(evaluator)
        .arg(script)
        .arg("vars")
        .args(DUMP_VARS)
        .current_dir(source_dir)
        .env(SUPPRESS_CHECKS.0, SUPPRESS_CHECKS.1)
        .output()
        .await
        .map_err(|e| AnalyzerError::Evaluator(format!("cannot run {evaluator}: {e}")))?;

    if !output.status.success() {
        return Err(AnalyzerError::Evaluator(format!(
            "{evaluator} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_dump(&String::from_utf8_lossy(&output.stdout)))
}
