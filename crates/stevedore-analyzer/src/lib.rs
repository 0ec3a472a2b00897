//! Build-script analyzer.
//!
//! Given a package's source checkout, infer what the package needs to
//! build: target architectures, build-time dependencies, behavior
//! tokens and announcement text. Two extraction strategies feed one
//! normalization path: the dialect's external evaluator when it is
//! available, a static pattern scan of the raw script text otherwise.
//! The two are never mixed within one analysis.
//!
//! `analyze` never fails on malformed input; it degrades to an empty
//! metadata record with the cause logged.

pub mod depends;
pub mod error;
pub mod evaluator;
pub mod scan;
pub mod vars;

pub use error::{AnalyzerError, AnalyzerResult};
pub use vars::ScriptVars;

use std::path::Path;
use tracing::{error, info, warn};

use stevedore_config::AnalyzerConfig;
use stevedore_core::tokens::TOKEN_NODEPLOY;
use stevedore_core::{Arches, PackageMetadata, ScriptKind, TokenSet};

/// Which strategy produced a variable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataSource {
    ExternalEvaluator,
    StaticPatternScan,
}

/// Restriction flag meaning "do not publish the result".
const RESTRICT_DEPLOY: &str = "deploy";

/// Analyze a source checkout.
pub async fn analyze(
    source_dir: &Path,
    default_tokens: &TokenSet,
    config: &AnalyzerConfig,
) -> PackageMetadata {
    match try_analyze(source_dir, default_tokens, config).await {
        Ok(metadata) => metadata,
        Err(e) => {
            error!(dir = %source_dir.display(), error = %e, "analysis failed");
            PackageMetadata::empty()
        }
    }
}

async fn try_analyze(
    source_dir: &Path,
    default_tokens: &TokenSet,
    config: &AnalyzerConfig,
) -> AnalyzerResult<PackageMetadata> {
    let (kind, script) = discover(source_dir)?;

    if kind == ScriptKind::Legacy {
        // nothing can be inferred from a free-form shell script
        info!(script, "source contains a legacy build script");
        return Ok(PackageMetadata {
            kind: Some(ScriptKind::Legacy),
            script,
            depends: Default::default(),
            arches: Arches::Listed(Vec::new()),
            tokens: default_tokens.clone(),
            restrict: Default::default(),
            announce: None,
        });
    }

    let (source, vars) = extract_vars(source_dir, &script, config).await?;
    info!(script, ?source, "script variables extracted");
    build_metadata(script, vars, default_tokens)
}

/// Locate the build script. Exactly one primary script is required.
fn discover(source_dir: &Path) -> AnalyzerResult<(ScriptKind, String)> {
    let entries = std::fs::read_dir(source_dir)
        .map_err(|e| AnalyzerError::Read(source_dir.to_path_buf(), e))?;

    let mut ports = Vec::new();
    let mut shells = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AnalyzerError::Read(source_dir.to_path_buf(), e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".port") {
            ports.push(name);
        } else if name.ends_with(".sh") {
            shells.push(name);
        }
    }
    ports.sort();
    shells.sort();

    if ports.len() > 1 {
        return Err(AnalyzerError::TooManyScripts(ports.len(), "port"));
    }
    if let Some(script) = ports.into_iter().next() {
        return Ok((ScriptKind::Port, script));
    }
    if shells.len() > 1 {
        return Err(AnalyzerError::TooManyScripts(shells.len(), "shell"));
    }
    match shells.into_iter().next() {
        Some(script) => Ok((ScriptKind::Legacy, script)),
        None => Err(AnalyzerError::NoScript),
    }
}

/// Try the evaluator, fall back to the static scan. All-or-nothing
/// per strategy; a partial evaluator result is never patched up with
/// scanned values.
async fn extract_vars(
    source_dir: &Path,
    script: &str,
    config: &AnalyzerConfig,
) -> AnalyzerResult<(MetadataSource, ScriptVars)> {
    match evaluator::extract(&config.evaluator, source_dir, script).await {
        Ok(vars) => Ok((MetadataSource::ExternalEvaluator, vars)),
        Err(e) => {
            warn!(error = %e, "evaluator unavailable, falling back to static scan");
            let content = std::fs::read_to_string(source_dir.join(script))
                .map_err(|e| AnalyzerError::Read(source_dir.join(script), e))?;
            Ok((MetadataSource::StaticPatternScan, scan::extract(&content)))
        }
    }
}

fn build_metadata(
    script: String,
    vars: ScriptVars,
    default_tokens: &TokenSet,
) -> AnalyzerResult<PackageMetadata> {
    let mut deps = depends::from_inherits(&vars)?;
    for chunk in &vars.build_requires {
        deps.extend(depends::from_atoms(chunk, false));
    }
    for chunk in &vars.depend {
        deps.extend(depends::from_atoms(chunk, true));
    }

    let mut tokens = default_tokens.merged(&vars.tokens);
    if vars.restrict.contains(RESTRICT_DEPLOY) {
        // a publish restriction wins over whatever was requested
        tokens.insert(TOKEN_NODEPLOY);
    }

    Ok(PackageMetadata {
        kind: Some(ScriptKind::Port),
        script,
        depends: deps,
        arches: normalize_arches(&vars),
        tokens,
        restrict: vars.restrict,
        announce: vars.announce,
    })
}

fn normalize_arches(vars: &ScriptVars) -> Arches {
    // a cross-compilation or typesetting capability makes the package
    // architecture-independent regardless of ARCH
    if vars.inherits.contains("cross") || vars.inherits.contains("texlive") {
        return Arches::NoArch;
    }
    match vars.arch.as_deref().map(str::trim) {
        Some("noarch") | Some("all") => Arches::NoArch,
        Some(list) if !list.is_empty() => {
            Arches::Listed(list.split_whitespace().map(str::to_string).collect())
        }
        _ => Arches::default_native(),
    }
}
