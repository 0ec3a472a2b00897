//! Static pattern extraction.
//!
//! The fallback strategy when the external evaluator is unavailable:
//! scan the raw script text for literal assignments. This is a strict
//! approximation — conditionals and variable interpolation are not
//! evaluated, only continuation-folded literal right-hand-sides are
//! seen.

use regex::Regex;
use std::sync::LazyLock;

use stevedore_core::TokenSet;

use crate::vars::ScriptVars;

static REQUIRES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?ms)^[ \t]*(DEPEND|BUILD_REQUIRES)\+?=[ \t]*"(.*?)""#).unwrap()
});
static ARCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^[ \t]*ARCH=[ \t]*"?(.*?)"?[ \t]*$"#).unwrap());
static RESTRICT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^[ \t]*RESTRICT=[ \t]*"?(.*?)"?[ \t]*$"#).unwrap());
static TOKENS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^[ \t]*TOKENS=[ \t]*"?(.*?)"?[ \t]*$"#).unwrap());
static ANNOUNCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?ms)^[ \t]*ANNOUNCE=[ \t]*"(.*?)""#).unwrap());
static INHERIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^inherit(.*)$").unwrap());
static CROSS_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^CROSS_HOST[ \t]*=[ \t]*"?(.*?)"?[ \t]*$"#).unwrap());

/// Extract literal assignments from raw script text.
pub fn extract(content: &str) -> ScriptVars {
    // fold line continuations, then drop whole-line comments
    let folded = content.replace("\\\n", "");
    let content: String = folded
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let mut vars = ScriptVars::default();

    for captures in REQUIRES_RE.captures_iter(&content) {
        let value = captures[2].to_string();
        match &captures[1] {
            "DEPEND" => vars.depend.push(value),
            _ => vars.build_requires.push(value),
        }
    }

    if let Some(captures) = ARCH_RE.captures(&content) {
        vars.arch = Some(captures[1].to_string());
    }
    if let Some(captures) = RESTRICT_RE.captures(&content) {
        vars.restrict = captures[1]
            .split_whitespace()
            .map(str::to_string)
            .collect();
    }
    if let Some(captures) = TOKENS_RE.captures(&content) {
        vars.tokens = TokenSet::parse(&captures[1]);
    }
    if let Some(captures) = ANNOUNCE_RE.captures(&content) {
        vars.announce = Some(captures[1].to_string());
    }
    for captures in INHERIT_RE.captures_iter(&content) {
        vars.inherits
            .extend(captures[1].split_whitespace().map(str::to_string));
    }
    if let Some(captures) = CROSS_HOST_RE.captures(&content) {
        let host = captures[1].trim();
        if !host.is_empty() {
            vars.cross_host = Some(host.to_string());
        }
    }

    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_accumulates_and_flags_depend() {
        let vars = extract(
            "BUILD_REQUIRES=\"foo bar\"\nBUILD_REQUIRES+=\"baz\"\nDEPEND=\"pkgconfig(zlib)\"\n",
        );
        assert_eq!(vars.build_requires, vec!["foo bar", "baz"]);
        assert_eq!(vars.depend, vec!["pkgconfig(zlib)"]);
    }

    #[test]
    fn continuations_are_folded() {
        let vars = extract("BUILD_REQUIRES=\"foo \\\n    bar\"\n");
        assert_eq!(vars.build_requires, vec!["foo     bar"]);
    }

    #[test]
    fn comments_do_not_contribute() {
        let vars = extract("# ARCH=\"i686\"\nARCH=\"x86_64\"\n");
        assert_eq!(vars.arch.as_deref(), Some("x86_64"));
    }

    #[test]
    fn inherit_lines_accumulate() {
        let vars = extract("inherit meson\ninherit python3 ninja\n");
        assert!(vars.inherits.contains("meson"));
        assert!(vars.inherits.contains("python3"));
        assert!(vars.inherits.contains("ninja"));
    }

    #[test]
    fn unquoted_arch_and_restrict() {
        let vars = extract("ARCH=noarch\nRESTRICT=deploy\nTOKENS=nodeploy\n");
        assert_eq!(vars.arch.as_deref(), Some("noarch"));
        assert!(vars.restrict.contains("deploy"));
        assert!(vars.tokens.contains("nodeploy"));
    }

    #[test]
    fn cross_host_is_extracted() {
        let vars = extract("inherit cross\nCROSS_HOST=\"x86_64-w64-mingw32\"\n");
        assert_eq!(vars.cross_host.as_deref(), Some("x86_64-w64-mingw32"));
    }

    #[test]
    fn interpolation_is_not_evaluated() {
        // strict approximation: the literal text is all we see
        let vars = extract("BUILD_REQUIRES=\"${MY_DEPS}\"\n");
        assert_eq!(vars.build_requires, vec!["${MY_DEPS}"]);
    }
}
