//! Variable values extracted from a build script.
//!
//! Both extraction strategies (external evaluator, static scan)
//! produce this one record; normalization and dependency derivation
//! never care where a value came from. The record is threaded as a
//! plain value, there is no process-global variable cache.

use std::collections::BTreeSet;

use stevedore_core::TokenSet;

/// Raw variable values from one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptVars {
    /// Accumulated `BUILD_REQUIRES` values (space-separated atoms).
    pub build_requires: Vec<String>,
    /// Accumulated values of the deprecated `DEPEND` variable.
    pub depend: Vec<String>,
    /// Raw `ARCH` value, unsplit.
    pub arch: Option<String>,
    /// Inherited build capabilities.
    pub inherits: BTreeSet<String>,
    /// Restriction flags.
    pub restrict: BTreeSet<String>,
    pub announce: Option<String>,
    /// Opt-in behavior tokens declared by the script.
    pub tokens: TokenSet,
    /// Cross-compilation target triple.
    pub cross_host: Option<String>,
}

/// Variable names requested from the external evaluator.
pub const DUMP_VARS: &[&str] = &[
    "BUILD_REQUIRES",
    "DEPEND",
    "ARCH",
    "INHERITED",
    "RESTRICT",
    "ANNOUNCE",
    "TOKENS",
    "CROSS_HOST",
];

/// Parse the evaluator's `NAME="value"` dump format.
///
/// Values are double-quoted and may span lines; shell escaping inside
/// the quotes is undone. Lines not matching the format (evaluator
/// chatter) are skipped.
pub fn parse_dump(output: &str) -> ScriptVars {
    let mut vars = ScriptVars::default();
    let mut rest = output;

    while let Some((name, value, remainder)) = next_assignment(rest) {
        rest = remainder;
        let value = unescape(value);
        match name {
            "BUILD_REQUIRES" => {
                if !value.is_empty() {
                    vars.build_requires.push(value);
                }
            }
            "DEPEND" => {
                if !value.is_empty() {
                    vars.depend.push(value);
                }
            }
            "ARCH" => vars.arch = Some(normalize_arch_value(&value)),
            "INHERITED" => {
                vars.inherits
                    .extend(value.split_whitespace().map(str::to_string));
            }
            "RESTRICT" => {
                vars.restrict
                    .extend(value.split_whitespace().map(str::to_string));
            }
            "ANNOUNCE" => {
                if !value.is_empty() {
                    vars.announce = Some(value);
                }
            }
            "TOKENS" => vars.tokens = TokenSet::parse(&value),
            "CROSS_HOST" => {
                if !value.is_empty() {
                    vars.cross_host = Some(value);
                }
            }
            _ => {}
        }
    }

    vars
}

/// Scan for the next `NAME="` at a line start and return the name, the
/// raw (still escaped) value, and the remaining input.
fn next_assignment(input: &str) -> Option<(&str, &str, &str)> {
    let mut offset = 0;
    for line in input.split_inclusive('\n') {
        if let Some(eq) = line.find("=\"") {
            let name = &line[..eq];
            if !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
            {
                let value_start = offset + eq + 2;
                if let Some(len) = find_closing_quote(&input[value_start..]) {
                    let value = &input[value_start..value_start + len];
                    return Some((name, value, &input[value_start + len + 1..]));
                }
            }
        }
        offset += line.len();
    }
    None
}

/// Length of the value up to (not including) the unescaped closing
/// quote, scanning across newlines.
fn find_closing_quote(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Undo double-quote shell escaping: backslash is special only before
/// `$`, `` ` ``, `"`, `\` and a newline (which it removes).
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('$') => out.push('$'),
            Some('`') => out.push('`'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// The evaluator's architecture probe occasionally leaks diagnostics
/// into the `ARCH` value; such a value is normalized to the
/// architecture-independent sentinel.
fn normalize_arch_value(value: &str) -> String {
    if value.contains('\n') || value.contains(':') {
        "all".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_values_are_unescaped() {
        let vars = parse_dump(
            "BUILD_REQUIRES=\"foo bar\"\nANNOUNCE=\"say \\\"hi\\\" to \\$USER\"\n",
        );
        assert_eq!(vars.build_requires, vec!["foo bar".to_string()]);
        assert_eq!(vars.announce.as_deref(), Some("say \"hi\" to $USER"));
    }

    #[test]
    fn multi_line_values_parse() {
        let vars = parse_dump("ANNOUNCE=\"line one\nline two\"\nARCH=\"x86_64\"\n");
        assert_eq!(vars.announce.as_deref(), Some("line one\nline two"));
        assert_eq!(vars.arch.as_deref(), Some("x86_64"));
    }

    #[test]
    fn evaluator_chatter_is_skipped() {
        let vars = parse_dump(
            ">>> preparing environment\nARCH=\"x86_64\"\nnot an assignment\nTOKENS=\"deploy\"\n",
        );
        assert_eq!(vars.arch.as_deref(), Some("x86_64"));
        assert!(vars.tokens.contains("deploy"));
    }

    #[test]
    fn leaked_probe_diagnostics_normalize_to_all() {
        let vars = parse_dump("ARCH=\"checking build system type: x86_64-pc-none\"\n");
        assert_eq!(vars.arch.as_deref(), Some("all"));

        let vars = parse_dump("ARCH=\"x86_64\nconfigure: loading site script\"\n");
        assert_eq!(vars.arch.as_deref(), Some("all"));
    }

    #[test]
    fn inherited_and_restrict_split_into_sets() {
        let vars = parse_dump("INHERITED=\"meson ninja\"\nRESTRICT=\"deploy strip\"\n");
        assert!(vars.inherits.contains("meson"));
        assert!(vars.inherits.contains("ninja"));
        assert!(vars.restrict.contains("deploy"));
        assert!(vars.restrict.contains("strip"));
    }
}
