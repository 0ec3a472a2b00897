//! Build-time dependency derivation.
//!
//! Dependencies come from two directions and are unioned: declared
//! dependency atoms (`BUILD_REQUIRES`/`DEPEND`) and inherited build
//! capabilities. All translation tables are static data.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::error::{AnalyzerError, AnalyzerResult};
use crate::vars::ScriptVars;

/// Capability name -> implied build-time packages.
const INHERIT_DEPS: &[(&[&str], &[&str])] = &[
    (&["cmake", "kde4", "qt4-cmake"], &["cmake"]),
    (&["gnome2"], &["gnome-common"]),
    (&["kf5"], &["cmake", "extra-cmake-modules"]),
    (&["mate"], &["mate-common"]),
    (&["meson"], &["meson", "pkg-config"]),
    (&["ninja"], &["ninja"]),
    (&["python2", "python"], &["python2"]),
    (&["python2-distutils"], &["python2-setuptools", "python2-devel"]),
    (&["python2-wheel", "python-wheel"], &["python2-wheel", "python2-pip"]),
    (&["python3"], &["python3"]),
    (&["python3-distutils"], &["python3-setuptools", "python3-devel"]),
    (
        &["python3-wheel", "python-wheel"],
        &["python36-wheel", "python36-pip", "python37-wheel", "python37-pip"],
    ),
    (&["texlive"], &["texlive-collection-basic"]),
    (&["xfce4"], &["xfce4-dev-tools"]),
    (&["xorg"], &["xorg-util-macros"]),
];

/// Cross-host target triple -> package-name prefix.
const CROSS_PREFIXES: &[(&str, &str)] = &[
    ("i686-w64-mingw32", "mingw64-i686-"),
    ("x86_64-w64-mingw32", "mingw64-x86_64-"),
];

/// Toolchain packages required for any cross build, named by prefixing.
const CROSS_TOOLS: &[&str] = &["binutils", "gcc-core", "gcc-g++", "pkg-config"];

/// pkg-config module file -> providing packages.
static PKGCONFIG_MAP: LazyLock<HashMap<&'static str, &'static [&'static str]>> =
    LazyLock::new(|| {
        let entries: &[(&str, &[&str])] = &[
            ("bzip2.pc", &["libbz2-devel"]),
            ("cairo.pc", &["libcairo-devel"]),
            ("expat.pc", &["libexpat-devel"]),
            ("fontconfig.pc", &["libfontconfig-devel"]),
            ("freetype2.pc", &["libfreetype-devel"]),
            ("gdk-pixbuf-2.0.pc", &["libgdk_pixbuf2.0-devel"]),
            ("gio-2.0.pc", &["libglib2.0-devel"]),
            ("glib-2.0.pc", &["libglib2.0-devel"]),
            ("gobject-2.0.pc", &["libglib2.0-devel"]),
            ("gtk+-3.0.pc", &["gtk3-devel"]),
            ("icu-uc.pc", &["libicu-devel"]),
            ("libcrypto.pc", &["openssl-devel"]),
            ("libcurl.pc", &["libcurl-devel"]),
            ("libffi.pc", &["libffi-devel"]),
            ("liblzma.pc", &["liblzma-devel"]),
            ("libpng.pc", &["libpng-devel"]),
            ("libpng16.pc", &["libpng-devel"]),
            ("libssl.pc", &["openssl-devel"]),
            ("libxml-2.0.pc", &["libxml2-devel"]),
            ("ncurses.pc", &["libncurses-devel"]),
            ("ncursesw.pc", &["libncurses-devel"]),
            ("openssl.pc", &["openssl-devel"]),
            ("pango.pc", &["libpango-devel"]),
            ("pcre.pc", &["libpcre-devel"]),
            ("readline.pc", &["libreadline-devel"]),
            ("sqlite3.pc", &["libsqlite3-devel"]),
            ("x11.pc", &["libX11-devel"]),
            ("zlib.pc", &["zlib-devel"]),
        ];
        entries.iter().copied().collect()
    });

static ATOM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*)\((.*)\)$").unwrap());

/// Derive packages from declared dependency atoms.
///
/// `deprecated` marks atoms that came from the legacy `DEPEND`
/// variable; they are still honored but flagged.
pub fn from_atoms(atoms: &str, deprecated: bool) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();

    for atom in atoms.split_whitespace() {
        if deprecated {
            info!(atom, "dependency declared via deprecated DEPEND");
        }
        let Some(captures) = ATOM_RE.captures(atom) else {
            // a bare atom is a literal package name
            deps.insert(atom.to_string());
            continue;
        };
        let kind = &captures[1];
        let module = &captures[2];
        match kind {
            "girepository" => {
                deps.insert(format!("girepository-{module}"));
            }
            "perl" => {
                deps.insert(format!("perl-{}", module.replace("::", "-")));
            }
            "pkgconfig" => {
                let file = format!("{module}.pc");
                match PKGCONFIG_MAP.get(file.as_str()) {
                    Some(packages) => {
                        debug!(module = %file, packages = ?packages, "pkgconfig module mapped");
                        deps.extend(packages.iter().map(|p| p.to_string()));
                    }
                    None => {
                        warn!(module = %file, "cannot map pkgconfig module to a package");
                    }
                }
                // a pkgconfig atom always implies the tool itself
                deps.insert("pkg-config".to_string());
            }
            "python" => {
                deps.insert(format!("python2-{module}"));
            }
            "python3" => {
                deps.insert(format!("python3-{module}"));
            }
            _ => {
                warn!(kind, module, "dependency atom of unhandled type");
            }
        }
    }

    deps
}

/// Derive packages implied by inherited capabilities.
///
/// An unknown cross-host triple is a hard error: guessing an empty
/// prefix would silently produce the wrong toolchain.
pub fn from_inherits(vars: &ScriptVars) -> AnalyzerResult<BTreeSet<String>> {
    let mut deps = BTreeSet::new();

    for (capabilities, packages) in INHERIT_DEPS {
        if capabilities.iter().any(|c| vars.inherits.contains(*c)) {
            deps.extend(packages.iter().map(|p| p.to_string()));
        }
    }

    // the default build system is autotools-style discovery
    if vars.inherits.contains("autotools") || vars.inherits.is_empty() {
        deps.insert("pkg-config".to_string());
    }

    if vars.inherits.contains("cross") {
        let host = vars
            .cross_host
            .as_deref()
            .ok_or(AnalyzerError::MissingCrossHost("cross"))?;
        let prefix = CROSS_PREFIXES
            .iter()
            .find(|(triple, _)| *triple == host)
            .map(|(_, prefix)| *prefix)
            .ok_or_else(|| AnalyzerError::UnknownCrossHost(host.to_string()))?;
        info!(cross_host = host, prefix, "cross toolchain resolved");
        deps.extend(CROSS_TOOLS.iter().map(|tool| format!("{prefix}{tool}")));
    }

    Ok(deps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars_with_inherits(inherits: &[&str]) -> ScriptVars {
        ScriptVars {
            inherits: inherits.iter().map(|s| s.to_string()).collect(),
            ..ScriptVars::default()
        }
    }

    #[test]
    fn bare_atoms_are_literal_packages() {
        let deps = from_atoms("foo bar", false);
        assert_eq!(deps, ["foo", "bar"].map(String::from).into());
    }

    #[test]
    fn typed_atoms_translate() {
        let deps = from_atoms("perl(XML::Parser) girepository(Gtk-3.0) python3(setuptools)", false);
        assert!(deps.contains("perl-XML-Parser"));
        assert!(deps.contains("girepository-Gtk-3.0"));
        assert!(deps.contains("python3-setuptools"));
    }

    #[test]
    fn pkgconfig_atoms_map_and_imply_the_tool() {
        let deps = from_atoms("pkgconfig(zlib)", false);
        assert!(deps.contains("zlib-devel"));
        assert!(deps.contains("pkg-config"));
    }

    #[test]
    fn unmapped_pkgconfig_module_is_omitted_not_fatal() {
        let deps = from_atoms("pkgconfig(no-such-module) foo", false);
        assert!(!deps.iter().any(|d| d.contains("no-such-module")));
        assert!(deps.contains("pkg-config"));
        assert!(deps.contains("foo"));
    }

    #[test]
    fn unknown_atom_type_is_dropped() {
        let deps = from_atoms("rubygem(rake)", false);
        assert!(deps.is_empty());
    }

    #[test]
    fn meson_implies_meson_and_pkg_config() {
        let deps = from_inherits(&vars_with_inherits(&["meson"])).unwrap();
        assert!(deps.contains("meson"));
        assert!(deps.contains("pkg-config"));
    }

    #[test]
    fn no_inherits_implies_the_discovery_baseline() {
        let deps = from_inherits(&ScriptVars::default()).unwrap();
        assert_eq!(deps, ["pkg-config"].map(String::from).into());
    }

    #[test]
    fn cross_prefixes_the_toolchain() {
        let mut vars = vars_with_inherits(&["cross"]);
        vars.cross_host = Some("x86_64-w64-mingw32".to_string());
        let deps = from_inherits(&vars).unwrap();
        for tool in ["binutils", "gcc-core", "gcc-g++", "pkg-config"] {
            assert!(deps.contains(&format!("mingw64-x86_64-{tool}")), "{tool}");
        }
    }

    #[test]
    fn unknown_cross_host_is_a_hard_error() {
        let mut vars = vars_with_inherits(&["cross"]);
        vars.cross_host = Some("sparc64-sun-solaris".to_string());
        assert!(matches!(
            from_inherits(&vars),
            Err(AnalyzerError::UnknownCrossHost(_))
        ));
    }

    #[test]
    fn cross_without_host_is_a_hard_error() {
        let vars = vars_with_inherits(&["cross"]);
        assert!(matches!(
            from_inherits(&vars),
            Err(AnalyzerError::MissingCrossHost(_))
        ));
    }
}
