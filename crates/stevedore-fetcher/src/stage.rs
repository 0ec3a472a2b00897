//! Atomic staging-tree publication.
//!
//! The staging tree is shared with an external file watcher, so a
//! release directory must appear fully populated or not at all. The
//! bundle is unpacked into a dot-prefixed scratch directory next to
//! its final location (same filesystem), the readiness marker is
//! written inside it, and only then is the whole directory renamed
//! into place in one filesystem operation. The watcher can therefore
//! never observe a release directory without its marker.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::FetchResult;

/// Marker file the downstream indexer looks for.
pub const READY_MARKER: &str = "!ready";

fn arch_dir(root: &Path, job_id: i64, maintainer: &str, arch: &str) -> PathBuf {
    root.join(job_id.to_string()).join(maintainer).join(arch)
}

/// Final per-job/per-maintainer/per-arch location:
/// `<root>/<job-id>/<maintainer>/<arch>/release`.
pub fn release_dir(root: &Path, job_id: i64, maintainer: &str, arch: &str) -> PathBuf {
    arch_dir(root, job_id, maintainer, arch).join("release")
}

/// Whether this arch was already staged by an earlier pass.
pub fn already_staged(root: &Path, job_id: i64, maintainer: &str, arch: &str) -> bool {
    release_dir(root, job_id, maintainer, arch)
        .join(READY_MARKER)
        .exists()
}

/// Unpack `bundle` and publish it atomically.
pub fn publish(
    root: &Path,
    job_id: i64,
    maintainer: &str,
    arch: &str,
    bundle: &Path,
) -> FetchResult<()> {
    let parent = arch_dir(root, job_id, maintainer, arch);
    let dest = parent.join("release");
    std::fs::create_dir_all(&parent)?;

    // privately-named scratch sibling, guaranteed same filesystem
    let scratch = parent.join(format!(".release.{}", std::process::id()));
    if scratch.exists() {
        std::fs::remove_dir_all(&scratch)?;
    }

    unpack(bundle, &scratch)?;
    std::fs::File::create(scratch.join(READY_MARKER))?;

    // a marker-less dest can only be debris from an interrupted run
    if dest.exists() {
        std::fs::remove_dir_all(&dest)?;
    }
    std::fs::rename(&scratch, &dest)?;

    info!(job_id, arch, dest = %dest.display(), "artifacts staged");
    Ok(())
}

fn unpack(bundle: &Path, dest: &Path) -> FetchResult<()> {
    let file = std::fs::File::open(bundle)?;
    let mut archive = zip::ZipArchive::new(file)?;
    archive.extract(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "stevedore-stage-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_bundle(dir: &Path, members: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("bundle.zip");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn publish_places_contents_and_marker() {
        let root = scratch_root("publish");
        let bundle = write_bundle(&root, &[("zlib-1.3-1.tar.xz", "bits")]);

        publish(&root, 7, "jane", "x86_64", &bundle).unwrap();

        let release = release_dir(&root, 7, "jane", "x86_64");
        assert!(release.join("zlib-1.3-1.tar.xz").exists());
        assert!(release.join(READY_MARKER).exists());
        assert!(already_staged(&root, 7, "jane", "x86_64"));

        // no scratch directory left behind
        let parent = release.parent().unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(parent)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn a_visible_release_dir_always_has_its_marker() {
        // the watcher-facing guarantee: unpack failure must not leave
        // a marker-less release directory behind
        let root = scratch_root("atomic");
        let bundle = root.join("bundle.zip");
        std::fs::write(&bundle, b"this is not a zip").unwrap();

        assert!(publish(&root, 7, "jane", "x86_64", &bundle).is_err());
        assert!(!release_dir(&root, 7, "jane", "x86_64").exists());
    }

    #[test]
    fn republish_replaces_earlier_debris() {
        let root = scratch_root("republish");
        let bundle = write_bundle(&root, &[("pkg.tar.xz", "bits")]);

        // an interrupted attempt left a marker-less dest
        let release = release_dir(&root, 7, "jane", "x86_64");
        std::fs::create_dir_all(&release).unwrap();
        std::fs::write(release.join("stale"), b"junk").unwrap();

        publish(&root, 7, "jane", "x86_64", &bundle).unwrap();
        assert!(release.join("pkg.tar.xz").exists());
        assert!(release.join(READY_MARKER).exists());
        assert!(!release.join("stale").exists());
    }
}
