use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Path components matched against this list prune recursion (§4.5
/// `CreateReleaseTarball`).
const IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".env",
    ".env.local",
    "dist",
    ".next",
    "build",
    "target",
    ".idea",
    ".vscode",
];

const IGNORE_SUFFIXES: &[&str] = &[".pyc", ".pyo", ".DS_Store"];

fn is_ignored_component(name: &str) -> bool {
    IGNORE_PATTERNS.contains(&name) || IGNORE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Walk `project_root`, producing a gzipped tar at `output_path`. Any path
/// component matching the ignore list prunes recursion for directories or
/// skips the single file; stored paths are relative to `project_root` and
/// preserve file modes. Returns the SHA-256 hex digest of the finished
/// archive's bytes — the content address `UploadRelease` verifies against
/// after the copy lands on the remote host (§1, §4.5 `CreateReleaseTarball`).
pub fn create_release_tarball(project_root: &Path, output_path: &Path) -> Result<String> {
    let file = File::create(output_path)
        .map_err(|e| Error::TransportError(format!("failed to create tarball {}: {}", output_path.display(), e)))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let walker = WalkDir::new(project_root).into_iter().filter_entry(|entry| {
        entry
            .file_name()
            .to_str()
            .map(|name| !is_ignored_component(name))
            .unwrap_or(true)
    });

    for entry in walker {
        let entry = entry.map_err(|e| Error::TransportError(format!("walk failed: {}", e)))?;
        let path = entry.path();
        if path == project_root {
            continue;
        }
        let relative = path
            .strip_prefix(project_root)
            .map_err(|e| Error::TransportError(format!("path not under project root: {}", e)))?;

        if entry.file_type().is_dir() {
            builder
                .append_dir(relative, path)
                .map_err(|e| Error::TransportError(format!("failed to add dir {}: {}", relative.display(), e)))?;
        } else if entry.file_type().is_file() {
            let mut f = File::open(path)
                .map_err(|e| Error::TransportError(format!("failed to open {}: {}", path.display(), e)))?;
            builder
                .append_file(relative, &mut f)
                .map_err(|e| Error::TransportError(format!("failed to add file {}: {}", relative.display(), e)))?;
        }
    }

    builder
        .into_inner()
        .map_err(|e| Error::TransportError(format!("tar finish failed: {}", e)))?
        .finish()
        .map_err(|e| Error::TransportError(format!("gzip finish failed: {}", e)))?;

    let mut hasher = Sha256::new();
    let mut finished = File::open(output_path)
        .map_err(|e| Error::TransportError(format!("failed to reopen tarball {}: {}", output_path.display(), e)))?;
    let mut buf = [0u8; 65536];
    loop {
        let n = finished
            .read(&mut buf)
            .map_err(|e| Error::TransportError(format!("failed to hash tarball {}: {}", output_path.display(), e)))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn ignores_known_directories_and_suffixes() {
        assert!(is_ignored_component("node_modules"));
        assert!(is_ignored_component(".git"));
        assert!(is_ignored_component("foo.pyc"));
        assert!(!is_ignored_component("src"));
        assert!(!is_ignored_component("main.py"));
    }

    #[test]
    fn tarball_excludes_ignored_paths_and_preserves_included_files() {
        let project = tempdir().unwrap();
        fs::create_dir_all(project.path().join("src")).unwrap();
        fs::create_dir_all(project.path().join("node_modules/pkg")).unwrap();
        fs::write(project.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(project.path().join("node_modules/pkg/index.js"), "// dep").unwrap();
        fs::write(project.path().join("README.md"), "hello").unwrap();

        let out_dir = tempdir().unwrap();
        let tarball_path = out_dir.path().join("release.tar.gz");
        let digest = create_release_tarball(project.path(), &tarball_path).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));

        let tar_gz = File::open(&tarball_path).unwrap();
        let decoder = flate2::read::GzDecoder::new(tar_gz);
        let mut archive = tar::Archive::new(decoder);

        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();

        assert!(names.iter().any(|n| n.contains("src/main.rs") || n.contains("main.rs")));
        assert!(names.iter().any(|n| n.contains("README.md")));
        assert!(!names.iter().any(|n| n.contains("node_modules")));
    }

    #[test]
    fn digest_is_deterministic_for_identical_content() {
        let project = tempdir().unwrap();
        fs::write(project.path().join("app.txt"), "identical content").unwrap();

        let out_dir = tempdir().unwrap();
        let first_path = out_dir.path().join("first.tar.gz");
        let second_path = out_dir.path().join("second.tar.gz");

        let first_digest = create_release_tarball(project.path(), &first_path).unwrap();
        let second_digest = create_release_tarball(project.path(), &second_path).unwrap();

        assert_eq!(first_digest, second_digest);
    }
}
