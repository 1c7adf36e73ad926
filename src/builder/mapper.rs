//! Artifact mapper: install prefix → typed artifacts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glob::Pattern;
use walkdir::WalkDir;

use crate::builder::file_api::{InstallableTarget, TargetType};
use crate::builder::util::extract_lib_name;
use crate::core::{Artifact, ArtifactKind, ArtifactNotFoundError, LibraryDescriptor};
use crate::util::fs::relative_path;

/// Install subdirectories scanned for libraries.
const LIBRARY_DIRS: &[&str] = &["lib", "lib64", "bin"];

/// Whether `file_name` is a versioned ELF shared object (`libz.so.1.3`).
fn is_versioned_so(file_name: &str) -> bool {
    match file_name.split_once(".so.") {
        Some((stem, version)) => {
            !stem.is_empty()
                && !version.is_empty()
                && version.chars().all(|c| c.is_ascii_digit() || c == '.')
        }
        None => false,
    }
}

/// Classify one file, before import-library resolution.
fn classify(file_name: &str) -> Option<ArtifactKind> {
    if file_name.ends_with(".dll.a") {
        return Some(ArtifactKind::ImportLibrary);
    }
    if is_versioned_so(file_name) {
        return Some(ArtifactKind::SharedLibrary);
    }
    let ext = Path::new(file_name).extension()?.to_str()?;
    match ext {
        "a" | "lib" => Some(ArtifactKind::StaticLibrary),
        "so" | "dylib" | "dll" => Some(ArtifactKind::SharedLibrary),
        _ => None,
    }
}

fn link_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    // MinGW import libraries: libz.dll.a → z
    match file_name.strip_suffix(".dll.a") {
        Some(stem) => extract_lib_name(Path::new(&format!("{}.a", stem))),
        None => extract_lib_name(path),
    }
}

/// Library files directly under `lib`, `lib64` and `bin`, in a stable order.
fn scan_libraries(install_dir: &Path) -> Vec<(PathBuf, ArtifactKind, String)> {
    let mut found = Vec::new();
    for dir in LIBRARY_DIRS {
        let dir = install_dir.join(dir);
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            // Follows symlinks: libz.so → libz.so.1.3 counts as a file.
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let (Some(kind), Some(name)) = (classify(file_name), link_name(path)) else {
                continue;
            };
            found.push((path.to_path_buf(), kind, name));
        }
    }
    found
}

/// Map the install prefix of a successful build to artifacts.
///
/// `targets` is the tool's report of installable targets, when available;
/// it decides whether a `.lib` is an import library and lets expected
/// names match CMake target names as well as link names.
pub fn map_artifacts(
    desc: &LibraryDescriptor,
    install_dir: &Path,
    targets: Option<&[InstallableTarget]>,
) -> Result<Vec<Artifact>, ArtifactNotFoundError> {
    let scanned = scan_libraries(install_dir);
    let targets = targets.unwrap_or_default();

    let dll_names: BTreeSet<&str> = scanned
        .iter()
        .filter(|(path, kind, _)| {
            *kind == ArtifactKind::SharedLibrary
                && path.extension().is_some_and(|e| e == "dll")
        })
        .map(|(_, _, name)| name.as_str())
        .collect();
    let shared_files: BTreeSet<&str> = targets
        .iter()
        .filter(|t| t.kind == TargetType::Shared)
        .flat_map(|t| t.artifacts.iter().map(String::as_str))
        .collect();

    let mut libraries: Vec<Artifact> = Vec::new();
    let mut seen = BTreeSet::new();
    for (path, kind, name) in &scanned {
        let mut kind = *kind;
        if kind == ArtifactKind::StaticLibrary && path.extension().is_some_and(|e| e == "lib") {
            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if dll_names.contains(name.as_str()) || shared_files.contains(file_name) {
                kind = ArtifactKind::ImportLibrary;
            }
        }
        // First file wins: libz.so before libz.so.1 before libz.so.1.3.
        if seen.insert((kind, name.clone())) {
            libraries.push(Artifact::new(kind, name.clone(), path.clone()));
        }
    }

    let include = install_dir.join("include");
    let headers = (include.is_dir() && !crate::util::fs::is_empty_dir(&include))
        .then(|| Artifact::new(ArtifactKind::HeaderSet, desc.name.clone(), include));

    let found: Vec<String> = libraries
        .iter()
        .map(|a| relative_path(install_dir, &a.path).display().to_string())
        .chain(headers.iter().map(|_| "include/".to_string()))
        .collect();
    let not_found = |missing: Vec<String>| ArtifactNotFoundError {
        library: desc.id(),
        install_dir: install_dir.to_path_buf(),
        missing,
        found: found.clone(),
    };

    let selected: Vec<Artifact> = if desc.targets.is_empty() {
        libraries
    } else {
        let mut missing = Vec::new();
        let mut keep = BTreeSet::new();
        for expected in &desc.targets {
            let matched: Vec<usize> = libraries
                .iter()
                .enumerate()
                .filter(|(_, a)| matches_expected(expected, a, targets))
                .map(|(i, _)| i)
                .collect();
            if matched.is_empty() {
                missing.push(expected.clone());
            }
            keep.extend(matched);
        }
        if !missing.is_empty() {
            return Err(not_found(missing));
        }
        libraries
            .into_iter()
            .enumerate()
            .filter(|(i, _)| keep.contains(i))
            .map(|(_, a)| a)
            .collect()
    };

    let mut artifacts: Vec<Artifact> = headers.into_iter().collect();
    artifacts.extend(selected);
    if artifacts.is_empty() {
        return Err(not_found(vec!["any library or header".to_string()]));
    }

    tracing::debug!("mapped {} artifact(s) for {}", artifacts.len(), desc.id());
    Ok(artifacts)
}

/// An expected name matches a link name, or a CMake target that produced the file.
fn matches_expected(expected: &str, artifact: &Artifact, targets: &[InstallableTarget]) -> bool {
    let matches = |candidate: &str| match Pattern::new(expected) {
        Ok(pattern) => pattern.matches(candidate),
        Err(_) => expected == candidate,
    };
    if matches(&artifact.name) {
        return true;
    }
    let Some(file_name) = artifact.path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    targets
        .iter()
        .filter(|t| t.artifacts.iter().any(|a| a == file_name))
        .any(|t| matches(&t.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SourceLocator;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    fn zlib() -> LibraryDescriptor {
        LibraryDescriptor::new(
            "zlib",
            SourceLocator::Path {
                path: "/src/zlib".into(),
            },
        )
    }

    fn kinds(artifacts: &[Artifact]) -> Vec<(ArtifactKind, &str)> {
        artifacts
            .iter()
            .map(|a| (a.kind, a.name.as_str()))
            .collect()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("libz.a"), Some(ArtifactKind::StaticLibrary));
        assert_eq!(classify("libz.so"), Some(ArtifactKind::SharedLibrary));
        assert_eq!(classify("libz.so.1.3"), Some(ArtifactKind::SharedLibrary));
        assert_eq!(classify("libz.1.dylib"), Some(ArtifactKind::SharedLibrary));
        assert_eq!(classify("zlib1.dll"), Some(ArtifactKind::SharedLibrary));
        assert_eq!(classify("libz.dll.a"), Some(ArtifactKind::ImportLibrary));
        assert_eq!(classify("zlib.pc"), None);
        assert_eq!(classify("libz.so.debug"), None);
    }

    #[test]
    fn test_maps_unix_install() {
        let tmp = TempDir::new().unwrap();
        let install = tmp.path();
        touch(install, "include/zlib.h");
        touch(install, "lib/libz.a");
        touch(install, "lib/libz.so.1.3");
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink("libz.so.1.3", install.join("lib/libz.so")).unwrap();
            std::os::unix::fs::symlink("libz.so.1.3", install.join("lib/libz.so.1")).unwrap();
        }
        touch(install, "lib/pkgconfig/zlib.pc");
        touch(install, "share/man/man3/zlib.3");

        let artifacts = map_artifacts(&zlib().with_targets(["z"]), install, None).unwrap();
        assert_eq!(
            kinds(&artifacts),
            vec![
                (ArtifactKind::HeaderSet, "zlib"),
                (ArtifactKind::StaticLibrary, "z"),
                (ArtifactKind::SharedLibrary, "z"),
            ]
        );
        assert_eq!(artifacts[0].path, install.join("include"));
        #[cfg(unix)]
        assert_eq!(artifacts[2].path, install.join("lib/libz.so"));
    }

    #[test]
    fn test_windows_import_library_from_sibling_dll() {
        let tmp = TempDir::new().unwrap();
        let install = tmp.path();
        touch(install, "bin/zlib.dll");
        touch(install, "lib/zlib.lib");
        touch(install, "lib/zlibstatic.lib");

        let artifacts = map_artifacts(&zlib(), install, None).unwrap();
        assert_eq!(
            kinds(&artifacts),
            vec![
                (ArtifactKind::ImportLibrary, "zlib"),
                (ArtifactKind::StaticLibrary, "zlibstatic"),
                (ArtifactKind::SharedLibrary, "zlib"),
            ]
        );
    }

    #[test]
    fn test_import_library_from_file_api() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "lib/zlib.lib");
        let targets = vec![InstallableTarget {
            name: "zlib".to_string(),
            kind: TargetType::Shared,
            artifacts: vec!["zlib.dll".to_string(), "zlib.lib".to_string()],
        }];

        let artifacts = map_artifacts(&zlib(), tmp.path(), Some(&targets)).unwrap();
        assert_eq!(kinds(&artifacts), vec![(ArtifactKind::ImportLibrary, "zlib")]);
    }

    #[test]
    fn test_expected_names_accept_globs_and_target_names() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "lib/libfoo_core.a");
        touch(tmp.path(), "lib/libfoo_util.a");
        touch(tmp.path(), "lib/libbar.a");

        let glob = map_artifacts(&zlib().with_targets(["foo_*"]), tmp.path(), None).unwrap();
        assert_eq!(glob.len(), 2);

        let targets = vec![InstallableTarget {
            name: "BarLibrary".to_string(),
            kind: TargetType::Static,
            artifacts: vec!["libbar.a".to_string()],
        }];
        let by_target =
            map_artifacts(&zlib().with_targets(["BarLibrary"]), tmp.path(), Some(&targets))
                .unwrap();
        assert_eq!(kinds(&by_target), vec![(ArtifactKind::StaticLibrary, "bar")]);
    }

    #[test]
    fn test_missing_expected_target() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "lib/libz.a");

        let err = map_artifacts(&zlib().with_targets(["z", "png"]), tmp.path(), None).unwrap_err();
        assert_eq!(err.missing, vec!["png".to_string()]);
        assert_eq!(err.found, vec![Path::new("lib").join("libz.a").display().to_string()]);
        assert_eq!(err.library, "zlib/release");
    }

    #[test]
    fn test_empty_install_is_not_found() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("include")).unwrap();

        let err = map_artifacts(&zlib(), tmp.path(), None).unwrap_err();
        assert!(err.found.is_empty());
    }

    #[test]
    fn test_headers_only_library() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "include/header_only.hpp");

        let artifacts = map_artifacts(&zlib(), tmp.path(), None).unwrap();
        assert_eq!(kinds(&artifacts), vec![(ArtifactKind::HeaderSet, "zlib")]);
    }
}
