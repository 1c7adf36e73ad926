//! Test fixtures: CMake project trees, git repositories, tarballs and a
//! scripted stand-in for the `cmake` executable.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Write a minimal installable CMake library project named `name` into `dir`.
pub fn write_cmake_project(dir: &Path, name: &str) {
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::create_dir_all(dir.join("include")).unwrap();
    std::fs::write(
        dir.join("CMakeLists.txt"),
        format!(
            r#"cmake_minimum_required(VERSION 3.16)
project({name} C)

add_library({name} src/{name}.c)
target_include_directories({name} PUBLIC include)

install(TARGETS {name} ARCHIVE DESTINATION lib LIBRARY DESTINATION lib RUNTIME DESTINATION bin)
install(FILES include/{name}.h DESTINATION include)
"#
        ),
    )
    .unwrap();
    std::fs::write(
        dir.join("src").join(format!("{name}.c")),
        format!("#include \"{name}.h\"\n\nint {name}_version(void) {{ return 1; }}\n"),
    )
    .unwrap();
    std::fs::write(
        dir.join("include").join(format!("{name}.h")),
        format!("#pragma once\n\nint {name}_version(void);\n"),
    )
    .unwrap();
}

/// Write `CMakeLibs.toml` into `dir` and return its path.
pub fn write_manifest(dir: &Path, content: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(crate::core::MANIFEST_FILE);
    std::fs::write(&path, content).unwrap();
    path
}

/// Stage every file in the work tree and commit it on HEAD.
pub fn commit_all(repo: &git2::Repository, message: &str) -> git2::Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("cmlink tests", "tests@cmlink.invalid").unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Build an in-memory `.tar.gz` from `(path, contents)` pairs.
pub fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }
    let mut encoder = builder.into_inner().unwrap();
    encoder.flush().unwrap();
    encoder.finish().unwrap()
}

/// Shell script standing in for `cmake`.
///
/// Every call appends its arguments to `invocations.log` next to the
/// script. Behavior is steered through the environment:
///
/// - `FAKE_CMAKE_VERSION`: reported by `--version` (default 3.28.1)
/// - `FAKE_CMAKE_FAIL`: `configure`, `build` or `install` exits non-zero
/// - `FAKE_CMAKE_SLEEP`: seconds the build step sleeps
/// - `FAKE_CMAKE_EMPTY`: install nothing
/// - `FAKE_CMAKE_LIB`: link name of the installed archive (default `z`)
#[cfg(unix)]
const FAKE_CMAKE: &str = r#"#!/bin/sh
here=$(dirname "$0")
echo "$*" >> "$here/invocations.log"
lib=${FAKE_CMAKE_LIB:-z}
header=${FAKE_CMAKE_LIB:-zlib}.h

case "$1" in
  --version)
    echo "cmake version ${FAKE_CMAKE_VERSION:-3.28.1}"
    echo ""
    echo "CMake suite maintained and supported by Kitware (kitware.com/cmake)."
    ;;
  --build)
    if [ -n "$FAKE_CMAKE_SLEEP" ]; then
      sleep "$FAKE_CMAKE_SLEEP"
    fi
    if [ "$FAKE_CMAKE_FAIL" = "build" ]; then
      echo "zlib.c:1: error: boom" >&2
      exit 2
    fi
    echo "[100%] Built target $lib"
    ;;
  --install)
    if [ "$FAKE_CMAKE_FAIL" = "install" ]; then
      echo "CMake Error: cannot install" >&2
      exit 3
    fi
    prefix=""
    while [ $# -gt 0 ]; do
      if [ "$1" = "--prefix" ]; then
        prefix="$2"
      fi
      shift
    done
    if [ -z "$FAKE_CMAKE_EMPTY" ]; then
      mkdir -p "$prefix/lib" "$prefix/include"
      echo "archive" > "$prefix/lib/lib$lib.a"
      echo "/* $lib */" > "$prefix/include/$header"
      echo "-- Installing: $prefix/lib/lib$lib.a"
    fi
    ;;
  *)
    if [ "$FAKE_CMAKE_FAIL" = "configure" ]; then
      echo "CMake Error: boom" >&2
      exit 1
    fi
    echo "-- Configuring done"
    echo "-- Generating done"
    ;;
esac
"#;

/// Install the fake `cmake` into `bin_dir` and return its path.
#[cfg(unix)]
pub fn fake_cmake(bin_dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(bin_dir).unwrap();
    let path = bin_dir.join("cmake");
    std::fs::write(&path, FAKE_CMAKE).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Argument lines recorded by the fake `cmake` in `bin_dir`, oldest first.
#[cfg(unix)]
pub fn invocations(bin_dir: &Path) -> Vec<String> {
    std::fs::read_to_string(bin_dir.join("invocations.log"))
        .map(|log| log.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cmake_project_layout() {
        let tmp = TempDir::new().unwrap();
        write_cmake_project(tmp.path(), "foo");
        let lists = std::fs::read_to_string(tmp.path().join("CMakeLists.txt")).unwrap();
        assert!(lists.contains("add_library(foo src/foo.c)"));
        assert!(tmp.path().join("include/foo.h").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_cmake_records_invocations() {
        let tmp = TempDir::new().unwrap();
        let bin = tmp.path().join("bin");
        let cmake = fake_cmake(&bin);

        let out = std::process::Command::new(&cmake)
            .arg("--version")
            .output()
            .unwrap();
        assert!(String::from_utf8_lossy(&out.stdout).starts_with("cmake version 3.28.1"));

        let prefix = tmp.path().join("prefix");
        let status = std::process::Command::new(&cmake)
            .args(["--install", "build", "--prefix"])
            .arg(&prefix)
            .status()
            .unwrap();
        assert!(status.success());
        assert!(prefix.join("lib/libz.a").is_file());
        assert!(prefix.join("include/zlib.h").is_file());

        let calls = invocations(&bin);
        assert_eq!(calls[0], "--version");
        assert!(calls[1].starts_with("--install build --prefix"));
    }
}
