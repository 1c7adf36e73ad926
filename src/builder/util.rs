//! Shared utilities for the builder module.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::util::process::ProcessBuilder;

static CMAKE_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"cmake version (\d+\.\d+(?:\.\d+)?)").ok());

/// Detect a tool's version by running it with `--version` and parsing the output.
///
/// # Example
/// ```ignore
/// let version = detect_tool_version(Path::new("cmake"), parse_cmake_version)?;
/// ```
pub fn detect_tool_version<F>(program: &Path, version_parser: F) -> Result<semver::Version>
where
    F: FnOnce(&str) -> Option<semver::Version>,
{
    let output = ProcessBuilder::new(program)
        .arg("--version")
        .exec()
        .with_context(|| format!("failed to run {} --version", program.display()))?;

    if !output.status.success() {
        bail!("{} --version failed", program.display());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);

    version_parser(&stdout).ok_or_else(|| {
        anyhow::anyhow!(
            "could not parse {} version from output: {}",
            program.display(),
            stdout
        )
    })
}

/// Parse the output of `cmake --version` ("cmake version 3.28.1-dirty").
pub fn parse_cmake_version(stdout: &str) -> Option<semver::Version> {
    let re = CMAKE_VERSION.as_ref()?;
    let captures = re.captures(stdout)?;
    parse_version_flexible(captures.get(1)?.as_str())
}

/// Parse a version string into semver::Version, handling incomplete versions.
///
/// Handles versions like "3.20.5", "3.28.0-rc1", or versions with only major.minor parts.
pub fn parse_version_flexible(version_str: &str) -> Option<semver::Version> {
    // Remove any suffix after the first non-version character
    let clean_version = version_str
        .trim()
        .split(|c: char| !c.is_ascii_digit() && c != '.')
        .next()
        .unwrap_or(version_str);

    if let Ok(v) = clean_version.parse() {
        return Some(v);
    }

    // Handle versions with less than 3 parts
    let parts: Vec<&str> = clean_version.split('.').collect();
    let major = parts.first().and_then(|s| s.parse().ok())?;
    let minor = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
    let patch = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);

    Some(semver::Version::new(major, minor, patch))
}

/// Extract the link name from a library file path.
///
/// - Strips the "lib" prefix (Unix): `libfoo.a` → `foo`
/// - Strips version suffixes: `libfoo.so.1.2.3` → `foo`
/// - Keeps Windows names: `zlib.lib` → `zlib`
pub fn extract_lib_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();

    let name = stem
        .strip_prefix("lib")
        .filter(|rest| !rest.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| stem.to_string());

    let name = name.split('.').next().unwrap_or(&name).to_string();

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cmake_version() {
        let out = "cmake version 3.28.1\n\nCMake suite maintained and supported by Kitware.\n";
        assert_eq!(parse_cmake_version(out), Some(semver::Version::new(3, 28, 1)));

        let dirty = "cmake version 3.20.5-dirty\n";
        assert_eq!(parse_cmake_version(dirty), Some(semver::Version::new(3, 20, 5)));

        assert_eq!(parse_cmake_version("make: GNU Make 4.3"), None);
    }

    #[test]
    fn test_parse_version_flexible() {
        assert_eq!(
            parse_version_flexible("3.16"),
            Some(semver::Version::new(3, 16, 0))
        );
        assert_eq!(
            parse_version_flexible("3.28.0-rc1"),
            Some(semver::Version::new(3, 28, 0))
        );
        assert_eq!(parse_version_flexible("abc"), None);
    }

    #[test]
    fn test_extract_lib_name() {
        assert_eq!(extract_lib_name(Path::new("libz.a")), Some("z".to_string()));
        assert_eq!(
            extract_lib_name(Path::new("libz.so.1.3")),
            Some("z".to_string())
        );
        assert_eq!(
            extract_lib_name(Path::new("libfoo.1.dylib")),
            Some("foo".to_string())
        );
        assert_eq!(
            extract_lib_name(Path::new("zlib.lib")),
            Some("zlib".to_string())
        );
        assert_eq!(
            extract_lib_name(Path::new("zlib1.dll")),
            Some("zlib1".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_detect_tool_version_from_script() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let script = tmp.path().join("cmake");
        std::fs::write(&script, "#!/bin/sh\necho 'cmake version 3.27.4'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let version = detect_tool_version(&script, parse_cmake_version).unwrap();
        assert_eq!(version, semver::Version::new(3, 27, 4));
    }
}
