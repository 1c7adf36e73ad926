//! Path source - libraries built from a local directory.

use std::path::Path;
use std::time::UNIX_EPOCH;

use walkdir::{DirEntry, WalkDir};

use crate::core::{AcquisitionError, SourceLocator};
use crate::sources::source::{check_cancelled, AcquiredSource, SourceAcquirer};
use crate::util::cancel::CancellationToken;
use crate::util::hash::Fingerprint;

/// Directory names never hashed into a path source digest.
const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn", ".cmlink"];

/// Builds a local directory in place. Nothing is copied.
#[derive(Debug, Default)]
pub struct PathAcquirer;

impl PathAcquirer {
    pub fn new() -> Self {
        PathAcquirer
    }

    fn validate(path: &Path) -> Result<(), AcquisitionError> {
        if !path.is_dir() {
            return Err(AcquisitionError::MissingPath {
                path: path.to_path_buf(),
            });
        }
        if !path.join("CMakeLists.txt").is_file() {
            return Err(AcquisitionError::NotCMakeProject {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// In-tree build directories are recognized by their `CMakeCache.txt`.
fn is_skipped(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() || entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    SKIPPED_DIRS.contains(&name.as_ref()) || entry.path().join("CMakeCache.txt").exists()
}

/// Hash of (relative path, size, mtime) for every file below `root`.
pub fn tree_digest(root: &Path) -> Result<String, AcquisitionError> {
    let mut fp = Fingerprint::new();
    fp.update_str("path-tree-v1");

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            AcquisitionError::io(path, e)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let meta = entry
            .metadata()
            .map_err(|e| AcquisitionError::io(entry.path(), e))?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());

        fp.update_str(&rel.to_string_lossy().replace('\\', "/"))
            .update_u64(meta.len())
            .update_u64(mtime);
    }

    Ok(fp.finish())
}

impl SourceAcquirer for PathAcquirer {
    fn name(&self) -> &str {
        "path"
    }

    fn supports(&self, locator: &SourceLocator) -> bool {
        matches!(locator, SourceLocator::Path { .. })
    }

    fn digest(&self, locator: &SourceLocator) -> Result<String, AcquisitionError> {
        let SourceLocator::Path { path } = locator else {
            return Err(AcquisitionError::Unsupported {
                locator: locator.to_string(),
            });
        };
        Self::validate(path)?;
        tree_digest(path)
    }

    fn acquire(
        &self,
        locator: &SourceLocator,
        _dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<AcquiredSource, AcquisitionError> {
        let SourceLocator::Path { path } = locator else {
            return Err(AcquisitionError::Unsupported {
                locator: locator.to_string(),
            });
        };
        check_cancelled(cancel)?;
        Self::validate(path)?;

        Ok(AcquiredSource {
            dir: crate::util::fs::normalize_path(path),
            revision: None,
            fetched: false,
        })
    }
}
