//! SourceAcquirer trait - common interface for all source strategies.

use std::path::{Path, PathBuf};

use crate::core::{AcquisitionError, SourceLocator};
use crate::util::cancel::CancellationToken;

/// A materialized source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredSource {
    /// Directory containing the top-level `CMakeLists.txt`.
    pub dir: PathBuf,
    /// Precise revision: git commit or archive hash.
    pub revision: Option<String>,
    /// False when an existing checkout was reused untouched.
    pub fetched: bool,
}

/// A strategy for turning a source locator into a source directory.
pub trait SourceAcquirer: Send + Sync {
    /// Get the acquirer name for display.
    fn name(&self) -> &str;

    /// Check if this acquirer handles the given locator.
    fn supports(&self, locator: &SourceLocator) -> bool;

    /// Cheap freshness digest of the source as it is now.
    ///
    /// A cached build is reused only while this value is unchanged.
    fn digest(&self, locator: &SourceLocator) -> Result<String, AcquisitionError>;

    /// Materialize the source, using `dest` as scratch space if the
    /// strategy needs a local copy. Must be a no-op when an unchanged copy
    /// already exists.
    fn acquire(
        &self,
        locator: &SourceLocator,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<AcquiredSource, AcquisitionError>;
}

/// Path of the stamp file recording what was materialized into `dest`.
pub(crate) fn stamp_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".stamp");
    dest.with_file_name(name)
}

pub(crate) fn read_stamp(dest: &Path) -> Option<String> {
    std::fs::read_to_string(stamp_path(dest))
        .ok()
        .map(|s| s.trim().to_string())
}

pub(crate) fn write_stamp(dest: &Path, contents: &str) -> Result<(), AcquisitionError> {
    let path = stamp_path(dest);
    crate::util::fs::write_atomic(&path, contents.as_bytes())
        .map_err(|e| AcquisitionError::io(&path, format!("{:#}", e)))
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), AcquisitionError> {
    if cancel.is_cancelled() {
        Err(AcquisitionError::Cancelled)
    } else {
        Ok(())
    }
}
