//! Result of building one library variant.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::artifact::{Artifact, LibraryExports};

/// What a successful pipeline run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub success: bool,
    pub fingerprint: String,
    /// Install prefix holding every artifact.
    pub artifact_dir: PathBuf,
    /// Captured tool output, oldest first.
    pub log: Vec<String>,
    /// Installable targets reported by the build tool.
    pub targets: Vec<String>,
    pub artifacts: Vec<Artifact>,
    /// Freshness digest of the source at build time.
    pub source_digest: String,
    /// Precise git commit, or archive hash.
    pub source_revision: Option<String>,
    pub duration_ms: u64,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
}

impl BuildResult {
    /// Group the artifacts for consumption by a host build.
    pub fn exports(&self) -> LibraryExports {
        LibraryExports::from_artifacts(&self.artifacts)
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
