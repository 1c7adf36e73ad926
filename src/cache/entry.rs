//! One cache entry: `<root>/<fingerprint>/{src, build, install, manifest.json}`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{BuildResult, CacheCorruptionError, LibraryDescriptor};
use crate::util::fs::{remove_dir_all_if_exists, remove_file_if_exists, write_atomic};

/// Version of the on-disk manifest layout.
pub const MANIFEST_FORMAT: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";

/// Present while a build is running or after one failed.
const INVALID_MARKER: &str = "INVALID";

/// What a finished build recorded about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryManifest {
    pub format: u32,
    pub descriptor: LibraryDescriptor,
    pub result: BuildResult,
}

impl EntryManifest {
    pub fn new(descriptor: LibraryDescriptor, result: BuildResult) -> Self {
        EntryManifest {
            format: MANIFEST_FORMAT,
            descriptor,
            result,
        }
    }
}

/// Paths of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    fingerprint: String,
    dir: PathBuf,
}

impl CacheEntry {
    pub fn new(root: &Path, fingerprint: &str) -> Self {
        CacheEntry {
            fingerprint: fingerprint.to_string(),
            dir: root.join(fingerprint),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Checkout or extraction target for fetched sources.
    pub fn src_dir(&self) -> PathBuf {
        self.dir.join("src")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.dir.join("build")
    }

    /// Install prefix; the artifact directory of the entry's result.
    pub fn install_dir(&self) -> PathBuf {
        self.dir.join("install")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    fn marker_path(&self) -> PathBuf {
        self.dir.join(INVALID_MARKER)
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn is_invalid(&self) -> bool {
        self.marker_path().exists()
    }

    /// Flag the entry as unusable until a build completes.
    pub fn mark_invalid(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        std::fs::write(self.marker_path(), b"")
            .with_context(|| format!("failed to write {}", self.marker_path().display()))
    }

    pub fn clear_invalid(&self) -> Result<()> {
        remove_file_if_exists(&self.marker_path())
    }

    /// Read the manifest; `Ok(None)` when there is none.
    pub fn load_manifest(&self) -> Result<Option<EntryManifest>, CacheCorruptionError> {
        let path = self.manifest_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheCorruptionError::new(&path, e.to_string())),
        };

        let manifest: EntryManifest = serde_json::from_str(&content)
            .map_err(|e| CacheCorruptionError::new(&path, format!("unreadable manifest: {}", e)))?;
        if manifest.format != MANIFEST_FORMAT {
            return Err(CacheCorruptionError::new(
                &path,
                format!("unsupported manifest format {}", manifest.format),
            ));
        }
        Ok(Some(manifest))
    }

    /// Check a loaded manifest against the entry it was found in.
    pub fn validate(&self, manifest: &EntryManifest) -> Result<(), CacheCorruptionError> {
        let path = self.manifest_path();
        let result = &manifest.result;

        if result.fingerprint != self.fingerprint {
            return Err(CacheCorruptionError::new(
                &path,
                format!("manifest records fingerprint {}", result.fingerprint),
            ));
        }
        if !result.success {
            return Err(CacheCorruptionError::new(&path, "manifest records a failed build"));
        }
        if result.artifact_dir != self.install_dir() {
            return Err(CacheCorruptionError::new(
                &path,
                format!(
                    "artifact directory {} is outside the entry",
                    result.artifact_dir.display()
                ),
            ));
        }
        if let Some(missing) = result.artifacts.iter().find(|a| !a.path.exists()) {
            return Err(CacheCorruptionError::new(
                &path,
                format!("artifact {} no longer exists", missing.path.display()),
            ));
        }
        Ok(())
    }

    /// Write the manifest atomically.
    pub fn store_manifest(&self, manifest: &EntryManifest) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest).context("failed to serialize manifest")?;
        write_atomic(&self.manifest_path(), &json)
    }

    /// Drop build outputs and the manifest; fetched sources are kept.
    pub fn reset(&self) -> Result<()> {
        remove_file_if_exists(&self.manifest_path())?;
        remove_dir_all_if_exists(&self.build_dir())?;
        remove_dir_all_if_exists(&self.install_dir())
    }

    /// Delete the whole entry.
    pub fn remove(&self) -> Result<()> {
        remove_dir_all_if_exists(&self.dir)
    }

    /// Disk usage in bytes.
    pub fn size(&self) -> u64 {
        crate::util::fs::dir_size(&self.dir)
    }
}
