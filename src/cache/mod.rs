//! Fingerprint-keyed build cache.
//!
//! Each descriptor fingerprint owns one directory under the cache root. A
//! finished build leaves a `manifest.json` there; a running or failed one
//! leaves an `INVALID` marker. Concurrent requests for one fingerprint are
//! collapsed into a single build.

pub mod entry;
pub mod flight;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::builder::fingerprint::fingerprint;
use crate::core::{BuildResult, LibraryDescriptor, LibraryError};
use crate::util::hash::is_sha256_hex;

pub use entry::{CacheEntry, EntryManifest};
pub use flight::SingleFlight;

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Already resolved by this process.
    Memory,
    /// Reused from a manifest on disk.
    Disk,
    /// Produced by running the builder.
    Built,
}

impl CacheStatus {
    /// Whether the builder was skipped.
    pub fn is_fresh(&self) -> bool {
        !matches!(self, CacheStatus::Built)
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Memory => write!(f, "memory"),
            CacheStatus::Disk => write!(f, "disk"),
            CacheStatus::Built => write!(f, "built"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub result: Arc<BuildResult>,
    pub status: CacheStatus,
}

/// State of an entry as seen by `cmlink cache list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Ready,
    Invalid,
    Corrupt,
    /// No manifest yet, e.g. only fetched sources.
    Incomplete,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Ready => write!(f, "ready"),
            EntryState::Invalid => write!(f, "invalid"),
            EntryState::Corrupt => write!(f, "corrupt"),
            EntryState::Incomplete => write!(f, "incomplete"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub fingerprint: String,
    pub state: EntryState,
    /// Descriptor recorded by the last successful build.
    pub descriptor: Option<LibraryDescriptor>,
    pub size: u64,
}

type Outcome = Result<CacheLookup, LibraryError>;

/// The caching layer.
pub struct BuildCache {
    root: PathBuf,
    results: DashMap<String, Arc<BuildResult>>,
    flights: SingleFlight<String, Outcome>,
}

impl BuildCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BuildCache {
            root: root.into(),
            results: DashMap::new(),
            flights: SingleFlight::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry(&self, fingerprint: &str) -> CacheEntry {
        CacheEntry::new(&self.root, fingerprint)
    }

    /// Cached result for `desc`, or the result of running `builder` once.
    ///
    /// The source digest is not checked; see [`Self::get_or_build_with_digest`].
    pub fn get_or_build<F>(&self, desc: &LibraryDescriptor, builder: F) -> Outcome
    where
        F: FnOnce(&CacheEntry) -> Result<BuildResult, LibraryError>,
    {
        self.lookup(desc, None, builder)
    }

    /// Like [`Self::get_or_build`], but a cached result is only reused when
    /// it was built from a source with the same freshness digest.
    pub fn get_or_build_with_digest<F>(
        &self,
        desc: &LibraryDescriptor,
        digest: &str,
        builder: F,
    ) -> Outcome
    where
        F: FnOnce(&CacheEntry) -> Result<BuildResult, LibraryError>,
    {
        self.lookup(desc, Some(digest), builder)
    }

    fn memory_hit(&self, fp: &str, digest: Option<&str>) -> Option<CacheLookup> {
        let result = self.results.get(fp)?.clone();
        if digest.is_some_and(|d| d != result.source_digest) {
            return None;
        }
        Some(CacheLookup {
            result,
            status: CacheStatus::Memory,
        })
    }

    fn lookup<F>(&self, desc: &LibraryDescriptor, digest: Option<&str>, builder: F) -> Outcome
    where
        F: FnOnce(&CacheEntry) -> Result<BuildResult, LibraryError>,
    {
        let fp = fingerprint(desc);
        if let Some(hit) = self.memory_hit(&fp, digest) {
            return Ok(hit);
        }

        let (outcome, leader) = self
            .flights
            .run(&fp, || self.load_or_build(desc, &fp, digest, builder));
        if !leader {
            tracing::debug!("{} shared an in-flight build of {}", desc.id(), fp);
        }
        outcome
    }

    fn load_or_build<F>(
        &self,
        desc: &LibraryDescriptor,
        fp: &str,
        digest: Option<&str>,
        builder: F,
    ) -> Outcome
    where
        F: FnOnce(&CacheEntry) -> Result<BuildResult, LibraryError>,
    {
        // A flight that finished just before this one started.
        if let Some(hit) = self.memory_hit(fp, digest) {
            return Ok(hit);
        }

        let entry = self.entry(fp);
        if entry.is_invalid() {
            tracing::info!("discarding incomplete cache entry for {}", desc.id());
        } else {
            match entry.load_manifest() {
                Ok(Some(manifest)) => match entry.validate(&manifest) {
                    Ok(()) if digest.is_none_or(|d| d == manifest.result.source_digest) => {
                        tracing::debug!("reusing cached build of {} ({})", desc.id(), fp);
                        let result = Arc::new(manifest.result);
                        self.results.insert(fp.to_string(), result.clone());
                        return Ok(CacheLookup {
                            result,
                            status: CacheStatus::Disk,
                        });
                    }
                    Ok(()) => tracing::info!("source of {} changed, rebuilding", desc.id()),
                    Err(e) => tracing::warn!("{}", e),
                },
                Ok(None) => {}
                Err(e) => tracing::warn!("{}", e),
            }
        }

        self.results.remove(fp);
        let io = |e: anyhow::Error| LibraryError::cache_io(entry.dir(), format!("{:#}", e));
        entry.reset().map_err(io)?;
        entry.mark_invalid().map_err(io)?;

        // The marker stays behind on failure so the next request starts clean.
        let result = builder(&entry)?;

        entry
            .store_manifest(&EntryManifest::new(desc.clone(), result.clone()))
            .map_err(io)?;
        entry.clear_invalid().map_err(io)?;

        let result = Arc::new(result);
        self.results.insert(fp.to_string(), result.clone());
        Ok(CacheLookup {
            result,
            status: CacheStatus::Built,
        })
    }

    /// Freshness digest of the last successful build of `fingerprint`,
    /// from memory or from a valid entry on disk.
    pub fn built_digest(&self, fingerprint: &str) -> Option<String> {
        if let Some(result) = self.results.get(fingerprint) {
            return Some(result.source_digest.clone());
        }
        let entry = self.entry(fingerprint);
        if entry.is_invalid() {
            return None;
        }
        let manifest = entry.load_manifest().ok().flatten()?;
        entry.validate(&manifest).ok()?;
        Some(manifest.result.source_digest)
    }

    /// Force the next request for `fingerprint` to rebuild.
    pub fn invalidate(&self, fingerprint: &str) -> Result<(), LibraryError> {
        self.results.remove(fingerprint);
        let entry = self.entry(fingerprint);
        if entry.exists() {
            entry
                .mark_invalid()
                .map_err(|e| LibraryError::cache_io(entry.dir(), format!("{:#}", e)))?;
        }
        Ok(())
    }

    /// Delete one entry, including fetched sources.
    pub fn remove(&self, fingerprint: &str) -> Result<(), LibraryError> {
        self.results.remove(fingerprint);
        let entry = self.entry(fingerprint);
        entry
            .remove()
            .map_err(|e| LibraryError::cache_io(entry.dir(), format!("{:#}", e)))
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, LibraryError> {
        self.results.clear();
        let mut removed = 0;
        for fp in self.fingerprints()? {
            self.remove(&fp)?;
            removed += 1;
        }
        Ok(removed)
    }

    fn fingerprints(&self) -> Result<Vec<String>, LibraryError> {
        let dir = match std::fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LibraryError::cache_io(&self.root, e)),
        };

        let mut fingerprints: Vec<String> = dir
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| is_sha256_hex(name))
            .collect();
        fingerprints.sort();
        Ok(fingerprints)
    }

    /// Every entry under the root, sorted by fingerprint.
    pub fn entries(&self) -> Result<Vec<EntryInfo>, LibraryError> {
        let mut infos = Vec::new();
        for fp in self.fingerprints()? {
            let entry = self.entry(&fp);
            let (state, descriptor) = if entry.is_invalid() {
                (EntryState::Invalid, None)
            } else {
                match entry.load_manifest() {
                    Ok(Some(manifest)) => match entry.validate(&manifest) {
                        Ok(()) => (EntryState::Ready, Some(manifest.descriptor)),
                        Err(_) => (EntryState::Corrupt, Some(manifest.descriptor)),
                    },
                    Ok(None) => (EntryState::Incomplete, None),
                    Err(_) => (EntryState::Corrupt, None),
                }
            };
            infos.push(EntryInfo {
                size: entry.size(),
                fingerprint: fp,
                state,
                descriptor,
            });
        }
        Ok(infos)
    }

    /// Total disk usage of the cache.
    pub fn size(&self) -> u64 {
        crate::util::fs::dir_size(&self.root)
    }
}
