//! cmlink - use any installable CMake library from a host build
//!
//! This crate provides the library functionality behind the `cmlink`
//! command: acquiring library sources, driving CMake through configure,
//! build and install, mapping the install prefix to typed artifacts, and
//! caching the whole pipeline per descriptor fingerprint.

pub mod builder;
pub mod cache;
pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

/// Test utilities for cmlink unit tests.
///
/// Only compiled for tests. Provides fixtures (CMake projects, git
/// repositories, tarballs, a fake `cmake`) and an in-process build tool.
#[cfg(test)]
pub mod test_support;

pub use builder::fingerprint::fingerprint;
pub use cache::{BuildCache, CacheStatus};
pub use core::{
    Artifact, ArtifactKind, BuildResult, LibraryDescriptor, LibraryError, LibraryExports, Manifest,
    SourceLocator,
};
pub use ops::{build_manifest, resolve_library, ResolvedLibrary, Session};
pub use util::context::GlobalContext;
