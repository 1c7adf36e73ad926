//! High-level operations.
//!
//! This module contains the implementation of cmlink commands: resolving a
//! single library and building every library of a manifest.

pub mod cmlink_build;
pub mod plan;
pub mod resolve;

pub use cmlink_build::{build_manifest, load_plan, BuildOptions, ManifestBuild};
pub use plan::LibraryPlan;
pub use resolve::{resolve_library, ResolvedLibrary, Session};
