//! Core data structures for cmlink.
//!
//! - Library descriptors and their source locators
//! - The `CMakeLibs.toml` manifest
//! - Target machines
//! - Build results and typed artifacts
//! - The error taxonomy

pub mod artifact;
pub mod build_result;
pub mod descriptor;
pub mod errors;
pub mod manifest;
pub mod target_machine;

pub use artifact::{Artifact, ArtifactKind, LibraryExports};
pub use build_result::BuildResult;
pub use descriptor::{
    BuildOptions, BuildType, GitReference, LibraryDescriptor, OptionValue, SourceLocator,
};
pub use errors::{
    AcquisitionError, ArtifactNotFoundError, BuildError, BuildPhase, CacheCorruptionError,
    DescriptorError, LibraryError,
};
pub use manifest::{Manifest, MANIFEST_FILE};
pub use target_machine::{Architecture, OperatingSystem, TargetMachine};
