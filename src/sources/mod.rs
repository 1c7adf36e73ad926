//! Library sources.
//!
//! Acquirers materialize a library's source tree from a local path, a git
//! repository or a source archive.

pub mod acquirers;
pub mod archive;
pub mod git;
pub mod path;
pub mod source;

pub use acquirers::{Acquirers, FetchOptions};
pub use archive::ArchiveAcquirer;
pub use git::GitAcquirer;
pub use path::PathAcquirer;
pub use source::{AcquiredSource, SourceAcquirer};
