//! External build invocation and artifact mapping.
//!
//! This module drives CMake for one library (configure, build, install),
//! fingerprints descriptors, and maps an install prefix to typed artifacts.

pub mod cmake;
pub mod context;
pub mod events;
pub mod file_api;
pub mod fingerprint;
pub mod mapper;
pub mod progress;
pub mod toolchain;
pub mod util;

pub use cmake::{BuildTool, CMakeTool, ToolOutcome};
pub use context::BuildContext;
pub use events::BuildEvent;
pub use fingerprint::fingerprint;
pub use mapper::map_artifacts;
pub use progress::{BuildReporter, MessageFormat};
pub use toolchain::{ToolSettings, Toolchain};
