//! Error taxonomy for acquiring, building and caching libraries.
//!
//! All payloads are owned strings or paths so every error is `Clone`:
//! callers waiting on an in-flight build receive a copy of the leader's
//! error.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Number of trailing tool output lines kept in build errors.
pub const LOG_TAIL_LINES: usize = 40;

/// Phase of the external build tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    Configure,
    Build,
    Install,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPhase::Configure => write!(f, "configure"),
            BuildPhase::Build => write!(f, "build"),
            BuildPhase::Install => write!(f, "install"),
        }
    }
}

/// Failure to materialize a library's source tree.
#[derive(Debug, Clone, PartialEq, Error, MietteDiagnostic)]
pub enum AcquisitionError {
    #[error("source directory does not exist: {}", .path.display())]
    #[diagnostic(code(cmlink::acquire::missing_path))]
    MissingPath { path: PathBuf },

    #[error("no CMakeLists.txt in {}", .path.display())]
    #[diagnostic(
        code(cmlink::acquire::not_cmake),
        help("point the library at the directory containing the top-level CMakeLists.txt")
    )]
    NotCMakeProject { path: PathBuf },

    #[error("failed to download {url}: {message}")]
    #[diagnostic(code(cmlink::acquire::network))]
    Network { url: String, message: String },

    #[error("checksum mismatch for {url}")]
    #[diagnostic(code(cmlink::acquire::checksum))]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("failed to extract {url}: {message}")]
    #[diagnostic(code(cmlink::acquire::archive))]
    Archive { url: String, message: String },

    #[error("git operation failed for {url}: {message}")]
    #[diagnostic(code(cmlink::acquire::git))]
    Git { url: String, message: String },

    #[error("cannot fetch {url} in offline mode")]
    #[diagnostic(code(cmlink::acquire::offline))]
    Offline { url: String },

    #[error("no source acquirer handles {locator}")]
    #[diagnostic(code(cmlink::acquire::unsupported))]
    Unsupported { locator: String },

    #[error("I/O error at {}: {message}", .path.display())]
    #[diagnostic(code(cmlink::acquire::io))]
    Io { path: PathBuf, message: String },

    #[error("source acquisition was cancelled")]
    #[diagnostic(code(cmlink::acquire::cancelled))]
    Cancelled,
}

impl AcquisitionError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        AcquisitionError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            AcquisitionError::MissingPath { path } => diag
                .with_location(path.clone())
                .with_suggestion("Check the `path` of the library; relative paths resolve against the manifest directory"),
            AcquisitionError::NotCMakeProject { path } => diag
                .with_location(path.clone())
                .with_suggestion("Point the library at the directory containing the top-level CMakeLists.txt"),
            AcquisitionError::ChecksumMismatch {
                expected, actual, ..
            } => diag
                .with_context(format!("expected sha256 {}", expected))
                .with_context(format!("actual sha256   {}", actual))
                .with_suggestion("Verify the archive URL, then update `sha256` if the new archive is trusted"),
            AcquisitionError::Network { .. } | AcquisitionError::Git { .. } => {
                diag.with_suggestion(suggestions::FETCH_FAILED)
            }
            AcquisitionError::Offline { .. } => diag
                .with_suggestion("Disable `net.offline`, or switch the library to a local `path`"),
            _ => diag,
        }
    }
}

/// Failure of the external build tool.
#[derive(Debug, Clone, PartialEq, Error, MietteDiagnostic)]
pub enum BuildError {
    #[error("build tool `{tool}` not found")]
    #[diagnostic(code(cmlink::build::tool_not_found))]
    ToolNotFound { tool: String, hint: String },

    #[error("`{tool}` {found} is too old; {required} or newer is required")]
    #[diagnostic(code(cmlink::build::tool_too_old))]
    ToolTooOld {
        tool: String,
        found: String,
        required: String,
    },

    #[error("failed to start `{command}`: {message}")]
    #[diagnostic(code(cmlink::build::spawn))]
    Spawn { command: String, message: String },

    #[error("{phase} step failed with {}: `{command}`", exit_description(.code))]
    #[diagnostic(code(cmlink::build::tool_failed))]
    Failed {
        phase: BuildPhase,
        command: String,
        code: Option<i32>,
        log_tail: Vec<String>,
    },

    #[error("{phase} step timed out after {timeout_secs}s: `{command}`")]
    #[diagnostic(code(cmlink::build::timeout))]
    TimedOut {
        phase: BuildPhase,
        command: String,
        timeout_secs: u64,
        log_tail: Vec<String>,
    },

    #[error("{phase} step was cancelled")]
    #[diagnostic(code(cmlink::build::cancelled))]
    Cancelled { phase: BuildPhase },

    #[error("I/O error at {}: {message}", .path.display())]
    #[diagnostic(code(cmlink::build::io))]
    Io { path: PathBuf, message: String },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Keep the last [`LOG_TAIL_LINES`] lines of a tool log.
pub fn log_tail(log: &[String]) -> Vec<String> {
    let start = log.len().saturating_sub(LOG_TAIL_LINES);
    log[start..].to_vec()
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        BuildError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error came from a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled { .. })
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string());
        match self {
            BuildError::ToolNotFound { hint, .. } => {
                diag = diag.with_suggestion(hint.clone());
            }
            BuildError::ToolTooOld { .. } => {
                diag = diag.with_suggestion(suggestions::CMAKE_MISSING);
            }
            BuildError::Failed { log_tail, .. } | BuildError::TimedOut { log_tail, .. } => {
                for line in log_tail {
                    diag = diag.with_context(line.clone());
                }
                diag = diag.with_suggestion(suggestions::BUILD_FAILED);
            }
            _ => {}
        }
        diag
    }
}

/// Expected outputs are missing after a successful build.
#[derive(Debug, Clone, PartialEq, Error, MietteDiagnostic)]
#[error("`{library}` built successfully but is missing expected outputs: {}", .missing.join(", "))]
#[diagnostic(
    code(cmlink::artifacts::not_found),
    help("check the library's `targets` against what its install step produces")
)]
pub struct ArtifactNotFoundError {
    pub library: String,
    pub install_dir: PathBuf,
    pub missing: Vec<String>,
    pub found: Vec<String>,
}

impl ArtifactNotFoundError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string()).with_location(self.install_dir.clone());
        if self.found.is_empty() {
            diag = diag.with_context("the install prefix contains no libraries or headers");
        } else {
            diag = diag.with_context(format!("found: {}", self.found.join(", ")));
        }
        diag.with_suggestion("Adjust `targets` to match the installed link names (glob patterns are allowed)")
            .with_suggestion("Make sure the project defines install() rules for its libraries")
    }
}

/// A cache entry on disk cannot be trusted.
#[derive(Debug, Clone, PartialEq, Error, MietteDiagnostic)]
#[error("corrupt cache entry at {}: {reason}", .path.display())]
#[diagnostic(code(cmlink::cache::corrupt))]
pub struct CacheCorruptionError {
    pub path: PathBuf,
    pub reason: String,
}

impl CacheCorruptionError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CacheCorruptionError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::warning(self.to_string())
            .with_context("the entry will be rebuilt")
            .with_suggestion(suggestions::CACHE_DAMAGED)
    }
}

/// Invalid manifest or library descriptor.
#[derive(Debug, Clone, PartialEq, Error, MietteDiagnostic)]
pub enum DescriptorError {
    #[error("could not find `CMakeLibs.toml` in {} or any parent directory", .dir.display())]
    #[diagnostic(code(cmlink::manifest::not_found))]
    ManifestNotFound { dir: PathBuf },

    #[error("failed to parse {}: {message}", .path.display())]
    #[diagnostic(code(cmlink::manifest::parse))]
    Parse { path: PathBuf, message: String },

    #[error("invalid library `{library}`: {message}")]
    #[diagnostic(code(cmlink::manifest::invalid))]
    Invalid { library: String, message: String },

    #[error("`{library}` depends on unknown library `{dependency}`")]
    #[diagnostic(code(cmlink::manifest::unknown_dependency))]
    UnknownDependency { library: String, dependency: String },

    #[error("dependency cycle between libraries: {}", .libraries.join(" -> "))]
    #[diagnostic(code(cmlink::manifest::cycle))]
    Cycle { libraries: Vec<String> },

    #[error("no library named `{name}` in the manifest")]
    #[diagnostic(code(cmlink::manifest::unknown_library))]
    UnknownLibrary { name: String, available: Vec<String> },
}

impl DescriptorError {
    pub(crate) fn invalid(library: impl Into<String>, message: impl Into<String>) -> Self {
        DescriptorError::Invalid {
            library: library.into(),
            message: message.into(),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::error(self.to_string());
        match self {
            DescriptorError::ManifestNotFound { .. } => {
                diag.with_suggestion(suggestions::NO_MANIFEST)
            }
            DescriptorError::Parse { path, .. } => diag.with_location(path.clone()),
            DescriptorError::UnknownDependency { dependency, .. } => diag.with_suggestion(
                format!("Declare `[library.{}]` or remove it from `depends`", dependency),
            ),
            DescriptorError::Cycle { .. } => diag.with_suggestion(
                "Break the cycle by removing one of the `depends` entries",
            ),
            DescriptorError::UnknownLibrary { available, .. } => {
                let diag = if available.is_empty() {
                    diag
                } else {
                    diag.with_context(format!("available: {}", available.join(", ")))
                };
                diag.with_suggestion(suggestions::LIBRARY_NOT_FOUND)
            }
            DescriptorError::Invalid { .. } => diag,
        }
    }
}

/// Any failure while resolving a library.
#[derive(Debug, Clone, PartialEq, Error, MietteDiagnostic)]
pub enum LibraryError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ArtifactNotFound(#[from] ArtifactNotFoundError),

    #[error("cache I/O error at {}: {message}", .path.display())]
    #[diagnostic(code(cmlink::cache::io))]
    CacheIo { path: PathBuf, message: String },

    #[error("build of `{library}` was cancelled")]
    #[diagnostic(code(cmlink::cancelled))]
    Cancelled { library: String },
}

impl LibraryError {
    pub(crate) fn cache_io(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        LibraryError::CacheIo {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error came from a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        match self {
            LibraryError::Cancelled { .. } => true,
            LibraryError::Acquisition(AcquisitionError::Cancelled) => true,
            LibraryError::Build(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LibraryError::Descriptor(e) => e.to_diagnostic(),
            LibraryError::Acquisition(e) => e.to_diagnostic(),
            LibraryError::Build(e) => e.to_diagnostic(),
            LibraryError::ArtifactNotFound(e) => e.to_diagnostic(),
            LibraryError::CacheIo { path, .. } => Diagnostic::error(self.to_string())
                .with_location(path.clone())
                .with_suggestion(suggestions::CACHE_DAMAGED),
            LibraryError::Cancelled { .. } => Diagnostic::error(self.to_string()),
        }
    }
}
