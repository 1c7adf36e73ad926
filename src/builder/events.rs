//! Build event types for JSON output.
//!
//! This module defines the stable JSON schema for machine-readable build output.
//! These events are emitted when using `--message-format=json`.
//!
//! # Event Types
//!
//! - `build-started`: A manifest build began
//! - `library-started`: A library variant is being resolved
//! - `library-finished`: A library variant was resolved (built or cached) or failed
//! - `build-finished`: Build completed (success or failure)
//! - `diagnostic`: A warning or error not tied to a library
//!
//! # Stability
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use std::path::PathBuf;

use serde::Serialize;

/// A build event emitted during the build process.
///
/// Each event is serialized as a single JSON object per line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    /// Build started event with metadata.
    #[serde(rename = "build-started")]
    BuildStarted {
        /// Number of library variants to resolve
        library_count: u64,
        /// Cache root
        cache_dir: PathBuf,
    },

    /// Resolution of one library variant began.
    #[serde(rename = "library-started")]
    LibraryStarted {
        /// Variant identifier (e.g., "zlib/release")
        library_id: String,
        fingerprint: String,
    },

    /// Resolution of one library variant ended.
    #[serde(rename = "library-finished")]
    LibraryFinished {
        /// Variant identifier (e.g., "zlib/release")
        library_id: String,
        fingerprint: String,
        success: bool,
        /// Whether the result came from the cache without running the build tool
        fresh: bool,
        /// Install prefix
        #[serde(skip_serializing_if = "Option::is_none")]
        artifact_dir: Option<PathBuf>,
        /// Paths of the mapped artifacts
        #[serde(skip_serializing_if = "Vec::is_empty")]
        filenames: Vec<PathBuf>,
        /// Failure message
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Build completed (success or failure).
    #[serde(rename = "build-finished")]
    BuildFinished {
        /// Whether the build succeeded
        success: bool,
        /// Total build duration in milliseconds
        duration_ms: u64,
        /// Number of library variants resolved
        #[serde(skip_serializing_if = "Option::is_none")]
        libraries_built: Option<u64>,
    },

    /// A generic diagnostic message.
    #[serde(rename = "diagnostic")]
    Diagnostic {
        /// Severity level ("error", "warning", "note", "help")
        level: String,
        /// Message text
        message: String,
    },
}

impl BuildEvent {
    /// Create a build started event.
    pub fn started(library_count: usize, cache_dir: impl Into<PathBuf>) -> Self {
        BuildEvent::BuildStarted {
            library_count: library_count as u64,
            cache_dir: cache_dir.into(),
        }
    }

    /// Create a library started event.
    pub fn library_started(library_id: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        BuildEvent::LibraryStarted {
            library_id: library_id.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Create a library finished event for a resolved library.
    pub fn library_resolved(
        library_id: impl Into<String>,
        fingerprint: impl Into<String>,
        fresh: bool,
        artifact_dir: PathBuf,
        filenames: Vec<PathBuf>,
    ) -> Self {
        BuildEvent::LibraryFinished {
            library_id: library_id.into(),
            fingerprint: fingerprint.into(),
            success: true,
            fresh,
            artifact_dir: Some(artifact_dir),
            filenames,
            message: None,
        }
    }

    /// Create a library finished event for a failure.
    pub fn library_failed(
        library_id: impl Into<String>,
        fingerprint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        BuildEvent::LibraryFinished {
            library_id: library_id.into(),
            fingerprint: fingerprint.into(),
            success: false,
            fresh: false,
            artifact_dir: None,
            filenames: Vec::new(),
            message: Some(message.into()),
        }
    }

    /// Create a build finished event.
    pub fn finished(success: bool, duration_ms: u64, libraries_built: usize) -> Self {
        BuildEvent::BuildFinished {
            success,
            duration_ms,
            libraries_built: Some(libraries_built as u64),
        }
    }

    /// Create a diagnostic event.
    pub fn diagnostic(level: impl Into<String>, message: impl Into<String>) -> Self {
        BuildEvent::Diagnostic {
            level: level.into(),
            message: message.into(),
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_resolved_serialization() {
        let event = BuildEvent::library_resolved(
            "zlib/release",
            "ab12",
            true,
            PathBuf::from("/cache/ab12/install"),
            vec![PathBuf::from("/cache/ab12/install/lib/libz.a")],
        );
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"library-finished\""));
        assert!(json.contains("\"library_id\":\"zlib/release\""));
        assert!(json.contains("\"fresh\":true"));
        assert!(json.contains("libz.a"));
        assert!(!json.contains("\"message\""));
    }

    #[test]
    fn test_library_failed_serialization() {
        let event = BuildEvent::library_failed("zlib/release", "ab12", "configure step failed");
        let json = event.to_json();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"message\":\"configure step failed\""));
        assert!(!json.contains("filenames"));
    }

    #[test]
    fn test_finished_serialization() {
        let event = BuildEvent::finished(true, 2340, 3);
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"build-finished\""));
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"duration_ms\":2340"));
        assert!(json.contains("\"libraries_built\":3"));
    }

    #[test]
    fn test_diagnostic_serialization() {
        let json = BuildEvent::diagnostic("warning", "cache entry damaged").to_json();
        assert!(json.contains("\"reason\":\"diagnostic\""));
        assert!(json.contains("\"level\":\"warning\""));
    }
}
