//! User-friendly diagnostic messages.
//!
//! Every error shown to a user carries the failing command or file, the
//! relevant tool output, and at least one concrete next step.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when no manifest file is found.
    pub const NO_MANIFEST: &str = "help: Create a `CMakeLibs.toml` with one `[library.<name>]` table";

    /// Suggestion when a library name is not in the manifest.
    pub const LIBRARY_NOT_FOUND: &str =
        "help: Run `cmlink fingerprint` to list the libraries in the manifest";

    /// Suggestion when build fails.
    pub const BUILD_FAILED: &str = "help: Run `cmlink build --verbose` for the full tool output";

    /// Suggestion when CMake is missing.
    pub const CMAKE_MISSING: &str =
        "help: Install CMake 3.16 or newer, or point CMAKE_EXECUTABLE at it";

    /// Suggestion for fetch failures.
    pub const FETCH_FAILED: &str = "help: Check your network connection, or disable `net.offline`";

    /// Suggestion when a cache entry looks damaged.
    pub const CACHE_DAMAGED: &str = "help: Run `cmlink cache clean` to drop damaged entries";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
            Severity::Help => write!(f, "help"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Warning,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        // Severity prefix with optional color
        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
                Severity::Help => "\x1b[1;32mhelp\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
                Severity::Help => "help",
            }
        };

        // Main message
        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        // Location if present
        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        // Context lines
        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        // Suggestions
        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("`cmake --build` failed for zlib")
            .with_context("exit code 2")
            .with_context("zlib.c:12: error: expected ';'")
            .with_suggestion("Check the library's build options")
            .with_suggestion("Run `cmlink build --verbose zlib`");

        let output = diag.format(false);
        assert!(output.contains("error: `cmake --build` failed"));
        assert!(output.contains("  = exit code 2"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("2. Run `cmlink build"));
    }

    #[test]
    fn test_warning_with_location() {
        let diag = Diagnostic::warning("cache entry is damaged")
            .with_location("/cache/abc/manifest.json");

        let output = diag.format(false);
        assert!(output.starts_with("warning: cache entry is damaged"));
        assert!(output.contains("--> /cache/abc/manifest.json"));
        assert!(!output.contains("help:"));
    }

    #[test]
    fn test_colored_severity() {
        let output = Diagnostic::error("boom").format(true);
        assert!(output.contains("\x1b[1;31merror\x1b[0m"));
    }
}
