//! Test utilities for cmlink unit tests.
//!
//! Besides the fixtures, this module provides [`StubTool`], an in-process
//! [`BuildTool`] that "installs" a fixed set of files without spawning
//! anything, so pipeline and cache tests can count external invocations.

pub mod fixtures;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::builder::{BuildContext, BuildTool, ToolOutcome};
use crate::core::{BuildError, BuildPhase, LibraryDescriptor};

pub use fixtures::*;

/// A build tool that writes files into the install prefix.
pub struct StubTool {
    files: Vec<(String, String)>,
    fail: Option<BuildPhase>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    contexts: Mutex<Vec<BuildContext>>,
}

impl StubTool {
    /// Install `(relative path, contents)` pairs on every run.
    pub fn installing(files: &[(&str, &str)]) -> Self {
        StubTool {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            fail: None,
            delay: None,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// `lib/libz.a` plus `include/zlib.h`.
    pub fn zlib() -> Self {
        Self::installing(&[("lib/libz.a", "archive"), ("include/zlib.h", "/* zlib */")])
    }

    /// Fail in `phase` with exit code 1.
    pub fn failing(phase: BuildPhase) -> Self {
        StubTool {
            fail: Some(phase),
            ..Self::installing(&[])
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `run` was entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Contexts passed to `run`, oldest first.
    pub fn contexts(&self) -> Vec<BuildContext> {
        self.contexts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl BuildTool for StubTool {
    fn name(&self) -> &str {
        "stub"
    }

    fn run(&self, ctx: &BuildContext, _desc: &LibraryDescriptor) -> Result<ToolOutcome, BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(ctx.clone());
        }

        if let Some(delay) = self.delay {
            let step = Duration::from_millis(10);
            let mut waited = Duration::ZERO;
            while waited < delay {
                if ctx.cancel.is_cancelled() {
                    return Err(BuildError::Cancelled {
                        phase: BuildPhase::Build,
                    });
                }
                std::thread::sleep(step);
                waited += step;
            }
        }
        if ctx.cancel.is_cancelled() {
            return Err(BuildError::Cancelled {
                phase: BuildPhase::Configure,
            });
        }

        if let Some(phase) = self.fail {
            return Err(BuildError::Failed {
                phase,
                command: "stub".to_string(),
                code: Some(1),
                log_tail: vec!["stub: failure requested".to_string()],
            });
        }

        for (rel, contents) in &self.files {
            let path = ctx.install_dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
            std::fs::write(&path, contents).map_err(|e| BuildError::io(&path, e))?;
        }

        Ok(ToolOutcome {
            log: vec!["stub: installed".to_string()],
            targets: None,
        })
    }
}
