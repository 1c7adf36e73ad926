//! Build context - directories and limits for one external build.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::util::cancel::CancellationToken;

/// Everything a [`BuildTool`](crate::builder::cmake::BuildTool) needs besides
/// the descriptor.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Materialized source tree (the directory holding `CMakeLists.txt`)
    pub source_dir: PathBuf,

    /// Out-of-source build directory; every tool invocation runs here
    pub build_dir: PathBuf,

    /// Install prefix, the artifact directory of the result
    pub install_dir: PathBuf,

    /// Parallel jobs for the build step (None = tool default)
    pub jobs: Option<usize>,

    /// Per-invocation timeout
    pub timeout: Option<Duration>,

    /// Install prefixes of dependencies, passed as `CMAKE_PREFIX_PATH`
    pub prefix_path: Vec<PathBuf>,

    pub cancel: CancellationToken,
}

impl BuildContext {
    pub fn new(source_dir: PathBuf, build_dir: PathBuf, install_dir: PathBuf) -> Self {
        BuildContext {
            source_dir,
            build_dir,
            install_dir,
            jobs: None,
            timeout: None,
            prefix_path: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_prefix_path(mut self, prefix_path: Vec<PathBuf>) -> Self {
        self.prefix_path = prefix_path;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `CMAKE_PREFIX_PATH` value, `;`-separated as CMake expects.
    pub fn prefix_path_value(&self) -> Option<String> {
        if self.prefix_path.is_empty() {
            return None;
        }
        Some(
            self.prefix_path
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(";"),
        )
    }

    /// Stale configure cache from a previous run.
    pub fn cmake_cache(&self) -> PathBuf {
        self.build_dir.join("CMakeCache.txt")
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_path_value() {
        let ctx = BuildContext::new("/s".into(), "/b".into(), "/i".into());
        assert_eq!(ctx.prefix_path_value(), None);

        let ctx = ctx.with_prefix_path(vec!["/cache/a/install".into(), "/cache/b/install".into()]);
        assert_eq!(
            ctx.prefix_path_value().as_deref(),
            Some("/cache/a/install;/cache/b/install")
        );
        assert_eq!(ctx.cmake_cache(), PathBuf::from("/b/CMakeCache.txt"));
    }
}
