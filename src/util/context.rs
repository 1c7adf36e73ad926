//! Global context for cmlink operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use directories::ProjectDirs;

use crate::core::errors::DescriptorError;
use crate::core::manifest::MANIFEST_FILE;
use crate::util::config::{self, Config};

/// Project directories for cmlink
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("com", "cmlink", "cmlink"));

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Platform cache home for cmlink data
    home: PathBuf,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,

    /// Explicit cache root, overriding config and the platform default
    cache_override: Option<PathBuf>,
}

impl GlobalContext {
    /// Create a new GlobalContext with defaults.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;

        let home = if let Some(dirs) = PROJECT_DIRS.as_ref() {
            dirs.cache_dir().to_path_buf()
        } else {
            config::global_config_dir().unwrap_or_else(|| PathBuf::from(".cmlink"))
        };

        Ok(GlobalContext {
            cwd,
            home,
            verbose: false,
            color: true,
            cache_override: None,
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Use an explicit cache root.
    pub fn set_cache_dir(&mut self, dir: PathBuf) {
        self.cache_override = Some(dir);
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Default build cache root, used when nothing overrides it.
    pub fn default_cache_dir(&self) -> PathBuf {
        self.home.join("builds")
    }

    /// Resolve the build cache root: explicit override, then config, then default.
    pub fn cache_dir(&self, config: &Config) -> PathBuf {
        if let Some(dir) = &self.cache_override {
            return self.absolutize(dir);
        }
        if let Some(dir) = &config.cache.dir {
            return self.absolutize(dir);
        }
        self.default_cache_dir()
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        config::global_config_path().unwrap_or_else(|| self.home.join("config.toml"))
    }

    /// Get the project configuration file path for a project root.
    pub fn project_config_path(&self, project_root: &Path) -> PathBuf {
        config::project_config_path(project_root)
    }

    /// Load the merged global + project configuration.
    pub fn load_config(&self, project_root: &Path) -> Config {
        config::load_config(&self.config_path(), &self.project_config_path(project_root))
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Find `CMakeLibs.toml` starting from cwd and searching upward.
    pub fn find_manifest(&self) -> Result<PathBuf, DescriptorError> {
        let mut current = self.cwd.clone();
        loop {
            let candidate = current.join(MANIFEST_FILE);
            if candidate.is_file() {
                return Ok(candidate);
            }
            if !current.pop() {
                return Err(DescriptorError::ManifestNotFound {
                    dir: self.cwd.clone(),
                });
            }
        }
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_paths() {
        let ctx = GlobalContext::new().unwrap();
        assert!(ctx.cwd().is_absolute());
        assert!(ctx.default_cache_dir().ends_with("builds"));
    }

    #[test]
    fn test_find_manifest_searches_upward() {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join(MANIFEST_FILE);
        std::fs::write(&manifest, "[library.zlib]\npath = \"zlib\"\n").unwrap();
        let nested = tmp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = GlobalContext::with_cwd(nested).unwrap();
        assert_eq!(ctx.find_manifest().ok(), Some(manifest));
    }

    #[test]
    fn test_find_manifest_missing() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf()).unwrap();
        // A manifest further up the real filesystem would be found, so only
        // check the error shape when the search comes back empty.
        if let Err(err) = ctx.find_manifest() {
            assert!(matches!(err, DescriptorError::ManifestNotFound { .. }));
        }
    }

    #[test]
    fn test_cache_dir_precedence() {
        let tmp = TempDir::new().unwrap();
        let mut ctx = GlobalContext::with_cwd(tmp.path().to_path_buf()).unwrap();

        let mut config = Config::default();
        assert_eq!(ctx.cache_dir(&config), ctx.default_cache_dir());

        config.cache.dir = Some(PathBuf::from("relative-cache"));
        assert_eq!(ctx.cache_dir(&config), tmp.path().join("relative-cache"));

        ctx.set_cache_dir(PathBuf::from("/explicit"));
        assert_eq!(ctx.cache_dir(&config), PathBuf::from("/explicit"));
    }
}
