//! Configuration file support for cmlink.
//!
//! cmlink reads two configuration files:
//! - Global: `~/.cmlink/config.toml` - User-wide defaults
//! - Project: `.cmlink/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. Environment
//! variables (`CMAKE_EXECUTABLE`, `MAKE_EXECUTABLE`, `CMLINK_CACHE_DIR`)
//! take precedence over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming the CMake executable.
pub const CMAKE_EXECUTABLE_ENV: &str = "CMAKE_EXECUTABLE";

/// Environment variable naming the make executable used for generator detection.
pub const MAKE_EXECUTABLE_ENV: &str = "MAKE_EXECUTABLE";

/// Environment variable overriding the build cache root.
pub const CACHE_DIR_ENV: &str = "CMLINK_CACHE_DIR";

/// cmlink configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Network settings
    pub net: NetConfig,

    /// Cache settings
    pub cache: CacheConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Parallel jobs passed to `cmake --build --parallel` (None = tool default)
    pub jobs: Option<usize>,

    /// Per-invocation timeout for configure, build and install
    pub timeout_secs: Option<u64>,

    /// Default CMake generator when a library doesn't choose one
    pub generator: Option<String>,

    /// CMake executable (name looked up in PATH, or a path)
    pub cmake: Option<PathBuf>,

    /// make executable used to detect the makefile flavor
    pub make: Option<PathBuf>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Offline mode (don't fetch from network)
    pub offline: bool,

    /// HTTP timeout for archive downloads in seconds
    pub http_timeout_secs: Option<u64>,
}

/// Cache-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory of the build cache
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Build settings
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.timeout_secs.is_some() {
            self.build.timeout_secs = other.build.timeout_secs;
        }
        if other.build.generator.is_some() {
            self.build.generator = other.build.generator;
        }
        if other.build.cmake.is_some() {
            self.build.cmake = other.build.cmake;
        }
        if other.build.make.is_some() {
            self.build.make = other.build.make;
        }

        // Net settings
        if other.net.offline {
            self.net.offline = true;
        }
        if other.net.http_timeout_secs.is_some() {
            self.net.http_timeout_secs = other.net.http_timeout_secs;
        }

        // Cache settings
        if other.cache.dir.is_some() {
            self.cache.dir = other.cache.dir;
        }
    }

    /// Apply environment overrides using the given lookup.
    ///
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(cmake) = get(CMAKE_EXECUTABLE_ENV) {
            self.build.cmake = Some(PathBuf::from(cmake));
        }
        if let Some(make) = get(MAKE_EXECUTABLE_ENV) {
            self.build.make = Some(PathBuf::from(make));
        }
        if let Some(dir) = get(CACHE_DIR_ENV) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
    }

    /// Per-invocation tool timeout, if configured.
    pub fn build_timeout(&self) -> Option<Duration> {
        self.build.timeout_secs.map(Duration::from_secs)
    }

    /// HTTP timeout for archive downloads, if configured.
    pub fn http_timeout(&self) -> Option<Duration> {
        self.net.http_timeout_secs.map(Duration::from_secs)
    }
}

/// Load merged configuration from global and project locations, then apply
/// the process environment.
///
/// Order of precedence (highest to lowest):
/// 1. Environment variables
/// 2. Project config (.cmlink/config.toml)
/// 3. Global config (~/.cmlink/config.toml)
/// 4. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    // Load global config first
    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    // Project config overrides global
    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config.apply_env(|key| std::env::var(key).ok());
    config
}

/// Get the global cmlink config directory (~/.cmlink).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".cmlink"))
}

/// Get the global config path (~/.cmlink/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.cmlink/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".cmlink").join("config.toml")
}
