//! Library descriptors.
//!
//! A `LibraryDescriptor` names one buildable variant of a native library:
//! where its source lives, how to configure it, and what it is expected
//! to produce. Descriptors are immutable once created; every field feeds
//! the cache fingerprint.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::DescriptorError;
use crate::core::target_machine::TargetMachine;
use crate::util::hash::is_sha256_hex;

/// Git reference types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "name")]
pub enum GitReference {
    /// Default branch (usually main or master)
    DefaultBranch,
    /// Specific branch
    Branch(String),
    /// Specific tag
    Tag(String),
    /// Specific commit
    Rev(String),
}

impl GitReference {
    /// Whether the reference always names the same commit.
    pub fn is_pinned(&self) -> bool {
        matches!(self, GitReference::Tag(_) | GitReference::Rev(_))
    }
}

impl fmt::Display for GitReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitReference::DefaultBranch => write!(f, "HEAD"),
            GitReference::Branch(b) => write!(f, "branch={}", b),
            GitReference::Tag(t) => write!(f, "tag={}", t),
            GitReference::Rev(r) => write!(f, "rev={}", r),
        }
    }
}

/// Where a library's source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum SourceLocator {
    /// A local directory, built in place (out of source).
    Path { path: PathBuf },

    /// A git repository checked out at a reference.
    Git { url: String, reference: GitReference },

    /// A `.tar.gz` archive verified against a SHA-256 digest.
    Archive {
        url: String,
        sha256: String,
        strip_prefix: Option<String>,
    },
}

impl SourceLocator {
    /// Short name of the locator kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceLocator::Path { .. } => "path",
            SourceLocator::Git { .. } => "git",
            SourceLocator::Archive { .. } => "archive",
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Path { path } => write!(f, "path+{}", path.display()),
            SourceLocator::Git { url, reference } => write!(f, "git+{}#{}", url, reference),
            SourceLocator::Archive { url, .. } => write!(f, "archive+{}", url),
        }
    }
}

/// CMake build type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildType {
    Debug,
    #[default]
    Release,
    RelWithDebInfo,
    MinSizeRel,
}

impl BuildType {
    /// Value for `CMAKE_BUILD_TYPE` and `--config`.
    pub fn cmake_name(&self) -> &'static str {
        match self {
            BuildType::Debug => "Debug",
            BuildType::Release => "Release",
            BuildType::RelWithDebInfo => "RelWithDebInfo",
            BuildType::MinSizeRel => "MinSizeRel",
        }
    }

    /// Name used as the first token of variant names.
    pub fn variant_name(&self) -> &'static str {
        match self {
            BuildType::Debug => "debug",
            BuildType::Release => "release",
            BuildType::RelWithDebInfo => "relWithDebInfo",
            BuildType::MinSizeRel => "minSizeRel",
        }
    }
}

impl FromStr for BuildType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "debug" => Ok(BuildType::Debug),
            "release" => Ok(BuildType::Release),
            "relwithdebinfo" => Ok(BuildType::RelWithDebInfo),
            "minsizerel" => Ok(BuildType::MinSizeRel),
            _ => Err(format!(
                "unknown build type `{}` (expected debug, release, relwithdebinfo or minsizerel)",
                s
            )),
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cmake_name())
    }
}

/// Value of a `-D` cache definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<String>),
}

impl OptionValue {
    /// Render for a CMake command line: bools as ON/OFF, lists `;`-joined.
    pub fn to_cmake(&self) -> String {
        match self {
            OptionValue::Bool(true) => "ON".to_string(),
            OptionValue::Bool(false) => "OFF".to_string(),
            OptionValue::Int(n) => n.to_string(),
            OptionValue::String(s) => s.clone(),
            OptionValue::List(items) => items.join(";"),
        }
    }

    /// Type tag, so `"1"` and `1` fingerprint differently.
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::String(_) => "string",
            OptionValue::List(_) => "list",
        }
    }
}

/// Options that control how a library is configured and built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub build_type: BuildType,
    /// `BUILD_SHARED_LIBS`; unset leaves the project default.
    pub shared: Option<bool>,
    /// `CMAKE_POSITION_INDEPENDENT_CODE`
    pub pic: bool,
    pub generator: Option<String>,
    pub defines: BTreeMap<String, OptionValue>,
    /// Raw configure arguments, appended verbatim.
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            build_type: BuildType::Release,
            shared: None,
            pic: true,
            generator: None,
            defines: BTreeMap::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

/// A named native library variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDescriptor {
    pub name: String,
    pub version: Option<String>,
    pub locator: SourceLocator,
    pub options: BuildOptions,
    /// Expected link names; glob patterns allowed.
    pub targets: Vec<String>,
    pub variant: String,
    /// Machine to build for; `None` means the host.
    pub target: Option<TargetMachine>,
    /// Names of libraries whose install prefixes this one builds against.
    pub depends: Vec<String>,
    /// Fingerprints of the dependency variants, keyed by library name.
    pub dependency_fingerprints: BTreeMap<String, String>,
}

impl LibraryDescriptor {
    /// Create a release descriptor with default options.
    pub fn new(name: impl Into<String>, locator: SourceLocator) -> Self {
        let options = BuildOptions::default();
        LibraryDescriptor {
            name: name.into(),
            version: None,
            locator,
            variant: options.build_type.variant_name().to_string(),
            options,
            targets: Vec::new(),
            target: None,
            depends: Vec::new(),
            dependency_fingerprints: BTreeMap::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Replace the build options. The variant name follows the build type
    /// unless it was set explicitly.
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        if self.variant == self.options.build_type.variant_name() {
            self.variant = options.build_type.variant_name().to_string();
        }
        self.options = options;
        self
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    pub fn with_target(mut self, target: TargetMachine) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependency_fingerprint(
        mut self,
        name: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        self.dependency_fingerprints
            .insert(name.into(), fingerprint.into());
        self
    }

    /// Unique key of this variant within a manifest: `name/variant`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.name, self.variant)
    }

    /// Check the descriptor for values no build could succeed with.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        validate_name(&self.name)?;

        if self.variant.is_empty() {
            return Err(DescriptorError::invalid(&self.name, "variant name is empty"));
        }

        match &self.locator {
            SourceLocator::Path { path } => {
                if path.as_os_str().is_empty() {
                    return Err(DescriptorError::invalid(&self.name, "`path` is empty"));
                }
            }
            SourceLocator::Git { url, reference } => {
                validate_url(&self.name, url, &["https", "http", "ssh", "git", "file"])?;
                if let GitReference::Rev(rev) = reference {
                    if rev.is_empty() || !rev.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(DescriptorError::invalid(
                            &self.name,
                            format!("git `rev` must be a commit hash, found `{}`", rev),
                        ));
                    }
                }
            }
            SourceLocator::Archive { url, sha256, .. } => {
                validate_url(&self.name, url, &["https", "http", "file"])?;
                if !is_sha256_hex(sha256) {
                    return Err(DescriptorError::invalid(
                        &self.name,
                        "`sha256` must be 64 hexadecimal characters",
                    ));
                }
            }
        }

        for key in self.options.defines.keys() {
            if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
                return Err(DescriptorError::invalid(
                    &self.name,
                    format!("invalid define name `{}`", key),
                ));
            }
        }

        for pattern in &self.targets {
            glob::Pattern::new(pattern).map_err(|e| {
                DescriptorError::invalid(
                    &self.name,
                    format!("invalid target pattern `{}`: {}", pattern, e),
                )
            })?;
        }

        for dep in &self.depends {
            if dep == &self.name {
                return Err(DescriptorError::Cycle {
                    libraries: vec![self.name.clone(), self.name.clone()],
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for LibraryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, " {}", version)?;
        }
        write!(f, " ({})", self.variant)
    }
}

/// Library names become directory and file name components.
pub fn validate_name(name: &str) -> Result<(), DescriptorError> {
    if name.is_empty() {
        return Err(DescriptorError::invalid(name, "library name is empty"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+')))
    {
        return Err(DescriptorError::invalid(
            name,
            format!("library name contains invalid character `{}`", c),
        ));
    }
    Ok(())
}

fn validate_url(library: &str, url: &str, schemes: &[&str]) -> Result<(), DescriptorError> {
    let parsed = url::Url::parse(url).map_err(|e| {
        DescriptorError::invalid(library, format!("invalid URL `{}`: {}", url, e))
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(DescriptorError::invalid(
            library,
            format!("unsupported URL scheme `{}` in `{}`", parsed.scheme(), url),
        ));
    }
    Ok(())
}
