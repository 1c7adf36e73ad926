//! `CMakeLibs.toml` parsing and expansion into library descriptors.
//!
//! ```toml
//! [library.zlib]
//! version = "1.3"
//! archive = { url = "https://zlib.net/zlib-1.3.tar.gz", sha256 = "...", strip_prefix = "zlib-1.3" }
//! targets = ["z"]
//! build_types = ["release", "debug"]
//!
//! [library.zlib.options]
//! shared = true
//! defines = { ZLIB_BUILD_EXAMPLES = false }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::descriptor::{
    BuildOptions, BuildType, GitReference, LibraryDescriptor, OptionValue, SourceLocator,
};
use crate::core::errors::DescriptorError;
use crate::core::target_machine::TargetMachine;

/// File name of the project manifest.
pub const MANIFEST_FILE: &str = "CMakeLibs.toml";

/// A parsed `CMakeLibs.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub library: BTreeMap<String, LibrarySpec>,
}

/// One `[library.<name>]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibrarySpec {
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub git: Option<GitSpec>,
    pub archive: Option<ArchiveSpec>,
    pub targets: Vec<String>,
    pub build_types: Vec<String>,
    pub machines: Vec<String>,
    pub depends: Vec<String>,
    pub options: OptionsSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitSpec {
    pub url: String,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub rev: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSpec {
    pub url: String,
    pub sha256: String,
    pub strip_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsSpec {
    pub shared: Option<bool>,
    pub pic: Option<bool>,
    pub generator: Option<String>,
    pub defines: BTreeMap<String, OptionValue>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Manifest {
    /// Load and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let content = std::fs::read_to_string(path).map_err(|e| DescriptorError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    /// Parse manifest content; `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, DescriptorError> {
        toml::from_str(content).map_err(|e| DescriptorError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Library names in manifest order.
    pub fn library_names(&self) -> Vec<String> {
        self.library.keys().cloned().collect()
    }

    /// Expand every library into one descriptor per (build type, machine).
    ///
    /// Relative `path` sources resolve against `root`, the manifest directory.
    pub fn descriptors(&self, root: &Path) -> Result<Vec<LibraryDescriptor>, DescriptorError> {
        let mut out = Vec::new();
        for (name, spec) in &self.library {
            out.extend(spec.expand(name, root)?);
        }

        let names: BTreeSet<&str> = self.library.keys().map(String::as_str).collect();
        for desc in &out {
            for dep in &desc.depends {
                if !names.contains(dep.as_str()) {
                    return Err(DescriptorError::UnknownDependency {
                        library: desc.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        Ok(out)
    }
}

impl LibrarySpec {
    fn locator(&self, name: &str, root: &Path) -> Result<SourceLocator, DescriptorError> {
        let given = [self.path.is_some(), self.git.is_some(), self.archive.is_some()]
            .iter()
            .filter(|b| **b)
            .count();
        if given != 1 {
            return Err(DescriptorError::invalid(
                name,
                "exactly one of `path`, `git` or `archive` must be set",
            ));
        }

        if let Some(path) = &self.path {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                root.join(path)
            };
            return Ok(SourceLocator::Path { path });
        }

        if let Some(git) = &self.git {
            let refs = [&git.branch, &git.tag, &git.rev]
                .iter()
                .filter(|r| r.is_some())
                .count();
            if refs > 1 {
                return Err(DescriptorError::invalid(
                    name,
                    "at most one of `branch`, `tag` or `rev` may be set",
                ));
            }
            let reference = if let Some(branch) = &git.branch {
                GitReference::Branch(branch.clone())
            } else if let Some(tag) = &git.tag {
                GitReference::Tag(tag.clone())
            } else if let Some(rev) = &git.rev {
                GitReference::Rev(rev.clone())
            } else {
                GitReference::DefaultBranch
            };
            return Ok(SourceLocator::Git {
                url: git.url.clone(),
                reference,
            });
        }

        match &self.archive {
            Some(archive) => Ok(SourceLocator::Archive {
                url: archive.url.clone(),
                sha256: archive.sha256.to_ascii_lowercase(),
                strip_prefix: archive.strip_prefix.clone(),
            }),
            None => Err(DescriptorError::invalid(name, "missing source")),
        }
    }

    fn expand(&self, name: &str, root: &Path) -> Result<Vec<LibraryDescriptor>, DescriptorError> {
        let locator = self.locator(name, root)?;

        let mut build_types = Vec::new();
        for raw in &self.build_types {
            let bt: BuildType = raw
                .parse()
                .map_err(|e: String| DescriptorError::invalid(name, e))?;
            if !build_types.contains(&bt) {
                build_types.push(bt);
            }
        }
        if build_types.is_empty() {
            build_types.push(BuildType::Release);
        }

        let mut machines = Vec::new();
        for raw in &self.machines {
            let machine: TargetMachine = raw
                .parse()
                .map_err(|e: String| DescriptorError::invalid(name, e))?;
            if !machines.contains(&machine) {
                machines.push(machine);
            }
        }

        let multi_os = machines.iter().map(|m| m.os).collect::<BTreeSet<_>>().len() > 1;
        let multi_arch = machines.iter().map(|m| m.arch).collect::<BTreeSet<_>>().len() > 1;
        let machine_axis: Vec<Option<TargetMachine>> = if machines.is_empty() {
            vec![None]
        } else {
            machines.into_iter().map(Some).collect()
        };

        let mut out = Vec::new();
        for build_type in &build_types {
            for machine in &machine_axis {
                let options = BuildOptions {
                    build_type: *build_type,
                    shared: self.options.shared,
                    pic: self.options.pic.unwrap_or(true),
                    generator: self.options.generator.clone(),
                    defines: self.options.defines.clone(),
                    args: self.options.args.clone(),
                    env: self.options.env.clone(),
                };

                let mut desc = LibraryDescriptor::new(name, locator.clone())
                    .with_options(options)
                    .with_targets(self.targets.iter().cloned())
                    .with_depends(self.depends.iter().cloned())
                    .with_variant(variant_name(*build_type, machine.as_ref(), multi_os, multi_arch));
                desc.version = self.version.clone();
                desc.target = *machine;
                desc.validate()?;
                out.push(desc);
            }
        }
        Ok(out)
    }
}

/// Variant name: build type, then the capitalized OS and architecture only
/// when the library lists more than one of them.
pub fn variant_name(
    build_type: BuildType,
    machine: Option<&TargetMachine>,
    multi_os: bool,
    multi_arch: bool,
) -> String {
    let mut name = build_type.variant_name().to_string();
    if let Some(machine) = machine {
        if multi_os {
            name.push_str(&capitalize(machine.os.as_str()));
        }
        if multi_arch {
            name.push_str(&capitalize(machine.arch.as_str()));
        }
    }
    name
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
