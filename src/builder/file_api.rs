//! CMake File API client.
//!
//! A `codemodel-v2` query is dropped into the build directory before
//! configure; CMake answers with a reply index pointing at the codemodel and
//! one JSON file per target. Only installable library targets are reported.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::BuildType;

/// Kind of an installable library target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Static,
    Shared,
}

/// A library target with `install()` rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallableTarget {
    pub name: String,
    pub kind: TargetType,
    /// File names of the target's build artifacts (`libz.so.1.3`, `zlib.lib`).
    pub artifacts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyIndex {
    reply: std::collections::BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    #[serde(rename = "jsonFile")]
    json_file: String,
}

#[derive(Debug, Deserialize)]
struct Codemodel {
    configurations: Vec<Configuration>,
}

#[derive(Debug, Deserialize)]
struct Configuration {
    name: String,
    #[serde(default)]
    targets: Vec<TargetRef>,
}

#[derive(Debug, Deserialize)]
struct TargetRef {
    #[serde(rename = "jsonFile")]
    json_file: String,
}

#[derive(Debug, Deserialize)]
struct TargetInfo {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    install: Option<serde_json::Value>,
    #[serde(default)]
    artifacts: Vec<ArtifactRef>,
}

#[derive(Debug, Deserialize)]
struct ArtifactRef {
    path: String,
}

fn api_dir(build_dir: &Path) -> PathBuf {
    build_dir.join(".cmake").join("api").join("v1")
}

/// Ask CMake to write a codemodel reply on the next configure.
pub fn write_codemodel_query(build_dir: &Path) -> Result<()> {
    let query_dir = api_dir(build_dir).join("query");
    std::fs::create_dir_all(&query_dir)
        .with_context(|| format!("failed to create {}", query_dir.display()))?;
    let query = query_dir.join("codemodel-v2");
    std::fs::write(&query, b"").with_context(|| format!("failed to write {}", query.display()))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Read the installable library targets from the latest reply.
///
/// Returns `None` when CMake wrote no reply (an older CMake, or a configure
/// that did not run). The configuration matching `build_type` is used, or
/// the first one for single-config generators.
pub fn read_installable_targets(
    build_dir: &Path,
    build_type: BuildType,
) -> Result<Option<Vec<InstallableTarget>>> {
    let reply_dir = api_dir(build_dir).join("reply");
    if !reply_dir.is_dir() {
        return Ok(None);
    }

    let mut indexes: Vec<PathBuf> = std::fs::read_dir(&reply_dir)
        .with_context(|| format!("failed to read {}", reply_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("index-") && n.ends_with(".json"))
        })
        .collect();
    indexes.sort();
    let Some(index_path) = indexes.pop() else {
        return Ok(None);
    };

    let index: ReplyIndex = read_json(&index_path)?;
    let Some(codemodel_ref) = index.reply.get("codemodel-v2") else {
        return Ok(None);
    };
    let codemodel_ref: ObjectRef = serde_json::from_value(codemodel_ref.clone())
        .with_context(|| format!("unexpected codemodel entry in {}", index_path.display()))?;
    let codemodel: Codemodel = read_json(&reply_dir.join(&codemodel_ref.json_file))?;

    let wanted = build_type.cmake_name();
    let Some(configuration) = codemodel
        .configurations
        .iter()
        .find(|c| c.name == wanted)
        .or_else(|| codemodel.configurations.first())
    else {
        return Ok(Some(Vec::new()));
    };

    let mut targets = Vec::new();
    for target_ref in &configuration.targets {
        let info: TargetInfo = read_json(&reply_dir.join(&target_ref.json_file))?;
        let kind = match info.kind.as_str() {
            "STATIC_LIBRARY" => TargetType::Static,
            "SHARED_LIBRARY" => TargetType::Shared,
            _ => continue,
        };
        if info.install.is_none() {
            continue;
        }

        let artifacts = info
            .artifacts
            .iter()
            .filter_map(|a| {
                Path::new(&a.path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .collect();
        targets.push(InstallableTarget {
            name: info.name,
            kind,
            artifacts,
        });
    }

    targets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Some(targets))
}
