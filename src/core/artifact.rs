//! Typed outputs of a library build.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Kind of an installed artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    StaticLibrary,
    SharedLibrary,
    /// Windows `.lib` stub that links against a DLL.
    ImportLibrary,
    /// An include root.
    HeaderSet,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::StaticLibrary => write!(f, "static"),
            ArtifactKind::SharedLibrary => write!(f, "shared"),
            ArtifactKind::ImportLibrary => write!(f, "import"),
            ArtifactKind::HeaderSet => write!(f, "headers"),
        }
    }
}

/// One installed output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    /// Link name (`z` for `libz.a`), or the library name for header sets.
    pub name: String,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Artifact {
            kind,
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn is_library(&self) -> bool {
        self.kind != ArtifactKind::HeaderSet
    }
}

/// Artifacts grouped the way a host build consumes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryExports {
    /// Include roots.
    pub api: Vec<PathBuf>,
    /// Static libraries, import libraries, and shared objects linked directly.
    pub link: Vec<Artifact>,
    /// Shared objects and DLLs needed at run time.
    pub runtime: Vec<Artifact>,
}

impl LibraryExports {
    /// Group artifacts into api / link / runtime.
    ///
    /// A shared library is a link input unless an import library with the
    /// same name stands in for it.
    pub fn from_artifacts(artifacts: &[Artifact]) -> Self {
        let import_names: BTreeSet<&str> = artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::ImportLibrary)
            .map(|a| a.name.as_str())
            .collect();

        let mut exports = LibraryExports::default();
        for artifact in artifacts {
            match artifact.kind {
                ArtifactKind::HeaderSet => exports.api.push(artifact.path.clone()),
                ArtifactKind::StaticLibrary | ArtifactKind::ImportLibrary => {
                    exports.link.push(artifact.clone())
                }
                ArtifactKind::SharedLibrary => {
                    if !import_names.contains(artifact.name.as_str()) {
                        exports.link.push(artifact.clone());
                    }
                    exports.runtime.push(artifact.clone());
                }
            }
        }
        exports
    }

    /// Directories holding link inputs, deduplicated in first-seen order.
    pub fn link_dirs(&self) -> Vec<PathBuf> {
        let mut seen = BTreeSet::new();
        self.link
            .iter()
            .filter_map(|a| a.path.parent())
            .filter(|dir| seen.insert(dir.to_path_buf()))
            .map(Path::to_path_buf)
            .collect()
    }

    /// `-I` flags for every include root.
    pub fn compile_flags(&self) -> Vec<String> {
        self.api
            .iter()
            .map(|dir| format!("-I{}", dir.display()))
            .collect()
    }

    /// `-L` flags for link directories followed by `-l` flags per link name.
    pub fn link_flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = self
            .link_dirs()
            .iter()
            .map(|dir| format!("-L{}", dir.display()))
            .collect();

        let mut names = BTreeSet::new();
        for artifact in &self.link {
            if names.insert(artifact.name.as_str()) {
                flags.push(format!("-l{}", artifact.name));
            }
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports_unix_shared() {
        let artifacts = vec![
            Artifact::new(ArtifactKind::HeaderSet, "zlib", "/p/include"),
            Artifact::new(ArtifactKind::StaticLibrary, "z", "/p/lib/libz.a"),
            Artifact::new(ArtifactKind::SharedLibrary, "z", "/p/lib/libz.so"),
        ];
        let exports = LibraryExports::from_artifacts(&artifacts);

        assert_eq!(exports.api, vec![PathBuf::from("/p/include")]);
        assert_eq!(exports.link.len(), 2);
        assert_eq!(exports.runtime.len(), 1);
        assert_eq!(exports.compile_flags(), vec!["-I/p/include"]);
        assert_eq!(exports.link_flags(), vec!["-L/p/lib", "-lz"]);
    }

    #[test]
    fn test_exports_windows_import_library() {
        let artifacts = vec![
            Artifact::new(ArtifactKind::ImportLibrary, "zlib", "/p/lib/zlib.lib"),
            Artifact::new(ArtifactKind::SharedLibrary, "zlib", "/p/bin/zlib.dll"),
        ];
        let exports = LibraryExports::from_artifacts(&artifacts);

        assert_eq!(exports.link.len(), 1);
        assert_eq!(exports.link[0].kind, ArtifactKind::ImportLibrary);
        assert_eq!(exports.runtime[0].path, PathBuf::from("/p/bin/zlib.dll"));
        assert_eq!(exports.link_dirs(), vec![PathBuf::from("/p/lib")]);
    }
}
