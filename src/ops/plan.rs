//! Dependency ordering of manifest libraries.
//!
//! Libraries form a DAG through `depends`. The plan groups descriptors into
//! levels: every descriptor's dependencies live in earlier levels, so each
//! level can be built in parallel once the previous one finished.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::builder::fingerprint::fingerprint;
use crate::core::{DescriptorError, LibraryDescriptor};

/// Descriptors in build order, with dependency fingerprints filled in.
#[derive(Debug, Clone, Default)]
pub struct LibraryPlan {
    levels: Vec<Vec<LibraryDescriptor>>,
}

impl LibraryPlan {
    /// Order `descriptors`, keeping only the libraries named in `filter` and
    /// everything they depend on. An empty filter keeps everything.
    pub fn new(
        descriptors: Vec<LibraryDescriptor>,
        filter: &[String],
    ) -> Result<Self, DescriptorError> {
        let selected: BTreeSet<String> = select(&descriptors, filter)?
            .into_iter()
            .map(str::to_string)
            .collect();
        let descriptors: Vec<LibraryDescriptor> = descriptors
            .into_iter()
            .filter(|d| selected.contains(d.name.as_str()))
            .collect();

        // Edges point from a dependency to its dependent.
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..descriptors.len()).map(|i| graph.add_node(i)).collect();
        for (i, desc) in descriptors.iter().enumerate() {
            for dep in &desc.depends {
                let j = dependency_variant(&descriptors, desc, dep)?;
                graph.update_edge(nodes[j], nodes[i], ());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| DescriptorError::Cycle {
            libraries: cycle_members(&graph, &descriptors, cycle.node_id()),
        })?;

        // Dependencies come first in `order`, so their own dependency
        // fingerprints are settled before they are hashed.
        let mut resolved: Vec<Option<LibraryDescriptor>> = vec![None; descriptors.len()];
        let mut level_of = vec![0usize; descriptors.len()];
        for node in &order {
            let i = graph[*node];
            let mut desc = descriptors[i].clone();
            desc.dependency_fingerprints.clear();
            for dep_node in graph.neighbors_directed(*node, Direction::Incoming) {
                let j = graph[dep_node];
                level_of[i] = level_of[i].max(level_of[j] + 1);
                if let Some(dep) = &resolved[j] {
                    desc = desc.with_dependency_fingerprint(&dep.name, fingerprint(dep));
                }
            }
            resolved[i] = Some(desc);
        }

        let depth = level_of.iter().max().map_or(0, |m| m + 1);
        let mut levels: Vec<Vec<LibraryDescriptor>> = vec![Vec::new(); depth];
        for (i, desc) in resolved.into_iter().enumerate() {
            if let Some(desc) = desc {
                levels[level_of[i]].push(desc);
            }
        }
        levels.retain(|l| !l.is_empty());

        Ok(LibraryPlan { levels })
    }

    pub fn levels(&self) -> &[Vec<LibraryDescriptor>] {
        &self.levels
    }

    /// All descriptors, dependencies first.
    pub fn descriptors(&self) -> impl Iterator<Item = &LibraryDescriptor> {
        self.levels.iter().flatten()
    }

    /// Look up a planned descriptor by `name/variant` id.
    pub fn get(&self, id: &str) -> Option<&LibraryDescriptor> {
        self.descriptors().find(|d| d.id() == id)
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Names of the requested libraries plus their transitive dependencies.
fn select<'a>(
    descriptors: &'a [LibraryDescriptor],
    filter: &[String],
) -> Result<BTreeSet<&'a str>, DescriptorError> {
    let available: BTreeSet<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
    if filter.is_empty() {
        return Ok(available);
    }

    let mut deps: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for desc in descriptors {
        deps.entry(desc.name.as_str())
            .or_default()
            .extend(desc.depends.iter().map(String::as_str));
    }

    let mut selected = BTreeSet::new();
    let mut stack = Vec::new();
    for name in filter {
        match available.get(name.as_str()) {
            Some(name) => stack.push(*name),
            None => {
                return Err(DescriptorError::UnknownLibrary {
                    name: name.clone(),
                    available: available.iter().map(|s| s.to_string()).collect(),
                })
            }
        }
    }
    while let Some(name) = stack.pop() {
        if selected.insert(name) {
            if let Some(children) = deps.get(name) {
                stack.extend(children.iter().copied());
            }
        }
    }
    Ok(selected)
}

/// Index of the variant of `dep` that `desc` builds against: the variant
/// with the same name, or the only variant there is.
fn dependency_variant(
    descriptors: &[LibraryDescriptor],
    desc: &LibraryDescriptor,
    dep: &str,
) -> Result<usize, DescriptorError> {
    let candidates: Vec<usize> = descriptors
        .iter()
        .enumerate()
        .filter(|(_, d)| d.name == dep)
        .map(|(i, _)| i)
        .collect();

    if let Some(&i) = candidates
        .iter()
        .find(|&&i| descriptors[i].variant == desc.variant)
    {
        return Ok(i);
    }
    match candidates.as_slice() {
        [only] => Ok(*only),
        [] => Err(DescriptorError::UnknownDependency {
            library: desc.name.clone(),
            dependency: dep.to_string(),
        }),
        _ => Err(DescriptorError::invalid(
            &desc.name,
            format!(
                "dependency `{}` has no `{}` variant to build against",
                dep, desc.variant
            ),
        )),
    }
}

/// Library names of the strongly connected component holding `node`.
fn cycle_members(
    graph: &DiGraph<usize, ()>,
    descriptors: &[LibraryDescriptor],
    node: NodeIndex,
) -> Vec<String> {
    let mut names: Vec<String> = tarjan_scc(graph)
        .into_iter()
        .find(|scc| scc.contains(&node))
        .unwrap_or_else(|| vec![node])
        .into_iter()
        .map(|n| descriptors[graph[n]].name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BuildOptions, BuildType, SourceLocator};

    fn lib(name: &str, depends: &[&str]) -> LibraryDescriptor {
        LibraryDescriptor::new(
            name,
            SourceLocator::Path {
                path: format!("/src/{}", name).into(),
            },
        )
        .with_depends(depends.iter().copied())
    }

    fn names(level: &[LibraryDescriptor]) -> Vec<&str> {
        let mut names: Vec<&str> = level.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_levels_follow_dependencies() {
        let plan = LibraryPlan::new(
            vec![
                lib("png", &["zlib"]),
                lib("zlib", &[]),
                lib("freetype", &["png", "zlib"]),
                lib("fmt", &[]),
            ],
            &[],
        )
        .unwrap();

        assert_eq!(plan.len(), 4);
        let levels = plan.levels();
        assert_eq!(levels.len(), 3);
        assert_eq!(names(&levels[0]), vec!["fmt", "zlib"]);
        assert_eq!(names(&levels[1]), vec!["png"]);
        assert_eq!(names(&levels[2]), vec!["freetype"]);
    }

    #[test]
    fn test_dependency_fingerprints_injected() {
        let plan = LibraryPlan::new(vec![lib("png", &["zlib"]), lib("zlib", &[])], &[]).unwrap();
        let zlib = plan.get("zlib/release").unwrap();
        let png = plan.get("png/release").unwrap();
        assert_eq!(
            png.dependency_fingerprints.get("zlib"),
            Some(&fingerprint(zlib))
        );

        // Changing the dependency changes the dependent's fingerprint.
        let mut options = BuildOptions::default();
        options.shared = Some(true);
        let changed = LibraryPlan::new(
            vec![lib("png", &["zlib"]), lib("zlib", &[]).with_options(options)],
            &[],
        )
        .unwrap();
        assert_ne!(
            fingerprint(png),
            fingerprint(changed.get("png/release").unwrap())
        );
    }

    #[test]
    fn test_cycle_rejected() {
        let err = LibraryPlan::new(
            vec![lib("a", &["b"]), lib("b", &["c"]), lib("c", &["a"]), lib("d", &[])],
            &[],
        )
        .unwrap_err();
        match err {
            DescriptorError::Cycle { libraries } => assert_eq!(libraries, vec!["a", "b", "c"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_filter_keeps_transitive_dependencies() {
        let plan = LibraryPlan::new(
            vec![
                lib("freetype", &["png"]),
                lib("png", &["zlib"]),
                lib("zlib", &[]),
                lib("fmt", &[]),
            ],
            &["png".to_string()],
        )
        .unwrap();
        let mut all: Vec<&str> = plan.descriptors().map(|d| d.name.as_str()).collect();
        all.sort();
        assert_eq!(all, vec!["png", "zlib"]);

        let err = LibraryPlan::new(vec![lib("zlib", &[])], &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, DescriptorError::UnknownLibrary { .. }));
    }

    #[test]
    fn test_variant_matching() {
        let debug = BuildOptions {
            build_type: BuildType::Debug,
            ..Default::default()
        };
        let plan = LibraryPlan::new(
            vec![
                lib("zlib", &[]),
                lib("zlib", &[]).with_options(debug.clone()),
                lib("png", &["zlib"]).with_options(debug),
            ],
            &[],
        )
        .unwrap();

        let png = plan.get("png/debug").unwrap();
        let zlib_debug = plan.get("zlib/debug").unwrap();
        assert_eq!(
            png.dependency_fingerprints.get("zlib"),
            Some(&fingerprint(zlib_debug))
        );

        // A single variant serves every dependent.
        let plan = LibraryPlan::new(
            vec![
                lib("zlib", &[]),
                lib("png", &["zlib"]).with_variant("debugLinux"),
            ],
            &[],
        )
        .unwrap();
        assert!(plan.get("png/debugLinux").is_some());

        let err = LibraryPlan::new(vec![lib("png", &["zlib"])], &[]).unwrap_err();
        assert!(matches!(err, DescriptorError::UnknownDependency { .. }));
    }
}
