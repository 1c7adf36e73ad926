//! Implementation of `cmlink build`.

use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::builder::fingerprint::fingerprint;
use crate::builder::BuildReporter;
use crate::core::{LibraryDescriptor, LibraryError, Manifest};
use crate::ops::plan::LibraryPlan;
use crate::ops::resolve::{resolve_library, ResolvedLibrary, Session};

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Libraries to build (empty = all); their dependencies are included
    pub libraries: Vec<String>,

    /// Discard cached results of the selected libraries first
    pub rebuild: bool,

    /// Libraries built at the same time (None = one per CPU)
    pub concurrency: Option<usize>,
}

/// Outcome of a manifest build.
#[derive(Debug, Default)]
pub struct ManifestBuild {
    /// Resolved libraries, dependencies first
    pub libraries: Vec<ResolvedLibrary>,

    /// Libraries that failed, by id
    pub failures: Vec<(String, LibraryError)>,

    /// Libraries not attempted because an earlier level failed
    pub skipped: Vec<String>,
}

impl ManifestBuild {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    /// Look up a resolved library by `name/variant` id.
    pub fn get(&self, id: &str) -> Option<&ResolvedLibrary> {
        self.libraries.iter().find(|l| l.descriptor.id() == id)
    }
}

/// Load a manifest and plan the selected libraries.
pub fn load_plan(manifest_path: &Path, libraries: &[String]) -> Result<LibraryPlan> {
    let manifest = Manifest::load(manifest_path)?;
    let root = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let descriptors = manifest.descriptors(root)?;
    let plan = LibraryPlan::new(descriptors, libraries)?;
    tracing::debug!(
        "planned {} librar{} in {} level(s)",
        plan.len(),
        if plan.len() == 1 { "y" } else { "ies" },
        plan.levels().len()
    );
    Ok(plan)
}

/// Build every library in `plan`, one dependency level at a time.
///
/// Libraries within a level run in parallel. A failure lets the rest of its
/// level finish, then skips every later level.
pub fn build_manifest(
    session: &Session,
    plan: &LibraryPlan,
    opts: &BuildOptions,
    reporter: &BuildReporter,
) -> Result<ManifestBuild> {
    if opts.rebuild {
        for desc in plan.descriptors() {
            session.cache().invalidate(&fingerprint(desc))?;
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.concurrency.unwrap_or(0))
        .build()
        .context("failed to start build threads")?;

    reporter.build_started(session.cache().root());
    let mut build = ManifestBuild::default();

    for (depth, level) in plan.levels().iter().enumerate() {
        if !build.failures.is_empty() || session.cancel_token().is_cancelled() {
            build.skipped.extend(level.iter().map(LibraryDescriptor::id));
            continue;
        }
        tracing::debug!("building level {} ({} libraries)", depth, level.len());

        let outcomes: Vec<(String, Result<ResolvedLibrary, LibraryError>)> = pool.install(|| {
            level
                .par_iter()
                .map(|desc| (desc.id(), resolve_one(session, desc, reporter)))
                .collect()
        });

        for (id, outcome) in outcomes {
            match outcome {
                Ok(library) => build.libraries.push(library),
                Err(e) => build.failures.push((id, e)),
            }
        }
    }

    reporter.finish(build.is_success());
    Ok(build)
}

fn resolve_one(
    session: &Session,
    desc: &LibraryDescriptor,
    reporter: &BuildReporter,
) -> Result<ResolvedLibrary, LibraryError> {
    let id = desc.id();
    let fp = fingerprint(desc);
    reporter.library_started(&id, &fp);

    let outcome = resolve_library(session, desc);
    match &outcome {
        Ok(library) => reporter.library_resolved(
            &id,
            &fp,
            library.is_fresh(),
            &library.result.artifact_dir,
            library
                .result
                .artifacts
                .iter()
                .map(|a| a.path.clone())
                .collect(),
        ),
        Err(e) => reporter.library_failed(&id, &fp, e),
    }
    outcome
}
