//! Resolving one library: acquire, build, map, cache.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::builder::{map_artifacts, BuildContext, BuildTool, CMakeTool, ToolSettings};
use crate::cache::{BuildCache, CacheEntry, CacheStatus};
use crate::core::build_result::unix_now;
use crate::core::{BuildResult, LibraryDescriptor, LibraryError, LibraryExports};
use crate::sources::{Acquirers, FetchOptions};
use crate::util::cancel::CancellationToken;
use crate::util::config::Config;
use crate::util::hash::Fingerprint;

/// Shared state for resolving libraries: the cache, the source strategies
/// and the build tool.
pub struct Session {
    cache: Arc<BuildCache>,
    acquirers: Acquirers,
    tool: Arc<dyn BuildTool>,
    jobs: Option<usize>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(cache: Arc<BuildCache>, acquirers: Acquirers, tool: Arc<dyn BuildTool>) -> Self {
        Session {
            cache,
            acquirers,
            tool,
            jobs: None,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// The default session: CMake and the path, git and archive acquirers,
    /// configured from `config`.
    pub fn from_config(config: &Config, cache_dir: PathBuf) -> Self {
        let acquirers = Acquirers::with_defaults(FetchOptions {
            offline: config.net.offline,
            http_timeout: config.http_timeout(),
        });
        let tool = CMakeTool::new(ToolSettings::from_config(config));
        Session::new(Arc::new(BuildCache::new(cache_dir)), acquirers, Arc::new(tool))
            .with_jobs(config.build.jobs)
            .with_timeout(config.build_timeout())
    }

    /// Parallelism passed to the build step.
    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Limit for each external tool invocation.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn acquirers(&self) -> &Acquirers {
        &self.acquirers
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// A library ready to be consumed by a host build.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLibrary {
    pub descriptor: LibraryDescriptor,
    pub fingerprint: String,
    pub result: Arc<BuildResult>,
    pub status: CacheStatus,
}

impl ResolvedLibrary {
    pub fn exports(&self) -> LibraryExports {
        self.result.exports()
    }

    /// Whether the build tool was skipped.
    pub fn is_fresh(&self) -> bool {
        self.status.is_fresh()
    }
}

/// Resolve `desc` to its build result, building it at most once per
/// fingerprint.
pub fn resolve_library(
    session: &Session,
    desc: &LibraryDescriptor,
) -> Result<ResolvedLibrary, LibraryError> {
    desc.validate()?;
    if session.cancel.is_cancelled() {
        return Err(LibraryError::Cancelled { library: desc.id() });
    }

    let digest = freshness_digest(session, desc)?;
    let lookup = session
        .cache
        .get_or_build_with_digest(desc, &digest, |entry| {
            build_entry(session, desc, &digest, entry)
        })?;

    Ok(ResolvedLibrary {
        descriptor: desc.clone(),
        fingerprint: lookup.result.fingerprint.clone(),
        result: lookup.result,
        status: lookup.status,
    })
}

/// Digest deciding whether a cached build of `desc` is still current.
///
/// Covers the library's own source and, for each dependency, the digest
/// its cached build was made from. A dependency rebuilt from changed
/// sources keeps its fingerprint, so this is what makes its dependents
/// stale.
fn freshness_digest(session: &Session, desc: &LibraryDescriptor) -> Result<String, LibraryError> {
    let own = session.acquirers.digest(&desc.locator)?;
    if desc.dependency_fingerprints.is_empty() {
        return Ok(own);
    }

    let mut digest = Fingerprint::new();
    digest.update_str(&own);
    for (name, fp) in &desc.dependency_fingerprints {
        let built = session.cache.built_digest(fp);
        digest.update_str(name).update_opt(built.as_deref());
    }
    Ok(digest.finish())
}

fn build_entry(
    session: &Session,
    desc: &LibraryDescriptor,
    digest: &str,
    entry: &CacheEntry,
) -> Result<BuildResult, LibraryError> {
    let start = Instant::now();
    let source = session
        .acquirers
        .acquire(&desc.locator, &entry.src_dir(), &session.cancel)?;
    if source.fetched {
        tracing::debug!("fetched {} into {}", desc.locator, source.dir.display());
    }

    let prefix_path = desc
        .dependency_fingerprints
        .values()
        .map(|fp| session.cache.entry(fp).install_dir())
        .collect();
    let ctx = BuildContext::new(source.dir.clone(), entry.build_dir(), entry.install_dir())
        .with_jobs(session.jobs)
        .with_timeout(session.timeout)
        .with_prefix_path(prefix_path)
        .with_cancel(session.cancel.clone());

    tracing::debug!("building {} with `{}`", desc.id(), session.tool.name());
    let outcome = session.tool.run(&ctx, desc)?;
    let artifacts = map_artifacts(desc, &ctx.install_dir, outcome.targets.as_deref())?;

    let targets = match &outcome.targets {
        Some(targets) => targets.iter().map(|t| t.name.clone()).collect(),
        None => artifacts
            .iter()
            .filter(|a| a.is_library())
            .map(|a| a.name.clone())
            .collect(),
    };

    Ok(BuildResult {
        success: true,
        fingerprint: entry.fingerprint().to_string(),
        artifact_dir: entry.install_dir(),
        log: outcome.log,
        targets,
        artifacts,
        source_digest: digest.to_string(),
        source_revision: source.revision,
        duration_ms: start.elapsed().as_millis() as u64,
        created_at: unix_now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::fingerprint::fingerprint;
    use crate::cache::EntryState;
    use crate::core::{ArtifactKind, BuildError, BuildPhase, SourceLocator};
    use crate::test_support::{write_cmake_project, StubTool};
    use std::sync::Barrier;
    use tempfile::TempDir;

    fn stub_session(tmp: &TempDir, tool: Arc<StubTool>) -> Session {
        Session::new(
            Arc::new(BuildCache::new(tmp.path().join("cache"))),
            Acquirers::default(),
            tool,
        )
    }

    fn zlib(tmp: &TempDir) -> LibraryDescriptor {
        let src = tmp.path().join("zlib");
        if !src.exists() {
            write_cmake_project(&src, "zlib");
        }
        LibraryDescriptor::new("zlib", SourceLocator::Path { path: src }).with_targets(["z"])
    }

    #[test]
    fn test_resolve_builds_once() {
        let tmp = TempDir::new().unwrap();
        let tool = Arc::new(StubTool::zlib());
        let session = stub_session(&tmp, tool.clone());
        let desc = zlib(&tmp);

        let first = resolve_library(&session, &desc).unwrap();
        assert_eq!(first.status, CacheStatus::Built);
        assert_eq!(first.fingerprint, fingerprint(&desc));
        assert_eq!(first.result.targets, vec!["z"]);

        let exports = first.exports();
        assert_eq!(exports.api, vec![first.result.artifact_dir.join("include")]);
        assert_eq!(exports.link.len(), 1);
        assert_eq!(exports.link[0].kind, ArtifactKind::StaticLibrary);

        let second = resolve_library(&session, &desc).unwrap();
        assert!(second.is_fresh());
        assert_eq!(tool.calls(), 1);

        // A new process over the same cache directory.
        let tool2 = Arc::new(StubTool::zlib());
        let third = resolve_library(&stub_session(&tmp, tool2.clone()), &desc).unwrap();
        assert_eq!(third.status, CacheStatus::Disk);
        assert_eq!(tool2.calls(), 0);
    }

    #[test]
    fn test_source_change_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let tool = Arc::new(StubTool::zlib());
        let session = stub_session(&tmp, tool.clone());
        let desc = zlib(&tmp);

        resolve_library(&session, &desc).unwrap();
        std::fs::write(
            tmp.path().join("zlib/src/zlib.c"),
            "int zlib_version(void) { return 2; } /* changed */\n",
        )
        .unwrap();

        let again = resolve_library(&session, &desc).unwrap();
        assert_eq!(again.status, CacheStatus::Built);
        assert_eq!(tool.calls(), 2);
    }

    #[test]
    fn test_dependency_source_change_rebuilds_dependent() {
        let tmp = TempDir::new().unwrap();
        let tool = Arc::new(StubTool::zlib());
        let session = stub_session(&tmp, tool.clone());
        let zlib = zlib(&tmp);
        write_cmake_project(&tmp.path().join("png"), "png");
        let png = LibraryDescriptor::new(
            "png",
            SourceLocator::Path {
                path: tmp.path().join("png"),
            },
        )
        .with_targets(["z"])
        .with_dependency_fingerprint("zlib", fingerprint(&zlib));

        resolve_library(&session, &zlib).unwrap();
        resolve_library(&session, &png).unwrap();
        assert!(resolve_library(&session, &png).unwrap().is_fresh());
        assert_eq!(tool.calls(), 2);

        std::fs::write(
            tmp.path().join("zlib/include/zlib.h"),
            "#define ZLIB_VERSION \"1.3.1\"\n",
        )
        .unwrap();

        let zlib_again = resolve_library(&session, &zlib).unwrap();
        assert_eq!(zlib_again.status, CacheStatus::Built);
        let png_again = resolve_library(&session, &png).unwrap();
        assert_eq!(png_again.status, CacheStatus::Built);
        assert_eq!(png_again.fingerprint, fingerprint(&png));
        assert_eq!(tool.calls(), 4);

        // A new process sees the same state on disk.
        let tool2 = Arc::new(StubTool::zlib());
        let session2 = stub_session(&tmp, tool2.clone());
        resolve_library(&session2, &zlib).unwrap();
        assert_eq!(resolve_library(&session2, &png).unwrap().status, CacheStatus::Disk);
        assert_eq!(tool2.calls(), 0);
    }

    #[test]
    fn test_concurrent_resolves_share_one_build() {
        let tmp = TempDir::new().unwrap();
        let tool = Arc::new(StubTool::zlib().with_delay(Duration::from_millis(200)));
        let session = Arc::new(stub_session(&tmp, tool.clone()));
        let desc = zlib(&tmp);
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let session = session.clone();
                let desc = desc.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    resolve_library(&session, &desc).unwrap()
                })
            })
            .collect();

        let results: Vec<ResolvedLibrary> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(tool.calls(), 1);
        assert!(results.iter().all(|r| r.result == results[0].result));
    }

    #[test]
    fn test_build_failure_caches_nothing() {
        let tmp = TempDir::new().unwrap();
        let session = stub_session(&tmp, Arc::new(StubTool::failing(BuildPhase::Build)));
        let desc = zlib(&tmp);

        let err = resolve_library(&session, &desc).unwrap_err();
        assert!(matches!(
            err,
            LibraryError::Build(BuildError::Failed {
                phase: BuildPhase::Build,
                ..
            })
        ));
        let entries = session.cache().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].state, EntryState::Invalid);
    }

    #[test]
    fn test_missing_outputs_are_artifact_errors() {
        let tmp = TempDir::new().unwrap();
        let session = stub_session(&tmp, Arc::new(StubTool::installing(&[])));
        let err = resolve_library(&session, &zlib(&tmp)).unwrap_err();
        assert!(matches!(err, LibraryError::ArtifactNotFound(_)));

        // Expected target absent, even though something was installed.
        let tmp = TempDir::new().unwrap();
        let session = stub_session(
            &tmp,
            Arc::new(StubTool::installing(&[("lib/libpng.a", "x")])),
        );
        let err = resolve_library(&session, &zlib(&tmp)).unwrap_err();
        match err {
            LibraryError::ArtifactNotFound(e) => assert_eq!(e.missing, vec!["z"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_session() {
        let tmp = TempDir::new().unwrap();
        let tool = Arc::new(StubTool::zlib());
        let cancel = CancellationToken::new();
        let session = stub_session(&tmp, tool.clone()).with_cancel(cancel.clone());
        cancel.cancel();

        let err = resolve_library(&session, &zlib(&tmp)).unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(tool.calls(), 0);
    }

    #[test]
    fn test_cancel_during_build_invalidates_entry() {
        let tmp = TempDir::new().unwrap();
        let tool = Arc::new(StubTool::zlib().with_delay(Duration::from_secs(30)));
        let cancel = CancellationToken::new();
        let session = stub_session(&tmp, tool.clone()).with_cancel(cancel.clone());
        let desc = zlib(&tmp);

        let canceller = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            })
        };
        let err = resolve_library(&session, &desc).unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled());
        assert!(session.cache().entry(&fingerprint(&desc)).is_invalid());
    }

    #[test]
    fn test_dependency_prefixes_reach_the_tool() {
        let tmp = TempDir::new().unwrap();
        let tool = Arc::new(StubTool::zlib());
        let session = stub_session(&tmp, tool.clone());
        let desc = zlib(&tmp).with_dependency_fingerprint("dep", "f".repeat(64));

        resolve_library(&session, &desc).unwrap();
        let ctx = &tool.contexts()[0];
        assert_eq!(
            ctx.prefix_path,
            vec![tmp.path().join("cache").join("f".repeat(64)).join("install")]
        );
    }

    #[test]
    fn test_invalid_descriptor_rejected_before_building() {
        let tmp = TempDir::new().unwrap();
        let tool = Arc::new(StubTool::zlib());
        let session = stub_session(&tmp, tool.clone());
        let desc = zlib(&tmp).with_variant("");

        let err = resolve_library(&session, &desc).unwrap_err();
        assert!(matches!(err, LibraryError::Descriptor(_)));
        assert_eq!(tool.calls(), 0);
    }

    #[cfg(unix)]
    mod cmake {
        use super::*;
        use crate::test_support::{fake_cmake, invocations};

        fn cmake_session(tmp: &TempDir) -> Session {
            let cmake = fake_cmake(&tmp.path().join("bin"));
            let tool = CMakeTool::new(ToolSettings {
                cmake: Some(cmake),
                generator: Some("Unix Makefiles".to_string()),
                ..Default::default()
            });
            Session::new(
                Arc::new(BuildCache::new(tmp.path().join("cache"))),
                Acquirers::default(),
                Arc::new(tool),
            )
        }

        #[test]
        fn test_zlib_end_to_end() {
            let tmp = TempDir::new().unwrap();
            let session = cmake_session(&tmp);
            let desc = zlib(&tmp);

            let resolved = resolve_library(&session, &desc).unwrap();
            let install = resolved.result.artifact_dir.clone();
            assert!(install.ends_with("install"));
            assert_eq!(resolved.exports().api, vec![install.join("include")]);
            assert_eq!(resolved.exports().link[0].path, install.join("lib/libz.a"));
            assert!(resolved
                .result
                .log
                .iter()
                .any(|l| l.contains("Installing")));

            let bin = tmp.path().join("bin");
            let after_first = invocations(&bin).len();
            assert_eq!(after_first, 4);

            // Unchanged descriptor: no external invocation at all.
            let again = resolve_library(&session, &desc).unwrap();
            assert!(again.is_fresh());
            assert_eq!(invocations(&bin).len(), after_first);

            // Any option change is a new fingerprint and a new build.
            let mut options = desc.options.clone();
            options.defines.insert(
                "ZLIB_BUILD_EXAMPLES".to_string(),
                crate::core::OptionValue::Bool(false),
            );
            let changed = resolve_library(&session, &desc.clone().with_options(options)).unwrap();
            assert_ne!(changed.fingerprint, resolved.fingerprint);
            let calls = invocations(&bin);
            assert_eq!(calls.len(), after_first + 3);
            assert!(calls[after_first].contains("-DZLIB_BUILD_EXAMPLES=OFF"));
        }

        #[test]
        fn test_nonzero_exit_caches_nothing() {
            let tmp = TempDir::new().unwrap();
            let session = cmake_session(&tmp);
            let mut options = zlib(&tmp).options;
            options
                .env
                .insert("FAKE_CMAKE_FAIL".to_string(), "configure".to_string());
            let desc = zlib(&tmp).with_options(options);

            let err = resolve_library(&session, &desc).unwrap_err();
            assert!(matches!(
                err,
                LibraryError::Build(BuildError::Failed {
                    phase: BuildPhase::Configure,
                    code: Some(1),
                    ..
                })
            ));
            assert!(!session
                .cache()
                .entry(&fingerprint(&desc))
                .manifest_path()
                .exists());
        }

        #[test]
        fn test_success_without_outputs() {
            let tmp = TempDir::new().unwrap();
            let session = cmake_session(&tmp);
            let mut options = zlib(&tmp).options;
            options
                .env
                .insert("FAKE_CMAKE_EMPTY".to_string(), "1".to_string());
            let desc = zlib(&tmp).with_options(options);

            let err = resolve_library(&session, &desc).unwrap_err();
            assert!(matches!(err, LibraryError::ArtifactNotFound(_)));
        }
    }
}
