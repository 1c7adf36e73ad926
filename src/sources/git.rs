//! Git source - libraries checked out from a git repository.

use std::path::Path;

use git2::build::RepoBuilder;
use git2::{FetchOptions, Oid, RemoteCallbacks, Repository, ResetType};

use crate::core::{AcquisitionError, GitReference, SourceLocator};
use crate::sources::source::{
    check_cancelled, read_stamp, write_stamp, AcquiredSource, SourceAcquirer,
};
use crate::util::cancel::CancellationToken;
use crate::util::hash::Fingerprint;

/// Clones into the cache entry and checks out the requested reference.
#[derive(Debug, Default)]
pub struct GitAcquirer {
    offline: bool,
}

impl GitAcquirer {
    pub fn new(offline: bool) -> Self {
        GitAcquirer { offline }
    }

    fn git_err(url: &str, err: impl std::fmt::Display) -> AcquisitionError {
        AcquisitionError::Git {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    fn fetch_options(cancel: &CancellationToken) -> FetchOptions<'_> {
        let mut callbacks = RemoteCallbacks::new();
        // Returning false aborts the transfer.
        callbacks.transfer_progress(move |_| !cancel.is_cancelled());
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        options
    }

    fn clone_into(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<Repository, AcquisitionError> {
        if self.offline {
            return Err(AcquisitionError::Offline {
                url: url.to_string(),
            });
        }
        tracing::info!("Cloning {}", url);

        crate::util::fs::remove_dir_all_if_exists(dest)
            .map_err(|e| AcquisitionError::io(dest, format!("{:#}", e)))?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AcquisitionError::io(parent, e))?;
        }

        let result = RepoBuilder::new()
            .fetch_options(Self::fetch_options(cancel))
            .clone(url, dest);
        check_cancelled(cancel)?;
        result.map_err(|e| Self::git_err(url, e))
    }

    fn update(
        &self,
        repo: &Repository,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AcquisitionError> {
        if self.offline {
            tracing::debug!("offline: reusing existing checkout of {}", url);
            return Ok(());
        }
        tracing::info!("Updating {}", url);

        let mut remote = repo
            .find_remote("origin")
            .or_else(|_| repo.remote_anonymous(url))
            .map_err(|e| Self::git_err(url, e))?;
        let result = remote.fetch(
            &[
                "+refs/heads/*:refs/remotes/origin/*",
                "+refs/tags/*:refs/tags/*",
            ],
            Some(&mut Self::fetch_options(cancel)),
            None,
        );
        check_cancelled(cancel)?;
        result.map_err(|e| Self::git_err(url, e))
    }

    fn checkout(
        repo: &Repository,
        url: &str,
        reference: &GitReference,
    ) -> Result<Oid, AcquisitionError> {
        let err = |e: git2::Error| Self::git_err(url, e);

        let commit = match reference {
            GitReference::DefaultBranch => {
                match repo.find_reference("refs/remotes/origin/HEAD") {
                    Ok(r) => r.peel_to_commit().map_err(err)?,
                    Err(_) => repo.head().and_then(|h| h.peel_to_commit()).map_err(err)?,
                }
            }
            GitReference::Branch(branch) => {
                let remote_ref = format!("refs/remotes/origin/{}", branch);
                match repo.find_reference(&remote_ref) {
                    Ok(r) => r.peel_to_commit().map_err(err)?,
                    Err(_) => repo
                        .find_branch(branch, git2::BranchType::Local)
                        .and_then(|b| b.get().peel_to_commit())
                        .map_err(err)?,
                }
            }
            GitReference::Tag(tag) => repo
                .find_reference(&format!("refs/tags/{}", tag))
                .and_then(|r| r.peel_to_commit())
                .map_err(err)?,
            GitReference::Rev(rev) => repo
                .revparse_single(rev)
                .and_then(|obj| obj.peel_to_commit())
                .map_err(err)?,
        };

        repo.reset(commit.as_object(), ResetType::Hard, None)
            .map_err(err)?;
        Ok(commit.id())
    }
}

fn stamp_key(url: &str, reference: &GitReference) -> String {
    format!("git:{}#{}", url, reference)
}

impl SourceAcquirer for GitAcquirer {
    fn name(&self) -> &str {
        "git"
    }

    fn supports(&self, locator: &SourceLocator) -> bool {
        matches!(locator, SourceLocator::Git { .. })
    }

    /// Branch references are not re-resolved against the remote here; a
    /// moving branch is picked up on an explicit rebuild.
    fn digest(&self, locator: &SourceLocator) -> Result<String, AcquisitionError> {
        let SourceLocator::Git { url, reference } = locator else {
            return Err(AcquisitionError::Unsupported {
                locator: locator.to_string(),
            });
        };
        let mut fp = Fingerprint::new();
        fp.update_str("git-v1").update_str(&stamp_key(url, reference));
        Ok(fp.finish())
    }

    fn acquire(
        &self,
        locator: &SourceLocator,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<AcquiredSource, AcquisitionError> {
        let SourceLocator::Git { url, reference } = locator else {
            return Err(AcquisitionError::Unsupported {
                locator: locator.to_string(),
            });
        };
        check_cancelled(cancel)?;

        let key = stamp_key(url, reference);
        let existing = Repository::open(dest).ok();

        // A pinned reference that is already checked out needs no network.
        if let (Some(_), Some(stamp)) = (&existing, read_stamp(dest)) {
            if reference.is_pinned() {
                if let Some(commit) = stamp.strip_prefix(&format!("{}@", key)) {
                    tracing::debug!("{} already checked out at {}", url, commit);
                    return Ok(AcquiredSource {
                        dir: dest.to_path_buf(),
                        revision: Some(commit.to_string()),
                        fetched: false,
                    });
                }
            }
        }

        let repo = match existing {
            Some(repo) => {
                self.update(&repo, url, cancel)?;
                repo
            }
            None => self.clone_into(url, dest, cancel)?,
        };

        let commit = Self::checkout(&repo, url, reference)?.to_string();
        write_stamp(dest, &format!("{}@{}", key, commit))?;

        if !dest.join("CMakeLists.txt").is_file() {
            return Err(AcquisitionError::NotCMakeProject {
                path: dest.to_path_buf(),
            });
        }

        Ok(AcquiredSource {
            dir: dest.to_path_buf(),
            revision: Some(commit),
            fetched: true,
        })
    }
}
