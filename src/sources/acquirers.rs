//! The set of source strategies available to a session.

use std::path::Path;
use std::time::Duration;

use crate::core::{AcquisitionError, SourceLocator};
use crate::sources::archive::ArchiveAcquirer;
use crate::sources::git::GitAcquirer;
use crate::sources::path::PathAcquirer;
use crate::sources::source::{AcquiredSource, SourceAcquirer};
use crate::util::cancel::CancellationToken;

/// Network settings shared by the default strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub offline: bool,
    pub http_timeout: Option<Duration>,
}

/// Dispatches a locator to the first strategy that supports it.
pub struct Acquirers {
    strategies: Vec<Box<dyn SourceAcquirer>>,
}

impl Acquirers {
    /// An empty set; every locator is unsupported.
    pub fn empty() -> Self {
        Acquirers {
            strategies: Vec::new(),
        }
    }

    /// Path, git and archive strategies.
    pub fn with_defaults(options: FetchOptions) -> Self {
        Acquirers {
            strategies: vec![
                Box::new(PathAcquirer::new()),
                Box::new(GitAcquirer::new(options.offline)),
                Box::new(ArchiveAcquirer::new(options.offline, options.http_timeout)),
            ],
        }
    }

    /// Add a strategy. Later registrations take precedence.
    pub fn register(&mut self, acquirer: Box<dyn SourceAcquirer>) {
        self.strategies.insert(0, acquirer);
    }

    /// Names of the registered strategies, in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Find the strategy for a locator.
    pub fn for_locator(
        &self,
        locator: &SourceLocator,
    ) -> Result<&dyn SourceAcquirer, AcquisitionError> {
        self.strategies
            .iter()
            .find(|s| s.supports(locator))
            .map(|s| s.as_ref())
            .ok_or_else(|| AcquisitionError::Unsupported {
                locator: locator.to_string(),
            })
    }

    pub fn digest(&self, locator: &SourceLocator) -> Result<String, AcquisitionError> {
        self.for_locator(locator)?.digest(locator)
    }

    pub fn acquire(
        &self,
        locator: &SourceLocator,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<AcquiredSource, AcquisitionError> {
        let acquirer = self.for_locator(locator)?;
        tracing::debug!("acquiring {} with `{}`", locator, acquirer.name());
        acquirer.acquire(locator, dest, cancel)
    }
}

impl Default for Acquirers {
    fn default() -> Self {
        Self::with_defaults(FetchOptions::default())
    }
}
