//! Cooperative cancellation for long-running acquisitions and builds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable cancellation flag.
///
/// All clones observe the same flag. Once cancelled a token stays
/// cancelled; create a new token for the next host build.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token on SIGINT or SIGTERM.
    ///
    /// Child processes run in their own process groups, so a terminal
    /// interrupt never reaches them directly; cancelling makes the running
    /// invocations kill their groups. A second signal exits immediately.
    /// Only one handler can be installed per process.
    pub fn cancel_on_interrupt(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if !token.interrupt() {
                std::process::exit(130);
            }
        })
    }

    /// Handle one interrupt. Returns `false` if the token was already
    /// cancelled by an earlier one.
    fn interrupt(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::warn!("interrupted, stopping running builds");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_second_interrupt_is_reported() {
        let token = CancellationToken::new();
        assert!(token.interrupt());
        assert!(token.is_cancelled());
        assert!(!token.interrupt());
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_kills_running_child() {
        use crate::util::process::{ProcessBuilder, ProcessError};
        use std::time::{Duration, Instant};

        let token = CancellationToken::new();
        let handler = token.clone();
        let signal = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            handler.interrupt()
        });

        let started = Instant::now();
        let err = ProcessBuilder::new("sh")
            .args(["-c", "sleep 30 & wait"])
            .exec_streaming(None, &token)
            .unwrap_err();

        assert!(signal.join().unwrap());
        assert!(matches!(err, ProcessError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
