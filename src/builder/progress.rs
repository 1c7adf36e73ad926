//! Build progress reporting for manifest builds.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::events::BuildEvent;
use crate::builder::fingerprint::short;
use crate::core::LibraryError;

/// How build output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    /// Status lines and a progress bar on stderr
    #[default]
    Human,
    /// One JSON [`BuildEvent`] per line on stdout
    Json,
}

impl FromStr for MessageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(MessageFormat::Human),
            "json" => Ok(MessageFormat::Json),
            other => Err(format!(
                "unknown message format `{}` (expected `human` or `json`)",
                other
            )),
        }
    }
}

/// Counters shared by the worker threads of one build.
#[derive(Clone)]
pub struct BuildProgress {
    built: Arc<AtomicUsize>,
    fresh: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    total: usize,
}

impl BuildProgress {
    /// Create a new progress tracker.
    pub fn new(total: usize) -> Self {
        BuildProgress {
            built: Arc::new(AtomicUsize::new(0)),
            fresh: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            total,
        }
    }

    /// Record a resolved library; `fresh` when the build tool didn't run.
    pub fn resolved(&self, fresh: bool) {
        if fresh {
            self.fresh.fetch_add(1, Ordering::SeqCst);
        } else {
            self.built.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Record a failed library.
    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn built_count(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub fn fresh_count(&self) -> usize {
        self.fresh.load(Ordering::SeqCst)
    }

    pub fn failed_count(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Libraries finished either way.
    pub fn done(&self) -> usize {
        self.built_count() + self.fresh_count() + self.failed_count()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Get total progress as a fraction.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done() as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done() >= self.total
    }
}

/// Renders build progress as status lines or JSON events.
pub struct BuildReporter {
    format: MessageFormat,
    verbose: bool,
    color: bool,
    progress: BuildProgress,
    bar: Option<ProgressBar>,
    start: Instant,
}

impl BuildReporter {
    pub fn new(format: MessageFormat, verbose: bool, color: bool, total: usize) -> Self {
        let bar = if format == MessageFormat::Human
            && !verbose
            && total > 1
            && std::io::stderr().is_terminal()
        {
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            Some(pb)
        } else {
            None
        };

        BuildReporter {
            format,
            verbose,
            color,
            progress: BuildProgress::new(total),
            bar,
            start: Instant::now(),
        }
    }

    /// A reporter that prints nothing.
    pub fn silent(total: usize) -> Self {
        BuildReporter {
            format: MessageFormat::Human,
            verbose: false,
            color: false,
            progress: BuildProgress::new(total),
            bar: Some(ProgressBar::hidden()),
            start: Instant::now(),
        }
    }

    pub fn progress(&self) -> &BuildProgress {
        &self.progress
    }

    fn emit(&self, event: BuildEvent) {
        println!("{}", event.to_json());
    }

    fn status(&self, verb: &str, message: &str) {
        let line = format!("{:>12} {}", verb, message);
        match &self.bar {
            Some(bar) if bar.is_hidden() => {}
            Some(bar) => bar.println(line),
            None => eprintln!("{}", line),
        }
    }

    pub fn build_started(&self, cache_dir: &Path) {
        match self.format {
            MessageFormat::Json => self.emit(BuildEvent::started(self.progress.total(), cache_dir)),
            MessageFormat::Human if self.verbose => {
                self.status("Cache", &cache_dir.display().to_string())
            }
            MessageFormat::Human => {}
        }
    }

    pub fn library_started(&self, library_id: &str, fingerprint: &str) {
        match self.format {
            MessageFormat::Json => self.emit(BuildEvent::library_started(library_id, fingerprint)),
            MessageFormat::Human => {
                if let Some(bar) = &self.bar {
                    bar.set_message(library_id.to_string());
                }
                if self.verbose {
                    self.status("Resolving", &format!("{} ({})", library_id, short(fingerprint)));
                }
            }
        }
    }

    pub fn library_resolved(
        &self,
        library_id: &str,
        fingerprint: &str,
        fresh: bool,
        artifact_dir: &Path,
        filenames: Vec<PathBuf>,
    ) {
        self.progress.resolved(fresh);
        match self.format {
            MessageFormat::Json => self.emit(BuildEvent::library_resolved(
                library_id,
                fingerprint,
                fresh,
                artifact_dir.to_path_buf(),
                filenames,
            )),
            MessageFormat::Human => {
                let verb = if fresh { "Fresh" } else { "Built" };
                self.status(verb, &format!("{} ({})", library_id, short(fingerprint)));
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
            }
        }
    }

    pub fn library_failed(&self, library_id: &str, fingerprint: &str, err: &LibraryError) {
        self.progress.failed();
        match self.format {
            MessageFormat::Json => {
                self.emit(BuildEvent::library_failed(library_id, fingerprint, err.to_string()))
            }
            MessageFormat::Human => {
                self.status("Failed", library_id);
                let rendered = err.to_diagnostic().format(self.color);
                match &self.bar {
                    Some(bar) if !bar.is_hidden() => bar.println(rendered),
                    Some(_) => {}
                    None => eprintln!("{}", rendered),
                }
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                }
            }
        }
    }

    /// A warning or error not tied to one library.
    pub fn diagnostic(&self, level: &str, message: &str) {
        match self.format {
            MessageFormat::Json => self.emit(BuildEvent::diagnostic(level, message)),
            MessageFormat::Human => self.status(level, message),
        }
    }

    /// Close the progress bar and print the summary.
    pub fn finish(&self, success: bool) -> Duration {
        let elapsed = self.start.elapsed();
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }

        let resolved = self.progress.built_count() + self.progress.fresh_count();
        match self.format {
            MessageFormat::Json => self.emit(BuildEvent::finished(
                success,
                elapsed.as_millis() as u64,
                resolved,
            )),
            MessageFormat::Human if success => {
                if !self.bar.as_ref().is_some_and(|b| b.is_hidden()) {
                    eprintln!(
                        "    Finished {} librar{} in {:.2}s",
                        resolved,
                        if resolved == 1 { "y" } else { "ies" },
                        elapsed.as_secs_f64()
                    );
                }
            }
            MessageFormat::Human => {}
        }
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_progress_counts() {
        let progress = BuildProgress::new(3);
        assert_eq!(progress.done(), 0);
        assert!(!progress.is_complete());

        progress.resolved(true);
        progress.resolved(false);
        assert_eq!(progress.fresh_count(), 1);
        assert_eq!(progress.built_count(), 1);
        assert!((progress.progress() - 2.0 / 3.0).abs() < 0.001);

        progress.failed();
        assert!(progress.is_complete());
    }

    #[test]
    fn test_build_progress_empty() {
        let progress = BuildProgress::new(0);
        assert_eq!(progress.progress(), 1.0);
        assert!(progress.is_complete());
    }

    #[test]
    fn test_build_progress_thread_safe() {
        use std::thread;

        let progress = BuildProgress::new(100);
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let p = progress.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        p.resolved(false);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(progress.built_count(), 100);
    }

    #[test]
    fn test_message_format_parse() {
        assert_eq!("json".parse::<MessageFormat>().unwrap(), MessageFormat::Json);
        assert_eq!("human".parse::<MessageFormat>().unwrap(), MessageFormat::Human);
        assert!("xml".parse::<MessageFormat>().is_err());
    }

    #[test]
    fn test_silent_reporter_tracks_progress() {
        let reporter = BuildReporter::silent(1);
        reporter.library_resolved("zlib/release", "ab", true, Path::new("/i"), Vec::new());
        reporter.finish(true);
        assert_eq!(reporter.progress().fresh_count(), 1);
    }
}
