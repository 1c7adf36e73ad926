//! Subprocess execution utilities.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::util::cancel::CancellationToken;

/// How often a streaming child is polled for exit, cancellation and timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to keep draining output after the child exits.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Maximum number of output lines kept in memory for a single command.
const MAX_LOG_LINES: usize = 10_000;

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
}

/// Why a streamed command did not produce an exit status.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("program not found: `{program}`")]
    NotFound { program: String },

    #[error("failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    TimedOut {
        command: String,
        timeout: Duration,
        log: Vec<String>,
    },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String, log: Vec<String> },

    #[error("I/O error while running `{command}`: {message}")]
    Io { command: String, message: String },
}

/// Result of a streamed command that ran to completion.
#[derive(Debug)]
pub struct StreamedOutput {
    pub status: ExitStatus,
    /// Interleaved stdout and stderr lines, oldest first.
    pub log: Vec<String>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set several environment variables.
    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command and wait for completion.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for `{}`", self.program.display()))?;

        Ok(output)
    }

    /// Execute while streaming output into the log, with an optional
    /// deadline and a cancellation token.
    ///
    /// Each line is forwarded to `tracing` at debug level as it arrives.
    /// On timeout or cancellation the whole process group is killed and
    /// the captured lines are returned inside the error.
    pub fn exec_streaming(
        &self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> std::result::Result<StreamedOutput, ProcessError> {
        let command = self.display_command();
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound {
                    program: self.program.display().to_string(),
                }
            } else {
                ProcessError::Spawn {
                    command: command.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let (tx, rx) = mpsc::channel::<String>();
        let readers: Vec<JoinHandle<()>> = [
            spawn_reader(child.stdout.take(), tx.clone()),
            spawn_reader(child.stderr.take(), tx),
        ]
        .into_iter()
        .flatten()
        .collect();

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut log = LogBuffer::default();

        let status = loop {
            log.extend(rx.try_iter());

            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    terminate(&mut child);
                    return Err(ProcessError::Io {
                        command,
                        message: e.to_string(),
                    });
                }
            }

            if cancel.is_cancelled() {
                terminate(&mut child);
                log.extend(rx.try_iter());
                return Err(ProcessError::Cancelled {
                    command,
                    log: log.into_lines(),
                });
            }

            if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                if Instant::now() >= deadline {
                    terminate(&mut child);
                    log.extend(rx.try_iter());
                    return Err(ProcessError::TimedOut {
                        command,
                        timeout,
                        log: log.into_lines(),
                    });
                }
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => log.push(line),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {}
            }
        };

        // Grandchildren may keep the pipes open after the child exits, so
        // drain for a bounded time only.
        let drain_until = Instant::now() + DRAIN_GRACE;
        loop {
            let remaining = drain_until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(line) => log.push(line),
                Err(RecvTimeoutError::Disconnected) => {
                    for handle in readers {
                        let _ = handle.join();
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        Ok(StreamedOutput {
            status,
            log: log.into_lines(),
        })
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Bounded line buffer that keeps the most recent lines.
#[derive(Default)]
struct LogBuffer {
    lines: VecDeque<String>,
}

impl LogBuffer {
    fn push(&mut self, line: String) {
        if self.lines.len() == MAX_LOG_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn extend(&mut self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            self.push(line);
        }
    }

    fn into_lines(self) -> Vec<String> {
        self.lines.into()
    }
}

fn spawn_reader<R>(pipe: Option<R>, tx: Sender<String>) -> Option<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let pipe = pipe?;
    Some(thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    tracing::debug!("{}", line);
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    }))
}

/// Kill a child and everything it spawned.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own process group, so a negative pid reaches
        // compilers and generators it started.
        let _ = Command::new("kill")
            .args(["-KILL", "--", &format!("-{}", child.id())])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Resolve a configured tool: an explicit path is used as-is when it exists,
/// a bare name is looked up in PATH.
pub fn resolve_tool(tool: &Path) -> Option<PathBuf> {
    if tool.components().count() > 1 || tool.is_absolute() {
        return tool.exists().then(|| tool.to_path_buf());
    }
    find_executable(&tool.to_string_lossy())
}

/// Find a C compiler.
pub fn find_c_compiler() -> Option<PathBuf> {
    find_from_env_or_candidates("CC", &["cc", "gcc", "clang", "cl"])
}

/// Find a C++ compiler.
pub fn find_cxx_compiler() -> Option<PathBuf> {
    find_from_env_or_candidates("CXX", &["c++", "g++", "clang++", "cl"])
}

/// Find the ar archiver.
pub fn find_ar() -> Option<PathBuf> {
    find_from_env_or_candidates("AR", &["ar", "llvm-ar", "lib"])
}

fn find_from_env_or_candidates(var: &str, candidates: &[&str]) -> Option<PathBuf> {
    if let Ok(value) = std::env::var(var) {
        if let Some(path) = resolve_tool(Path::new(&value)) {
            return Some(path);
        }
    }

    candidates.iter().find_map(|name| find_executable(name))
}
