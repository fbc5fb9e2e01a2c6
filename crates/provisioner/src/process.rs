//! Privileged child-process execution.
//!
//! This is the only place the provisioner spawns processes. Everything above
//! it talks to the [`ProcessRunner`] trait, so the orchestration can be tested
//! with [`MockRunner`] without running real installers.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A process to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
    /// Run with elevated privileges.
    pub elevated: bool,
    /// Kill the process if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl ProcessRequest {
    /// Create an elevated request with no deadline.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            elevated: true,
            timeout: None,
        }
    }

    /// Set whether to elevate.
    #[must_use]
    pub fn elevated(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }

    /// Set a deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// How a process finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; `-1` when terminated by a signal.
    pub exit_code: i32,
    /// Captured standard error.
    pub stderr: String,
}

impl ProcessOutcome {
    /// Whether the process exited with code zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Launches a process and waits for it.
pub trait ProcessRunner: Send + Sync {
    /// Run to completion, capturing standard error.
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutcome>;
}

/// Runs processes on the host.
///
/// On Unix, elevated requests are wrapped in `sudo -n` unless already
/// running as root. On Windows the bootstrap task is expected to hold
/// administrator rights already.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn command(request: &ProcessRequest, program: &Path) -> Command {
        if request.elevated && needs_sudo() {
            let mut command = Command::new("sudo");
            command.arg("-n").arg(program).args(&request.args);
            command
        } else {
            let mut command = Command::new(program);
            command.args(&request.args);
            command
        }
    }
}

#[cfg(unix)]
fn needs_sudo() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() != 0 }
}

#[cfg(not(unix))]
fn needs_sudo() -> bool {
    false
}

impl ProcessRunner for SystemRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutcome> {
        let program =
            std::path::absolute(&request.program).unwrap_or_else(|_| request.program.clone());

        let mut command = Self::command(request, &program);
        if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        log::debug!("Launching {} {}", program.display(), request.args.join(" "));

        let mut child = command.spawn().map_err(|e| Error::Launch {
            program: request.program_name(),
            source: e,
        })?;

        // Drain stderr on its own thread so a chatty installer cannot block on a full pipe.
        let mut pipe = child.stderr.take();
        let reader = thread::spawn(move || {
            let mut bytes = Vec::new();
            if let Some(pipe) = pipe.as_mut() {
                let _ = pipe.read_to_end(&mut bytes);
            }
            String::from_utf8_lossy(&bytes).into_owned()
        });

        let status = match request.timeout {
            None => child.wait().map_err(|e| Error::Launch {
                program: request.program_name(),
                source: e,
            }),
            Some(limit) => wait_with_deadline(&mut child, limit, request),
        };
        let stderr = reader.join().unwrap_or_default();
        let status = status?;

        Ok(ProcessOutcome {
            exit_code: status.code().unwrap_or(-1),
            stderr,
        })
    }
}

fn wait_with_deadline(
    child: &mut Child,
    limit: Duration,
    request: &ProcessRequest,
) -> Result<ExitStatus> {
    let started = Instant::now();
    loop {
        let polled = child.try_wait().map_err(|e| Error::Launch {
            program: request.program_name(),
            source: e,
        })?;
        if let Some(status) = polled {
            return Ok(status);
        }
        if started.elapsed() >= limit {
            log::warn!(
                "{} exceeded its {}s deadline, killing it",
                request.program_name(),
                limit.as_secs()
            );
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Timeout {
                program: request.program_name(),
                seconds: limit.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Runner that records requests and returns a canned outcome.
#[derive(Debug, Clone)]
pub struct MockRunner {
    outcome: ProcessOutcome,
    requests: Arc<Mutex<Vec<ProcessRequest>>>,
}

impl MockRunner {
    /// A runner whose processes exit with `exit_code` and `stderr`.
    #[must_use]
    pub fn exiting(exit_code: i32, stderr: &str) -> Self {
        Self {
            outcome: ProcessOutcome {
                exit_code,
                stderr: stderr.to_string(),
            },
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ProcessRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ProcessRunner for MockRunner {
    fn run(&self, request: &ProcessRequest) -> Result<ProcessOutcome> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        Ok(self.outcome.clone())
    }
}
