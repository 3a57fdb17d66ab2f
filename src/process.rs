//! Centralized external-command execution.
//!
//! Every external tool the pipeline touches (compiler toolchain, openssl)
//! goes through [`Cmd`], so stderr is always captured and failures carry a
//! useful message. Long-running invocations can be bounded by a deadline or
//! terminated through a cooperative cancel flag.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

/// How often a running child is polled for exit, deadline, and cancel.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum CmdError {
    #[error("failed to execute '{program}': {source}. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{prefix} (exit code {code}):\n{stderr}")]
    Failed {
        prefix: String,
        code: i32,
        stderr: String,
    },

    /// The deadline elapsed or the cancel flag was raised; the child was killed.
    #[error("'{program}' terminated before completion")]
    Cancelled { program: String },
}

/// Result of a completed command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for configuring command execution.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// Custom error message prefix.
    error_prefix: Option<String>,
    deadline: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            allow_fail: false,
            error_prefix: None,
            deadline: None,
            cancel: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set an environment variable for the child only.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Kill the child and report [`CmdError::Cancelled`] after this duration.
    pub fn deadline(mut self, limit: Duration) -> Self {
        self.deadline = Some(limit);
        self
    }

    /// Kill the child and report [`CmdError::Cancelled`] once the flag is set.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult, CmdError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| CmdError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Drain pipes on their own threads so a chatty child can't deadlock
        // against a full pipe buffer while we poll for exit.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_reader = std::thread::spawn(move || read_pipe(stdout_pipe));
        let stderr_reader = std::thread::spawn(move || read_pipe(stderr_pipe));

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(|source| CmdError::Spawn {
                program: self.program.clone(),
                source,
            })? {
                break status;
            }

            let timed_out = self.deadline.is_some_and(|limit| started.elapsed() >= limit);
            let cancelled = self
                .cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed));
            if timed_out || cancelled {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_reader.join();
                let _ = stderr_reader.join();
                return Err(CmdError::Cancelled {
                    program: self.program.clone(),
                });
            }

            std::thread::sleep(POLL_INTERVAL);
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        let result = CommandResult {
            status,
            stdout,
            stderr,
        };

        if !self.allow_fail && !result.success() {
            let prefix = self
                .error_prefix
                .unwrap_or_else(|| format!("'{}' failed", self.program));
            return Err(CmdError::Failed {
                prefix,
                code: result.code(),
                stderr: result.stderr_trimmed().to_string(),
            });
        }

        Ok(result)
    }
}

fn read_pipe(pipe: Option<impl Read>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
