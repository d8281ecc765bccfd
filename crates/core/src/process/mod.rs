//! Process execution
//!
//! Every external tool (flutter, adb, emulator, java) is reached through the
//! [`CommandRunner`] trait so that higher layers can be driven by scripted
//! output in tests. A command that cannot be spawned is an `Err`; a command
//! that runs and exits non-zero is an `Ok` result with `success == false`.

mod env;
#[cfg(any(test, feature = "testing"))]
mod fake;
mod system;

pub use env::ToolchainEnv;
#[cfg(any(test, feature = "testing"))]
pub use fake::FakeRunner;
pub use system::SystemRunner;

use crate::error::Result;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

/// How a command's output reaches the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Capture silently
    #[default]
    Capture,
    /// Capture, then print everything once the command exits
    Echo,
    /// Print each line as it arrives while also capturing it
    Stream,
}

/// A single command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path
    pub program: String,
    /// Positional arguments
    pub args: Vec<String>,
    /// Working directory, defaults to the current one
    pub dir: Option<PathBuf>,
    /// Kill the command after this long
    pub timeout: Option<Duration>,
    /// Output handling
    pub mode: OutputMode,
}

impl Invocation {
    /// Create an invocation with captured output and no timeout
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            timeout: None,
            mode: OutputMode::Capture,
        }
    }

    /// Run in the given directory
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Kill the command if it runs longer than `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set how output is shown
    #[must_use]
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Program and arguments joined by spaces, used for logging and matching
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// Exit code of the command, -1 when killed or never started
    pub exit_code: i32,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// The command was killed after exceeding its timeout
    pub timed_out: bool,
}

impl CommandResult {
    /// Create from `std::process::Output`
    pub fn from_output(output: &Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out: false,
        }
    }

    /// Successful result with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: 0,
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Failed result with the given output on stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: 1,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Result of a command that was killed on timeout
    pub fn timeout() -> Self {
        Self {
            success: false,
            exit_code: -1,
            timed_out: true,
            ..Self::default()
        }
    }

    /// Get combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Combined output, or `None` when the command timed out
    pub fn output(&self) -> Option<String> {
        (!self.timed_out).then(|| self.combined_output())
    }
}

/// Abstract command execution
///
/// Implementations must never panic on tool failure. `run` returns `Err`
/// only when the process could not be started.
pub trait CommandRunner {
    /// Run to completion (or timeout) and collect output
    fn run(&self, invocation: &Invocation) -> Result<CommandResult>;

    /// Start a background process and return immediately, discarding output
    fn spawn_detached(&self, invocation: &Invocation) -> Result<()>;

    /// Resolve a program against the runner's search path
    fn locate(&self, program: &str) -> Option<PathBuf>;
}

/// Run a command, folding spawn failures into a failed [`CommandResult`]
///
/// Lets callers treat "tool missing" and "tool failed" the same way.
pub fn run_lenient(runner: &(impl CommandRunner + ?Sized), invocation: &Invocation) -> CommandResult {
    match runner.run(invocation) {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(
                command = %invocation.command_line(),
                error = %err.message,
                "command could not be started"
            );
            CommandResult {
                exit_code: -1,
                ..CommandResult::failed(err.message)
            }
        }
    }
}
