//! Real command runner backed by `std::process::Command`

use super::{CommandResult, CommandRunner, Invocation, OutputMode, ToolchainEnv};
use crate::error::{Error, Result};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WAIT_POLL: Duration = Duration::from_millis(100);

/// Runs commands on the host with an injected [`ToolchainEnv`]
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    env: ToolchainEnv,
}

impl SystemRunner {
    /// Create a runner that applies `env` to every child
    pub fn new(env: ToolchainEnv) -> Self {
        Self { env }
    }

    /// The environment applied to children
    pub fn env(&self) -> &ToolchainEnv {
        &self.env
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let program = self
            .locate(&invocation.program)
            .unwrap_or_else(|| PathBuf::from(&invocation.program));
        let mut cmd = Command::new(program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.dir {
            cmd.current_dir(dir);
        }
        if let Some(path) = self.env.search_path() {
            cmd.env("PATH", path);
        }
        for (key, value) in self.env.vars() {
            cmd.env(key, value);
        }
        cmd
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandResult> {
        tracing::debug!(command = %invocation.command_line(), "running command");

        let mut child = self
            .command(invocation)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&invocation.program, e))?;

        let streaming = invocation.mode == OutputMode::Stream;
        let stdout = child
            .stdout
            .take()
            .map(|pipe| drain(pipe, streaming.then_some(Tee::Stdout)));
        let stderr = child
            .stderr
            .take()
            .map(|pipe| drain(pipe, streaming.then_some(Tee::Stderr)));

        let Some(status) = wait(&mut child, invocation.timeout)? else {
            // Reader threads are left to finish once the pipes close; a killed
            // tool may still have grandchildren holding them open.
            tracing::warn!(
                command = %invocation.command_line(),
                timeout_secs = invocation.timeout.map(|t| t.as_secs()),
                "command timed out"
            );
            return Ok(CommandResult::timeout());
        };

        let result = CommandResult {
            success: status.success(),
            exit_code: status.code().unwrap_or(-1),
            stdout: stdout.map(collect).unwrap_or_default(),
            stderr: stderr.map(collect).unwrap_or_default(),
            timed_out: false,
        };

        if invocation.mode == OutputMode::Echo {
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
        }

        tracing::debug!(
            command = %invocation.command_line(),
            exit_code = result.exit_code,
            "command finished"
        );
        Ok(result)
    }

    fn spawn_detached(&self, invocation: &Invocation) -> Result<()> {
        let child = self
            .command(invocation)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&invocation.program, e))?;
        tracing::debug!(
            command = %invocation.command_line(),
            pid = child.id(),
            "spawned background process"
        );
        Ok(())
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        which::which_in(program, self.env.search_path(), cwd).ok()
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::command_not_found(program).with_source(err)
    } else {
        Error::process(format!("Failed to execute {program}: {err}")).with_source(err)
    }
}

/// Wait for exit; `None` means the timeout expired and the child was killed
fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<Option<ExitStatus>> {
    let Some(limit) = timeout else {
        return Ok(Some(child.wait()?));
    };
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(WAIT_POLL);
    }
}

#[derive(Clone, Copy)]
enum Tee {
    Stdout,
    Stderr,
}

fn drain<R: Read + Send + 'static>(source: R, tee: Option<Tee>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut collected = String::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    match tee {
                        Some(Tee::Stdout) => {
                            print!("{text}");
                            let _ = std::io::stdout().flush();
                        }
                        Some(Tee::Stderr) => eprint!("{text}"),
                        None => {}
                    }
                    collected.push_str(&text);
                }
            }
        }
        collected
    })
}

fn collect(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_run_echo() {
        let runner = SystemRunner::new(ToolchainEnv::from_process());
        let result = runner.run(&Invocation::new("echo", ["hello"])).unwrap();
        assert!(result.success);
        assert!(result.stdout.contains("hello"));
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let runner = SystemRunner::new(ToolchainEnv::from_process());
        let result = runner.run(&Invocation::new("sh", ["-c", "echo oops >&2; exit 3"])).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
        assert!(result.stderr.contains("oops"));
    }

    #[test]
    fn test_missing_program_is_command_not_found() {
        let runner = SystemRunner::new(ToolchainEnv::from_process());
        let err = runner
            .run(&Invocation::new("emurun-definitely-missing-tool", Vec::<String>::new()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandNotFound);
    }

    #[test]
    fn test_timeout_kills_and_reports_no_output() {
        let runner = SystemRunner::new(ToolchainEnv::from_process());
        let inv = Invocation::new("sleep", ["5"]).with_timeout(Duration::from_millis(200));
        let started = Instant::now();
        let result = runner.run(&inv).unwrap();
        assert!(result.timed_out);
        assert!(result.output().is_none());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_env_vars_reach_child() {
        let mut env = ToolchainEnv::from_process();
        env.set_var("EMURUN_PROBE", "sdk-root");
        let runner = SystemRunner::new(env);
        let result = runner
            .run(&Invocation::new("sh", ["-c", "echo $EMURUN_PROBE"]))
            .unwrap();
        assert_eq!(result.stdout.trim(), "sdk-root");
    }

    #[test]
    fn test_runs_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemRunner::new(ToolchainEnv::from_process());
        let result = runner.run(&Invocation::new("pwd", Vec::<String>::new()).in_dir(dir.path())).unwrap();
        let reported = std::fs::canonicalize(result.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_locate_uses_injected_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-adb");
        std::fs::write(&tool, "#!/bin/sh\necho adb\n").unwrap();
        let mut perms = std::fs::metadata(&tool).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&tool, perms).unwrap();

        let mut env = ToolchainEnv::new(None);
        env.prepend_path(dir.path());
        let runner = SystemRunner::new(env);
        assert_eq!(runner.locate("fake-adb"), Some(tool));
    }
}
