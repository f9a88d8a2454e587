//! Blocking external-process runner with a time budget
//!
//! Output is captured into anonymous temp files rather than pipes, so a
//! chatty child can never block on a full pipe while we poll it.

use super::Tool;
use crate::error::{ToolError, ToolResult};
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default budget for one external command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured output of a successful command
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

/// One external executable invoked with a time budget
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: Tool,
    program: OsString,
    timeout: Duration,
    envs: Vec<(OsString, OsString)>,
}

impl ToolCommand {
    /// Runner for `tool`, resolved on `PATH` by its executable name
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            program: OsString::from(tool.executable()),
            timeout: DEFAULT_TIMEOUT,
            envs: Vec::new(),
        }
    }

    /// Use a specific program instead of the tool's executable name
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the time budget per invocation
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add an environment variable to every invocation
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// The tool this runner invokes
    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Run to completion in `cwd`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the executable cannot be spawned because it is missing
    /// - `Timeout` if the budget elapses; the child is killed
    /// - `Failed` on a non-zero exit, carrying both output streams
    pub fn run<I, S>(&self, cwd: Option<&Path>, args: I) -> ToolResult<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let tool = self.tool;
        let io_err = |source: io::Error| ToolError::Io { tool, source };

        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let command_line = self.command_line(&args);

        if let Some(dir) = cwd {
            if !dir.is_dir() {
                return Err(io_err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("working directory does not exist: {}", dir.display()),
                )));
            }
        }

        let mut stdout_file = tempfile::tempfile().map_err(io_err)?;
        let mut stderr_file = tempfile::tempfile().map_err(io_err)?;

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone().map_err(io_err)?))
            .stderr(Stdio::from(stderr_file.try_clone().map_err(io_err)?));
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        debug!(target: "mintd::tools", command = %command_line, "Running");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ToolError::NotFound { tool });
            }
            Err(e) => return Err(io_err(e)),
        };

        let started = Instant::now();
        let status = loop {
            match child.try_wait().map_err(io_err)? {
                Some(status) => break status,
                None if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(
                        target: "mintd::tools",
                        command = %command_line,
                        timeout_secs = self.timeout.as_secs(),
                        "Command timed out, killed"
                    );
                    return Err(ToolError::Timeout {
                        tool,
                        command: command_line,
                        timeout: self.timeout,
                    });
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let stdout = read_capture(&mut stdout_file).map_err(io_err)?;
        let stderr = read_capture(&mut stderr_file).map_err(io_err)?;

        if status.success() {
            Ok(ToolOutput { stdout, stderr })
        } else {
            debug!(
                target: "mintd::tools",
                command = %command_line,
                code = ?status.code(),
                "Command failed"
            );
            Err(ToolError::Failed {
                tool,
                command: command_line,
                exit_code: status.code(),
                stdout,
                stderr,
            })
        }
    }

    fn command_line(&self, args: &[OsString]) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

fn read_capture(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
