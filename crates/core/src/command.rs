//! Resolution and invocation of the Tuist executable

use crate::{Error, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Executable used when nothing else is configured.
pub const DEFAULT_EXECUTABLE: &str = "tuist";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The argv prefix used to invoke Tuist.
///
/// Usually just `tuist`, but wrappers such as
/// `mise x tuist@latest -- tuist` are supported through an explicit command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    /// Create a command from a program and leading arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Resolve the command from the configured options.
    ///
    /// A non-empty `executable_command` takes precedence over
    /// `executable_path`; without either, `tuist` is looked up on `PATH`.
    #[must_use]
    pub fn resolve(executable_path: Option<&str>, executable_command: Option<&[String]>) -> Self {
        if let Some([program, rest @ ..]) = executable_command
            && !program.trim().is_empty()
        {
            return Self::new(program.clone(), rest.to_vec());
        }

        match executable_path.map(str::trim) {
            Some(path) if !path.is_empty() => Self::new(path, Vec::new()),
            _ => Self::new(DEFAULT_EXECUTABLE, Vec::new()),
        }
    }

    /// Program that is spawned.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build a [`Command`] with the prefix followed by `args`.
    #[must_use]
    pub fn command<S: AsRef<str>>(&self, args: &[S]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.args(args.iter().map(AsRef::as_ref));
        command
    }

    /// Run the tool with `args` and return its stdout.
    ///
    /// # Errors
    ///
    /// See [`run_with_timeout`].
    pub fn run<S: AsRef<str>>(
        &self,
        args: &[S],
        dir: Option<&Path>,
        timeout: Duration,
    ) -> Result<String> {
        let mut command = self.command(args);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        run_with_timeout(command, timeout)
    }
}

impl Default for ToolCommand {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTABLE, Vec::new())
    }
}

/// Run `command` to completion, killing it once `timeout` elapses.
///
/// Stdout and stderr are drained on helper threads so a chatty child can't
/// block on a full pipe while we poll for its exit.
///
/// # Errors
///
/// - [`Error::ToolNotFound`] when the program does not exist
/// - [`Error::Timeout`] when the process outlives `timeout`
/// - [`Error::Command`] on a non-zero exit, carrying stderr
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<String> {
    let rendered = describe(&command);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::ToolNotFound {
                program: command.get_program().to_string_lossy().into_owned(),
            }
        } else {
            Error::io(e, format!("spawn `{rendered}`"))
        }
    })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child
            .try_wait()
            .map_err(|e| Error::io(e, format!("wait for `{rendered}`")))?
        {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Timeout {
                    command: rendered,
                    timeout,
                });
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);
    debug!(command = %rendered, status = %status, "Tool finished");

    if !status.success() {
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            status.code().map_or_else(
                || "terminated by signal".to_string(),
                |code| format!("exit code {code}"),
            )
        } else {
            stderr.to_string()
        };
        return Err(Error::Command {
            command: rendered,
            message,
        });
    }

    Ok(stdout)
}

fn describe(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
