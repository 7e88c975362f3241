//! Abstraction over external command execution.
//!
//! [`CommandRunner`] allows swapping the real process execution
//! ([`SystemCommandRunner`]) with a mock in tests, so the scheduler can be
//! checked for what it does *not* spawn (cache hits, cancelled elevation)
//! without pacman or sudo being installed.
//!
//! [`SystemCommandRunner`] merges stderr into stdout through a single pipe,
//! feeds the elevation password to stdin when there is one, and reads the
//! output line by line while the process runs.
use crate::dispatch::LineSink;
use crate::secret::Secret;
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, trace};

/// Text printed by sudo when the password it read was wrong.
pub const AUTH_FAILURE_MARKER: &str = "incorrect password";

/// Exit code reported when the process never produced one.
pub const NO_EXIT_CODE: i32 = -1;

/// How a command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// exit code 0
    Success,
    /// the tool reported a failure
    NonZeroExit,
    /// the elevation tool rejected the password
    AuthFailure,
    /// the executable does not exist
    NotFound,
    /// spawning or reading the process failed
    IoError(String),
    /// the user declined to give a password, nothing was spawned
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::NonZeroExit => write!(f, "failure"),
            Outcome::AuthFailure => write!(f, "authentication failure"),
            Outcome::NotFound => write!(f, "command not found"),
            Outcome::IoError(e) => write!(f, "I/O error ({})", e),
            Outcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Error raised while spawning or talking to a process.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The argument vector is empty.
    #[error("Empty command line")]
    EmptyCommand,
    /// The executable is not installed.
    #[error("Command not found - {0}.")]
    NotFound(String),
    #[allow(missing_docs)]
    #[error("Running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// A process to run: the full argument vector, and the password to feed to
/// its standard input when it is elevated.
#[derive(Debug)]
pub struct Invocation {
    argv: Vec<String>,
    secret: Option<Secret>,
}

impl Invocation {
    /// Plain invocation.
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv, secret: None }
    }

    /// Invocation of `argv` (already prefixed with the elevation tool) that
    /// receives `secret` on stdin.
    pub fn elevated(argv: Vec<String>, secret: Secret) -> Self {
        Self {
            argv,
            secret: Some(secret),
        }
    }

    #[allow(missing_docs)]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    #[allow(missing_docs)]
    pub fn is_elevated(&self) -> bool {
        self.secret.is_some()
    }
}

/// Everything known once a process is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// merged stdout and stderr, in arrival order
    pub transcript: String,
    /// exit code, [`NO_EXIT_CODE`] when there is none
    pub exit_code: i32,
    /// classification of the run
    pub outcome: Outcome,
}

impl CommandResult {
    /// Classify a run.
    ///
    /// In priority order: a non-zero exit whose transcript mentions
    /// [`AUTH_FAILURE_MARKER`] is an authentication failure, then a missing
    /// executable, then any other error, then a non-zero exit.
    pub fn classify(transcript: String, exit_code: i32, error: Option<&ExecError>) -> Self {
        let outcome = if exit_code != 0 && transcript.contains(AUTH_FAILURE_MARKER) {
            Outcome::AuthFailure
        } else if let Some(ExecError::NotFound(_)) = error {
            Outcome::NotFound
        } else if let Some(e) = error {
            Outcome::IoError(e.to_string())
        } else if exit_code != 0 {
            Outcome::NonZeroExit
        } else {
            Outcome::Success
        };
        Self {
            transcript,
            exit_code,
            outcome,
        }
    }
}

/// Trait for running external commands and capturing their output.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run `invocation` to completion, handing each output line to `sink`.
    ///
    /// Never fails: every error ends up in the returned classification.
    fn run(&self, invocation: &Invocation, sink: &LineSink) -> CommandResult;
}

/// Default implementation that delegates to [`std::process::Command`].
#[derive(Debug, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, invocation: &Invocation, sink: &LineSink) -> CommandResult {
        let mut transcript = String::new();
        match stream_process(invocation, sink, &mut transcript) {
            Ok(exit_code) => CommandResult::classify(transcript, exit_code, None),
            Err(e) => {
                debug!("{}", e);
                CommandResult::classify(transcript, NO_EXIT_CODE, Some(&e))
            }
        }
    }
}

fn stream_process(
    invocation: &Invocation,
    sink: &LineSink,
    transcript: &mut String,
) -> Result<i32, ExecError> {
    let (program, args) = invocation
        .argv
        .split_first()
        .ok_or(ExecError::EmptyCommand)?;
    let io_error = |source| ExecError::Io {
        program: program.clone(),
        source,
    };

    let (reader, writer) = io::pipe().map_err(io_error)?;
    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(writer.try_clone().map_err(io_error)?)
        .stderr(writer)
        .stdin(if invocation.secret.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
    let spawned = command.spawn();
    // `command` holds our copies of the pipe's write end: the reader only sees
    // EOF once they are closed.
    drop(command);
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ExecError::NotFound(program.clone()))
        }
        Err(e) => return Err(io_error(e)),
    };
    debug!("Spawned {} (pid {})", program, child.id());

    if let (Some(secret), Some(mut stdin)) = (&invocation.secret, child.stdin.take()) {
        let written = stdin
            .write_all(secret.expose())
            .and_then(|_| stdin.write_all(b"\n"))
            .and_then(|_| stdin.flush());
        if let Err(e) = written {
            // The tool may exit before reading its input.
            debug!("Could not hand the password to {}: {}", program, e);
        }
    }

    let mut lines = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut read_error = None;
    loop {
        buf.clear();
        match lines.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                trace!("{}: {}", program, line.trim_end());
                transcript.push_str(&line);
                sink.line(&line);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                read_error = Some(e);
                break;
            }
        }
    }

    let status = child.wait().map_err(io_error)?;
    if let Some(e) = read_error {
        return Err(io_error(e));
    }
    debug!("{} exited with {}", program, status);
    Ok(status.code().unwrap_or(NO_EXIT_CODE))
}
