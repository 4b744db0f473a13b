use crate::process::{ExitOutcome, Signal};
use std::fmt;
use thiserror::Error;

/// Output stream of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum StreamKind {
    #[display("Stdout")]
    Stdout,
    #[display("Stderr")]
    Stderr,
}

/// Abnormal termination of a child process.
///
/// Carries the exit outcome and, when output was captured for diagnostics,
/// the captured bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitError {
    pub outcome: ExitOutcome,
    pub stderr: Vec<u8>,
}

impl ExitError {
    pub fn new(outcome: ExitOutcome) -> Self {
        Self {
            outcome,
            stderr: Vec::new(),
        }
    }

    /// Exit code, if the process exited rather than being signalled
    pub fn code(&self) -> Option<i32> {
        self.outcome.code()
    }

    /// Captured diagnostic output, lossily decoded
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.outcome)
    }
}

impl std::error::Error for ExitError {}

/// Errors raised while driving a cancellable command
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("exec: cancellation already requested")]
    AlreadyCancelled,

    #[error("exec: already started")]
    AlreadyStarted,

    #[error("exec: not started")]
    NotStarted,

    #[error("exec: Wait was already called")]
    AlreadyWaited,

    #[error("exec: failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("exec: {0} already set")]
    StreamAlreadyBound(StreamKind),

    #[error(transparent)]
    Exit(#[from] ExitError),

    #[error("exec: failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
}

impl ExecError {
    /// Check if the process was forcibly killed, the expected result of a
    /// cancellation handled by the default policy
    pub fn is_killed(&self) -> bool {
        matches!(
            self,
            ExecError::Exit(ExitError {
                outcome: ExitOutcome::Signaled(Signal::Kill),
                ..
            })
        )
    }

    /// Check if this error means no process was ever run
    pub fn is_not_run(&self) -> bool {
        matches!(
            self,
            ExecError::AlreadyCancelled | ExecError::Spawn(_) | ExecError::StreamAlreadyBound(_)
        )
    }

    /// Exit outcome carried by an abnormal termination
    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        match self {
            ExecError::Exit(e) => Some(e.outcome),
            _ => None,
        }
    }
}

/// Result type for cancellable command operations
pub type Result<T> = std::result::Result<T, ExecError>;
