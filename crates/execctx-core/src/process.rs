use crate::config::CommandSpec;
use crate::stdio::OutputSink;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a process
pub type ProcessId = u32;

/// Signals a termination policy may deliver to a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Hangup,
    Interrupt,
    Quit,
    Kill,
    Terminate,
    Other(i32),
}

impl Signal {
    /// POSIX signal number
    pub fn number(&self) -> i32 {
        match self {
            Signal::Hangup => 1,
            Signal::Interrupt => 2,
            Signal::Quit => 3,
            Signal::Kill => 9,
            Signal::Terminate => 15,
            Signal::Other(n) => *n,
        }
    }

    pub fn from_number(number: i32) -> Self {
        match number {
            1 => Signal::Hangup,
            2 => Signal::Interrupt,
            3 => Signal::Quit,
            9 => Signal::Kill,
            15 => Signal::Terminate,
            n => Signal::Other(n),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Hangup => f.write_str("hangup"),
            Signal::Interrupt => f.write_str("interrupt"),
            Signal::Quit => f.write_str("quit"),
            Signal::Kill => f.write_str("killed"),
            Signal::Terminate => f.write_str("terminated"),
            Signal::Other(n) => write!(f, "signal {n}"),
        }
    }
}

/// Terminal status of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Process exited with the given exit code
    Exited(i32),
    /// Process was terminated by a signal
    Signaled(Signal),
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Exited(code) => Some(*code),
            ExitOutcome::Signaled(_) => None,
        }
    }

    pub fn signal(&self) -> Option<Signal> {
        match self {
            ExitOutcome::Signaled(signal) => Some(*signal),
            ExitOutcome::Exited(_) => None,
        }
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitOutcome::Signaled(Signal::from_number(signal));
            }
        }
        ExitOutcome::Exited(status.code().unwrap_or(-1))
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Exited(code) => write!(f, "exit status {code}"),
            ExitOutcome::Signaled(signal) => write!(f, "signal: {signal}"),
        }
    }
}

/// Signal delivery to a spawned process.
///
/// Handles are shared between the waiter and the cancellation watcher, so
/// they must be usable while another task is blocked waiting on the child.
/// Signalling a process that has already exited succeeds without effect.
pub trait ProcessSignal: Send + Sync {
    /// Get the process ID (None if it was never known)
    fn id(&self) -> Option<ProcessId>;

    /// Deliver a signal to the process
    fn signal(&self, signal: Signal) -> std::io::Result<()>;

    /// Forcibly kill the process (SIGKILL on Unix)
    fn kill(&self) -> std::io::Result<()> {
        self.signal(Signal::Kill)
    }
}

/// A spawned process
#[async_trait]
pub trait ChildProcess: Send {
    /// Get the process ID (None if the platform did not report one)
    fn id(&self) -> Option<ProcessId>;

    /// Shared signal handle for this process
    fn signal_handle(&self) -> Arc<dyn ProcessSignal>;

    /// Wait for the process to exit and its output to be drained
    async fn wait(&mut self) -> std::io::Result<ExitOutcome>;
}

/// Description of a process that can be spawned once
pub trait Command: Send + 'static {
    /// The type of child this command produces
    type Child: ChildProcess + 'static;

    /// Human-readable rendering of the invocation
    fn describe(&self) -> String;

    fn stdout_bound(&self) -> bool;

    fn stderr_bound(&self) -> bool;

    fn set_stdout(&mut self, sink: OutputSink);

    fn set_stderr(&mut self, sink: OutputSink);

    /// Spawn the process. Must be called from within a tokio runtime.
    fn spawn(&mut self) -> std::io::Result<Self::Child>;
}

/// Factory trait for creating platform-specific commands
pub trait CommandFactory {
    /// The type of command this factory creates
    type Command: Command;

    /// Create a command for the current platform
    fn create_command(spec: &CommandSpec) -> Self::Command;

    /// Get the platform name for logging and debugging
    fn platform_name() -> &'static str;
}
