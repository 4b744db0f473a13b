//! Cancellable command: races a cancellation token against process exit.

use crate::capture::{DEFAULT_CAPTURE_LIMIT, PrefixSuffixBuffer};
use crate::error::{ExecError, ExitError, Result, StreamKind};
use crate::policy::{ProcessSignaller, TerminationPolicy};
use crate::process::{ChildProcess, Command, ExitOutcome, ProcessId};
use crate::stdio::{OutputSink, SharedBuffer};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum State<Child> {
    Idle,
    Running(Child),
    Finished,
}

/// Wraps a [`Command`] so that firing a cancellation token runs a
/// termination policy against the process instead of a fixed kill.
///
/// A `CancellableCommand` lives for exactly one `start` / `wait` cycle.
/// Once started, a single watcher task waits for whichever comes first:
///
/// - the token fires: the policy runs, or the process is killed with
///   SIGKILL when no policy was given;
/// - [`wait`](Self::wait) observes the exit: the watcher stops and the
///   policy never runs.
///
/// If both happen at nearly the same moment either branch may win, so
/// policies must tolerate a process that has already exited.
///
/// Dropping a started command without waiting on it kills the process.
///
/// # Example
///
/// ```rust,no_run
/// use execctx_core::{CancellableCommand, Command, GracefulShutdown, ShutdownConfig};
/// use tokio_util::sync::CancellationToken;
///
/// async fn example<C: Command>(command: C) -> execctx_core::Result<()> {
///     let token = CancellationToken::new();
///     let mut cmd = CancellableCommand::with_policy(
///         token.clone(),
///         command,
///         GracefulShutdown::new(ShutdownConfig::interrupt()),
///     );
///     cmd.start()?;
///     token.cancel();
///     cmd.wait().await?;
///     Ok(())
/// }
/// ```
pub struct CancellableCommand<C: Command> {
    command: C,
    token: CancellationToken,
    policy: Option<Box<dyn TerminationPolicy>>,
    wait_done: CancellationToken,
    released: CancellationToken,
    state: State<C::Child>,
}

impl<C: Command> CancellableCommand<C> {
    /// Bind a command to a cancellation token.
    ///
    /// A `None` policy kills the process with SIGKILL on cancellation.
    pub fn new(
        token: CancellationToken,
        command: C,
        policy: Option<Box<dyn TerminationPolicy>>,
    ) -> Self {
        Self {
            command,
            token,
            policy,
            wait_done: CancellationToken::new(),
            released: CancellationToken::new(),
            state: State::Idle,
        }
    }

    /// Bind a command to a cancellation token and a termination policy
    pub fn with_policy(
        token: CancellationToken,
        command: C,
        policy: impl TerminationPolicy,
    ) -> Self {
        Self::new(token, command, Some(Box::new(policy)))
    }

    /// The wrapped command
    pub fn command(&self) -> &C {
        &self.command
    }

    /// Access the command to bind streams before starting
    pub fn command_mut(&mut self) -> &mut C {
        &mut self.command
    }

    /// Process ID while the process is running
    pub fn id(&self) -> Option<ProcessId> {
        match &self.state {
            State::Running(child) => child.id(),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        self.command.describe()
    }

    /// Spawn the process and arm the cancellation watcher.
    ///
    /// Fails with [`ExecError::AlreadyCancelled`] without spawning anything
    /// if the token has already fired.
    pub fn start(&mut self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(ExecError::AlreadyCancelled);
        }
        if !matches!(self.state, State::Idle) {
            return Err(ExecError::AlreadyStarted);
        }

        let child = self.command.spawn().map_err(ExecError::Spawn)?;
        let target = ProcessSignaller::new(child.signal_handle(), self.wait_done.clone());
        info!(pid = ?child.id(), command = %self.describe(), "Started cancellable process");

        tokio::spawn(watch(
            self.token.clone(),
            self.wait_done.clone(),
            self.released.clone(),
            self.policy.take(),
            target,
        ));
        self.state = State::Running(child);
        Ok(())
    }

    /// Wait for the process to exit.
    ///
    /// Disarms the cancellation watcher. A non-zero exit or death by signal
    /// is reported as [`ExecError::Exit`].
    pub async fn wait(&mut self) -> Result<ExitOutcome> {
        let child = match &mut self.state {
            State::Idle => return Err(ExecError::NotStarted),
            State::Finished => return Err(ExecError::AlreadyWaited),
            State::Running(child) => child,
        };

        let result = child.wait().await;
        self.state = State::Finished;
        self.wait_done.cancel();

        let outcome = result.map_err(ExecError::Wait)?;
        debug!(command = %self.describe(), %outcome, "Process exited");
        if outcome.success() {
            Ok(outcome)
        } else {
            Err(ExitError::new(outcome).into())
        }
    }

    /// Start the process and wait for it to exit
    pub async fn run(&mut self) -> Result<ExitOutcome> {
        self.start()?;
        self.wait().await
    }

    /// Run the process with stdout and stderr captured into one buffer.
    ///
    /// On abnormal exit the captured bytes are attached to the error.
    pub async fn combined_output(&mut self) -> Result<Vec<u8>> {
        if self.command.stdout_bound() {
            return Err(ExecError::StreamAlreadyBound(StreamKind::Stdout));
        }
        if self.command.stderr_bound() {
            return Err(ExecError::StreamAlreadyBound(StreamKind::Stderr));
        }

        let buffer = SharedBuffer::<Vec<u8>>::default();
        let sink = OutputSink::new(buffer.clone());
        self.command.set_stdout(sink.clone());
        self.command.set_stderr(sink);

        match self.run().await {
            Ok(_) => Ok(buffer.contents()),
            Err(ExecError::Exit(mut e)) => {
                e.stderr = buffer.contents();
                Err(e.into())
            }
            Err(e) => Err(e),
        }
    }

    /// Run the process and return its stdout.
    ///
    /// Unless stderr is already bound, its head and tail (32 KiB each) are
    /// kept and attached to the error on abnormal exit.
    pub async fn capture_output(&mut self) -> Result<Vec<u8>> {
        self.capture_output_with_limit(DEFAULT_CAPTURE_LIMIT).await
    }

    pub async fn capture_output_with_limit(&mut self, stderr_limit: usize) -> Result<Vec<u8>> {
        if self.command.stdout_bound() {
            return Err(ExecError::StreamAlreadyBound(StreamKind::Stdout));
        }

        let stdout = SharedBuffer::<Vec<u8>>::default();
        self.command.set_stdout(OutputSink::new(stdout.clone()));

        let stderr = if self.command.stderr_bound() {
            None
        } else {
            let buffer = SharedBuffer::new(PrefixSuffixBuffer::new(stderr_limit));
            self.command.set_stderr(OutputSink::new(buffer.clone()));
            Some(buffer)
        };

        match self.run().await {
            Ok(_) => Ok(stdout.contents()),
            Err(ExecError::Exit(mut e)) => {
                if let Some(buffer) = stderr {
                    e.stderr = buffer.with(PrefixSuffixBuffer::to_bytes);
                }
                Err(e.into())
            }
            Err(e) => Err(e),
        }
    }
}

impl<C: Command> fmt::Display for CancellableCommand<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl<C: Command> Drop for CancellableCommand<C> {
    fn drop(&mut self) {
        let State::Running(child) = &self.state else {
            return;
        };
        // The child is released unreaped; stop the watcher before its pid
        // can be reused.
        self.released.cancel();
        let pid = child.id();
        debug!(?pid, command = %self.describe(), "Dropped while running, killing process");
        if let Err(e) = child.signal_handle().kill() {
            warn!(?pid, error = %e, "Failed to kill released process");
        }
    }
}

async fn watch(
    token: CancellationToken,
    wait_done: CancellationToken,
    released: CancellationToken,
    policy: Option<Box<dyn TerminationPolicy>>,
    target: ProcessSignaller,
) {
    tokio::select! {
        _ = token.cancelled() => match policy {
            None => {
                debug!(pid = ?target.id(), "Cancelled, killing process");
                if let Err(e) = target.kill() {
                    warn!(pid = ?target.id(), error = %e, "Failed to kill cancelled process");
                }
            }
            Some(policy) => {
                debug!(pid = ?target.id(), "Cancelled, running termination policy");
                policy.terminate(target).await;
            }
        },
        _ = wait_done.cancelled() => {}
        _ = released.cancelled() => {}
    }
}
