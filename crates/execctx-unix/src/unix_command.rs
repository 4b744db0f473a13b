use async_trait::async_trait;
use execctx_core::{
    ChildProcess, Command, CommandFactory, CommandSpec, ExitOutcome, InputSource, OutputSink,
    ProcessId, ProcessSignal, Signal, stream,
};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal as NixSignal};
use nix::unistd::Pid as NixPid;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

fn piped_if(bound: bool) -> Stdio {
    if bound { Stdio::piped() } else { Stdio::null() }
}

/// Unix command backed by `tokio::process`
///
/// Streams that are not bound are connected to `/dev/null`.
pub struct UnixCommand {
    spec: CommandSpec,
    stdin: Option<InputSource>,
    stdout: Option<OutputSink>,
    stderr: Option<OutputSink>,
}

impl UnixCommand {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    pub fn stdin_bound(&self) -> bool {
        self.stdin.is_some()
    }

    pub fn set_stdin(&mut self, source: InputSource) {
        self.stdin = Some(source);
    }
}

impl Command for UnixCommand {
    type Child = UnixChild;

    fn describe(&self) -> String {
        self.spec.describe()
    }

    fn stdout_bound(&self) -> bool {
        self.stdout.is_some()
    }

    fn stderr_bound(&self) -> bool {
        self.stderr.is_some()
    }

    fn set_stdout(&mut self, sink: OutputSink) {
        self.stdout = Some(sink);
    }

    fn set_stderr(&mut self, sink: OutputSink) {
        self.stderr = Some(sink);
    }

    fn spawn(&mut self) -> std::io::Result<UnixChild> {
        let mut cmd = tokio::process::Command::new(&self.spec.program);
        cmd.args(&self.spec.args);

        if self.spec.env_clear {
            cmd.env_clear();
        }
        cmd.envs(&self.spec.env);

        if let Some(dir) = &self.spec.working_directory {
            cmd.current_dir(dir);
        }

        cmd.stdin(piped_if(self.stdin.is_some()));
        cmd.stdout(piped_if(self.stdout.is_some()));
        cmd.stderr(piped_if(self.stderr.is_some()));

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let mut output_pumps = Vec::new();
        if let (Some(pipe), Some(sink)) = (child.stdout.take(), self.stdout.clone()) {
            output_pumps.push(tokio::spawn(stream(pipe, sink)));
        }
        if let (Some(pipe), Some(sink)) = (child.stderr.take(), self.stderr.clone()) {
            output_pumps.push(tokio::spawn(stream(pipe, sink)));
        }

        let input_pump = match (child.stdin.take(), self.stdin.take()) {
            (Some(mut pipe), Some(source)) => Some(tokio::spawn(async move {
                let mut reader = source.into_inner();
                // dropping the pipe afterwards delivers EOF to the child
                tokio::io::copy(&mut reader, &mut pipe).await
            })),
            _ => None,
        };

        info!(pid = ?pid, command = %self.describe(), "Spawned Unix process");

        Ok(UnixChild {
            child,
            pid,
            reaped: Arc::new(AtomicBool::new(false)),
            output_pumps,
            input_pump,
            wait_delay: self.spec.wait_delay,
        })
    }
}

/// Unix-specific child process
pub struct UnixChild {
    child: Child,
    pid: Option<ProcessId>,
    reaped: Arc<AtomicBool>,
    output_pumps: Vec<JoinHandle<std::io::Result<u64>>>,
    input_pump: Option<JoinHandle<std::io::Result<u64>>>,
    wait_delay: Option<std::time::Duration>,
}

#[async_trait]
impl ChildProcess for UnixChild {
    fn id(&self) -> Option<ProcessId> {
        self.pid
    }

    fn signal_handle(&self) -> Arc<dyn ProcessSignal> {
        Arc::new(UnixSignal {
            pid: self.pid,
            reaped: self.reaped.clone(),
        })
    }

    async fn wait(&mut self) -> std::io::Result<ExitOutcome> {
        let status = self.child.wait().await;
        self.reaped.store(true, Ordering::SeqCst);
        let outcome = ExitOutcome::from(status?);

        if let Some(pump) = self.input_pump.take() {
            pump.abort();
        }

        // Descendants may hold the pipes open after the child itself exits.
        let deadline = self.wait_delay.map(|delay| Instant::now() + delay);
        let mut copy_error = None;
        for mut pump in self.output_pumps.drain(..) {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, &mut pump).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(pid = ?self.pid, "Output still open after wait delay, abandoning it");
                        pump.abort();
                        continue;
                    }
                },
                None => pump.await,
            };

            match joined {
                Ok(Ok(forwarded)) => {
                    debug!(pid = ?self.pid, forwarded, "Output stream drained");
                }
                Ok(Err(e)) => {
                    warn!(pid = ?self.pid, error = %e, "Failed to forward process output");
                    copy_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!(pid = ?self.pid, error = %e, "Output pump task failed");
                }
            }
        }

        match copy_error {
            Some(e) if outcome.success() => Err(e),
            _ => Ok(outcome),
        }
    }
}

/// Signals a Unix process by pid until its exit has been reaped
struct UnixSignal {
    pid: Option<ProcessId>,
    reaped: Arc<AtomicBool>,
}

impl ProcessSignal for UnixSignal {
    fn id(&self) -> Option<ProcessId> {
        self.pid
    }

    fn signal(&self, sig: Signal) -> std::io::Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        if self.reaped.load(Ordering::SeqCst) {
            debug!(pid, "Process already reaped, not signalling");
            return Ok(());
        }

        let nix_signal = NixSignal::try_from(sig.number())?;
        match signal::kill(NixPid::from_raw(pid as i32), nix_signal) {
            Ok(()) => {
                info!(pid, signal = %sig, "Sent signal to process");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                info!(pid, "Process not found (already terminated)");
                Ok(())
            }
            Err(e) => {
                warn!(pid, signal = %sig, error = %e, "Failed to signal process");
                Err(e.into())
            }
        }
    }
}

/// Factory for creating Unix commands
pub struct UnixCommandFactory;

impl CommandFactory for UnixCommandFactory {
    type Command = UnixCommand;

    fn create_command(spec: &CommandSpec) -> Self::Command {
        UnixCommand::new(spec.clone())
    }

    fn platform_name() -> &'static str {
        "unix"
    }
}
