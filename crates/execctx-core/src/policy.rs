//! Termination policies run when a command's cancellation token fires.

use crate::config::ShutdownConfig;
use crate::process::{ProcessId, ProcessSignal, Signal};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle given to a termination policy to act on the running process
#[derive(Clone)]
pub struct ProcessSignaller {
    handle: Arc<dyn ProcessSignal>,
    exited: CancellationToken,
}

impl ProcessSignaller {
    pub fn new(handle: Arc<dyn ProcessSignal>, exited: CancellationToken) -> Self {
        Self { handle, exited }
    }

    pub fn id(&self) -> Option<ProcessId> {
        self.handle.id()
    }

    /// Forcibly kill the process. A process that is already gone is not an error.
    pub fn kill(&self) -> std::io::Result<()> {
        self.handle.kill()
    }

    pub fn signal(&self, signal: Signal) -> std::io::Result<()> {
        self.handle.signal(signal)
    }

    /// Whether the owner of the command has observed the exit
    pub fn has_exited(&self) -> bool {
        self.exited.is_cancelled()
    }

    /// Resolves once the owner of the command has observed the exit
    pub async fn exited(&self) {
        self.exited.cancelled().await
    }
}

/// Action taken when cancellation fires while the process is still running.
///
/// The policy is fully responsible for making the process exit; nothing
/// checks that it did, and nothing bounds how long it takes.
#[async_trait]
pub trait TerminationPolicy: Send + 'static {
    async fn terminate(self: Box<Self>, target: ProcessSignaller);
}

#[async_trait]
impl<F, Fut> TerminationPolicy for F
where
    F: FnOnce(ProcessSignaller) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn terminate(self: Box<Self>, target: ProcessSignaller) {
        (*self)(target).await
    }
}

/// Ask the process to stop, then kill it once the grace period runs out
#[derive(Debug, Clone, Default)]
pub struct GracefulShutdown {
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(config: ShutdownConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TerminationPolicy for GracefulShutdown {
    async fn terminate(self: Box<Self>, target: ProcessSignaller) {
        let pid = target.id();
        let signal = self.config.signal;

        if let Err(e) = target.signal(signal) {
            warn!(?pid, %signal, error = %e, "Failed to request shutdown, killing process");
            if let Err(e) = target.kill() {
                warn!(?pid, error = %e, "Failed to kill process");
            }
            return;
        }
        info!(?pid, %signal, grace_ms = self.config.grace_period_ms, "Requested process shutdown");

        tokio::select! {
            _ = target.exited() => {
                debug!(?pid, "Process exited within grace period");
            }
            _ = tokio::time::sleep(self.config.grace_period()) => {
                warn!(?pid, "Grace period elapsed, killing process");
                if let Err(e) = target.kill() {
                    warn!(?pid, error = %e, "Failed to kill process");
                }
            }
        }
    }
}
