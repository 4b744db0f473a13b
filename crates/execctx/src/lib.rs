//! # execctx
//!
//! Run child processes that stop the way you choose when a
//! [`CancellationToken`] fires.
//!
//! The standard approach to cancelling a child process is to SIGKILL it.
//! Here the caller supplies a [`TerminationPolicy`] instead: send SIGINT and
//! wait, close stdin and read an acknowledgement, or anything else. Without
//! a policy the process is killed.
//!
//! ```rust,no_run
//! use execctx::{CancellationToken, CommandSpec, GracefulShutdown, ShutdownConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = CommandSpec::builder()
//!     .program("my-server")
//!     .args(["--port", "8080"])
//!     .build()?;
//!
//! let token = CancellationToken::new();
//! let policy = GracefulShutdown::new(ShutdownConfig::patient());
//! let mut cmd = execctx::command(token.clone(), &spec, Some(Box::new(policy)));
//!
//! cmd.start()?;
//! // ... later, from anywhere holding a clone of the token:
//! token.cancel();
//! let result = cmd.wait().await;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("execctx currently supports Unix targets only");

mod factory;

pub use execctx_core::*;
pub use factory::{PlatformCommand, PlatformCommandFactory};

/// Cancellable command for the current platform
pub type Cmd = CancellableCommand<PlatformCommand>;

/// Build a cancellable command for `spec` on the current platform.
///
/// A `None` policy kills the process with SIGKILL when `token` fires.
pub fn command(
    token: CancellationToken,
    spec: &CommandSpec,
    policy: Option<Box<dyn TerminationPolicy>>,
) -> Cmd {
    tracing::debug!(
        platform = PlatformCommandFactory::platform_name(),
        command = %spec.describe(),
        "Creating cancellable command"
    );
    CancellableCommand::new(token, PlatformCommandFactory::create_command(spec), policy)
}
