//! Runs a command until it exits or Ctrl-C is pressed, then stops it
//! gracefully.
//!
//! ```text
//! graceful_stop sleep 600
//! EXECCTX_SHUTDOWN='{"signal":"interrupt","gracePeriodMs":2000}' graceful_stop my-server
//! ```

use anyhow::{Context, Result, bail};
use execctx::{CancellationToken, CommandSpec, ExecError, GracefulShutdown, ShutdownConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn shutdown_config() -> Result<ShutdownConfig> {
    let config = match std::env::var("EXECCTX_SHUTDOWN") {
        Ok(json) => serde_json::from_str(&json).context("invalid EXECCTX_SHUTDOWN")?,
        Err(_) => ShutdownConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut argv = std::env::args().skip(1);
    let Some(program) = argv.next() else {
        bail!("usage: graceful_stop <program> [args...]");
    };
    let spec = CommandSpec::builder()
        .program(program)
        .args(argv)
        .build()?;

    let token = CancellationToken::new();
    let policy = GracefulShutdown::new(shutdown_config()?);
    let mut cmd = execctx::command(token.clone(), &spec, Some(Box::new(policy)));
    info!(command = %cmd, "Running");

    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping child");
            ctrl_c_token.cancel();
        }
    });

    match cmd.run().await {
        Ok(outcome) => info!(%outcome, "Command finished"),
        Err(ExecError::Exit(e)) if token.is_cancelled() => {
            info!(outcome = %e.outcome, "Command stopped after cancellation")
        }
        Err(e) => {
            warn!(error = %e, "Command failed");
            return Err(e.into());
        }
    }
    Ok(())
}
