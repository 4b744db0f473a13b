//! Unix backend for execctx: spawns processes with `tokio::process`,
//! pumps their output into bound sinks and signals them through `nix`.

#[cfg(unix)]
mod unix_command;

#[cfg(unix)]
pub use unix_command::{UnixChild, UnixCommand, UnixCommandFactory};
