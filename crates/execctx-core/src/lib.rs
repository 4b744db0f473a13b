//! execctx core - Platform-independent cancellable process coordination
//!
//! This crate provides the traits a process-spawning backend implements,
//! the [`CancellableCommand`] coordinator that races a cancellation token
//! against process exit, termination policies, and the bounded
//! [`PrefixSuffixBuffer`] used to capture diagnostic output.

mod capture;
mod config;
mod coordinator;
mod error;
mod policy;
mod process;
mod stdio;

pub use capture::*;
pub use config::*;
pub use coordinator::*;
pub use error::*;
pub use policy::*;
pub use process::*;
pub use stdio::*;

pub use tokio_util::sync::CancellationToken;
