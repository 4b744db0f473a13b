use crate::process::Signal;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Longest grace period a shutdown configuration accepts
const MAX_GRACE_PERIOD_MS: u64 = 10 * 60 * 1000;

/// How a graceful termination policy asks a process to stop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownConfig {
    /// Signal sent first to request shutdown
    #[serde(default = "default_signal")]
    pub signal: Signal,

    /// How long to wait for the process to exit before killing it (in milliseconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            signal: default_signal(),
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl ShutdownConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// SIGINT with a short grace period, for interactive tools
    pub fn interrupt() -> Self {
        Self {
            signal: Signal::Interrupt,
            grace_period_ms: 2_000,
        }
    }

    /// SIGTERM with a long grace period, for servers that drain connections
    pub fn patient() -> Self {
        Self {
            signal: Signal::Terminate,
            grace_period_ms: 30_000,
        }
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.signal == Signal::Kill {
            return Err(anyhow::anyhow!(
                "signal cannot be SIGKILL, use the default policy instead"
            ));
        }

        if self.grace_period_ms > MAX_GRACE_PERIOD_MS {
            return Err(anyhow::anyhow!(
                "grace_period_ms should not exceed 10 minutes"
            ));
        }

        Ok(())
    }

    /// Get the grace period as Duration
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Description of the process to run
#[derive(Default, Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option))]
pub struct CommandSpec {
    pub program: String,
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    /// Start from an empty environment instead of inheriting the parent's
    #[builder(default)]
    pub env_clear: bool,
    #[builder(default)]
    pub working_directory: Option<PathBuf>,
    /// Upper bound on draining output pipes after the process exits
    #[builder(default)]
    pub wait_delay: Option<Duration>,
}

impl CommandSpec {
    pub fn builder() -> CommandSpecBuilder {
        CommandSpecBuilder::default()
    }

    /// Program followed by its arguments, space separated
    pub fn describe(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

impl CommandSpecBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn arg<S: ToString>(&mut self, arg: S) -> &mut Self {
        self.args
            .get_or_insert_with(Vec::new)
            .push(arg.to_string());
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());

        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

// Default value functions for serde
fn default_signal() -> Signal {
    Signal::Terminate
}
fn default_grace_period_ms() -> u64 {
    10_000
}
