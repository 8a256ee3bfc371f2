//! Core configuration with environment variable overrides.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic** — fields set directly on [`CoreConfig`]
//! 2. **Environment variables** — `PROMISSORY_*` overrides via
//!    [`CoreConfig::from_env`] or [`apply_env_overrides`]
//! 3. **Defaults** — [`CoreConfig::default`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `PROMISSORY_MAX_CHAIN_DEPTH` | `u32` | `max_chain_depth` |
//! | `PROMISSORY_WORKER_THREADS` | `usize` | `worker_threads` |
//! | `PROMISSORY_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |

use std::num::NonZeroUsize;
use std::thread;

/// Environment variable name for the continuation recursion limit.
pub const ENV_MAX_CHAIN_DEPTH: &str = "PROMISSORY_MAX_CHAIN_DEPTH";
/// Environment variable name for worker thread count.
pub const ENV_WORKER_THREADS: &str = "PROMISSORY_WORKER_THREADS";
/// Environment variable name for worker thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "PROMISSORY_THREAD_NAME_PREFIX";

/// Error produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable was set but could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// The offending environment variable.
        var: &'static str,
        /// The unparseable value.
        value: String,
    },
}

/// Configuration for the future/promise core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Maximum synchronous continuation dispatch depth before a callback is
    /// re-dispatched as a fresh scheduler unit.
    pub max_chain_depth: u32,
    /// Number of OS worker threads in the reference scheduler.
    pub worker_threads: usize,
    /// Name prefix for scheduler worker threads.
    pub thread_name_prefix: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: 100,
            worker_threads: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
            thread_name_prefix: "promissory-worker".to_string(),
        }
    }
}

impl CoreConfig {
    /// Builds a configuration from defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Sets the continuation recursion limit.
    #[must_use]
    pub fn with_max_chain_depth(mut self, depth: u32) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Sets the reference scheduler worker count.
    #[must_use]
    pub fn with_worker_threads(mut self, workers: usize) -> Self {
        self.worker_threads = workers.max(1);
        self
    }
}

/// Apply environment variable overrides to a [`CoreConfig`].
///
/// Only variables that are set in the environment are applied. Returns an
/// error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut CoreConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_MAX_CHAIN_DEPTH) {
        config.max_chain_depth = parse_u32(ENV_MAX_CHAIN_DEPTH, &val)?;
    }
    if let Some(val) = read_env(ENV_WORKER_THREADS) {
        config.worker_threads = parse_usize(ENV_WORKER_THREADS, &val)?.max(1);
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    Ok(())
}

fn read_env(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse_u32(var: &'static str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

fn parse_usize(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}
