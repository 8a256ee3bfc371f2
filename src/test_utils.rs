//! Shared helpers for the unit-test suites.

use crate::config::CoreConfig;
use crate::runtime::Core;
use crate::scheduler::{SchedulerHandle, ThreadScheduler};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes test logging exactly once per process.
///
/// Honors `RUST_LOG`; defaults to warnings only so test output stays quiet.
pub(crate) fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A small configuration for tests: two workers, default chain depth.
pub(crate) fn test_config() -> CoreConfig {
    CoreConfig::default().with_worker_threads(2)
}

/// A freshly started scheduler sized by [`test_config`].
pub(crate) fn test_scheduler() -> SchedulerHandle {
    ThreadScheduler::start(&test_config())
}

/// A complete core context over a fresh scheduler.
pub(crate) fn test_core() -> Core {
    Core::new(test_scheduler(), test_config())
}
