//! Helpers shared by the integration suites.

use promissory::scheduler::ThreadScheduler;
use promissory::{Core, CoreConfig};
use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes logging once per test binary; honors `RUST_LOG`.
pub fn init_test_logging() {
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

/// A core context over a small freshly started scheduler.
pub fn test_core() -> Core {
    let config = CoreConfig::default().with_worker_threads(2);
    Core::new(ThreadScheduler::start(&config), config)
}
