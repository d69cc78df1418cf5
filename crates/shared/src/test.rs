//! # test
//! Helpers for tests across the workspace.
//!

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, registry, util::SubscriberInitExt};

/// Set a trace level stdout logger for the current test process.
///
/// Safe to call from every test, only the first call installs the logger.
pub fn init_test_logger() {
    let filter = tracing_subscriber::filter::Targets::new().with_default(Level::TRACE);

    let layer = tracing_subscriber::fmt::layer()
        .with_test_writer()
        .with_ansi(true)
        .with_target(false);

    let _ = registry().with(layer).with(filter).try_init();
}
