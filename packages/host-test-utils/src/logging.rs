//! Test log output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install a subscriber that writes through the test harness.
///
/// The filter is read from `RUST_LOG` and defaults to `info`. Calling this
/// more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Only the first test in a binary installs the subscriber.
    let _ = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true).with_test_writer())
        .try_init();
}
