//! Log bootstrap shared by binaries and tests.
//!
//! Library code logs through the `log` facade with `target: "holepunch"`; the
//! subscriber installed here bridges those records into `tracing`. Filtering
//! is controlled with `RUST_LOG` (e.g. `RUST_LOG=holepunch=trace`).
pub use tracing::{self, debug, error, info, instrument, trace, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Sets up logging, and installs a panic hook that logs the panic before exiting
pub fn setup_log() {
    std::panic::set_hook(Box::new(|info| {
        error!(target: "holepunch", "Panic occurred: {}", info);
        std::process::exit(1);
    }));

    setup_log_no_panic_hook()
}

/// Sets up logging without touching the panic hook. Safe to call more than once
pub fn setup_log_no_panic_hook() {
    let _ = SubscriberBuilder::default()
        .with_line_number(true)
        .with_file(true)
        .with_span_events(FmtSpan::NONE)
        .with_env_filter(EnvFilter::from_default_env())
        .finish()
        .try_init();
}
