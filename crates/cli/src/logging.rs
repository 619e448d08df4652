//! Tracing setup for the CLI.
//!
//! `RUST_LOG` wins when set; otherwise the filter derives from the
//! verbosity flags. Engine diagnostics (expansion traces, scheduling,
//! depfile warnings) all flow through this subscriber; task banners and
//! the tally are printed separately by the engine's reporter.

use tracing_subscriber::filter::EnvFilter;

pub fn init(verbosity: u8, debug: bool, trace: bool) {
    let level = if debug || trace || verbosity >= 2 {
        "debug"
    } else if verbosity == 1 {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("hancho_core={level},hancho_cli={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
