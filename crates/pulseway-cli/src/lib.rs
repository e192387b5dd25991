//! PulseWay CLI - command line tools for the dispatch system.
//!
//! Binaries:
//! - send_one_track: one ambulance driving toward a point
//! - seed_facilities: register a list of hospitals

pub mod sim;

/// Install a plain fmt subscriber so SDK warnings reach the terminal.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pulseway_sdk=info")),
        )
        .try_init();
}
