//! Diagnostics go to stderr so stdout stays clean for feedback text.
//!
//! Verbosity comes from `MARGINALIA_LOG` (`EnvFilter` syntax, e.g.
//! `marginalia=debug`); warnings only by default.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "MARGINALIA_LOG";

pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second init (tests, embedding hosts) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
