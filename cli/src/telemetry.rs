//! Logging setup for the `ci-units` binary.
//!
//! Log output always goes to stderr so that stdout only carries command
//! output. `RUST_LOG` controls filtering (default `warn`) and
//! `CI_UNITS_LOG_FORMAT=json` switches to newline-delimited JSON.

use std::io;

use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Selects the log output format.
pub const LOG_FORMAT_ENV: &str = "CI_UNITS_LOG_FORMAT";

const DEFAULT_FILTER: &str = "warn";

/// Installs the global subscriber and forwards `log` records to it.
///
/// Only the first call has an effect.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(io::stderr)),
        )
    } else {
        tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(false).with_writer(io::stderr)),
        )
    };

    if installed.is_ok() {
        // The library logs through the `log` facade.
        LogTracer::init().ok();
    }
}
