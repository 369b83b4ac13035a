//! Logging setup for the `cloudbuild` binary.
//!
//! Batch reports and listings own stdout, so every log line goes to stderr.
//! With `--verbose` the launcher's own events drop to `debug` while the HTTP
//! client stack stays at `warn`; connection chatter from `hyper` and
//! `reqwest` would otherwise bury the per-step events.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Crates held at `warn` unless `RUST_LOG` says otherwise.
pub const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "reqwest", "rustls", "h2"];

fn default_filter(level: Level) -> EnvFilter {
    QUIET_DEPENDENCIES
        .iter()
        .filter_map(|krate| format!("{}=warn", krate).parse().ok())
        .fold(EnvFilter::new(level.as_str()), EnvFilter::add_directive)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. `json` switches stderr output to
/// newline-delimited JSON. Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let output = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let output = if json {
        output.json().boxed()
    } else {
        output.boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .ok();
}
