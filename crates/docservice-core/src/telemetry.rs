//! Tracing subscriber setup for the `docservice` binary.
//!
//! Logs always go to stderr; stdout carries answers only.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// HTTP client crates are noisy at debug level.
const QUIET_TARGETS: [&str; 3] = ["hyper", "hyper_util", "reqwest"];

fn default_directives(level: Level) -> String {
    let mut directives = level.as_str().to_lowercase();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let layer = if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .ok();
}
