//! Logging setup.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingSettings};

static INIT: Once = Once::new();

/// `RUST_LOG` wins over the configured level.
fn build_env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber. Later calls are no-ops.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(settings: &LoggingSettings) {
    INIT.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(build_env_filter(&settings.level))
            .with_target(true)
            .with_writer(std::io::stderr);

        let result = match settings.format {
            LogFormat::Text => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        if let Err(e) = result {
            eprintln!("failed to install tracing subscriber: {}", e);
        }
    });
}
