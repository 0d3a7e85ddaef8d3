//! Logging bootstrap

use crate::config::DebugConfig;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this
/// more than once is harmless; later calls are ignored.
pub fn init(debug: &DebugConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(debug.log_level.as_filter()));

    if debug.log_to_file {
        match std::fs::File::create(&debug.log_path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file))
                    .try_init();
                return;
            }
            Err(e) => {
                eprintln!(
                    "softquad: cannot open log file {}: {e}",
                    debug.log_path.display()
                );
            }
        }
    }

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
