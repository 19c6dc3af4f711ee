//! Tracing subscriber setup for host processes.

use gm_core::config::GeneralConfig;
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` wins over `general.log_level`. Returns `false` if a
/// subscriber was already installed.
pub fn init_tracing(config: &GeneralConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = if config.log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
