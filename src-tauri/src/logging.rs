//! Tracing setup for the desktop binary.
//!
//! `RUST_LOG` controls filtering; without it the supplied level applies.
//! Setting `IMAGE_ID_LOG_JSON=1` switches to newline-delimited JSON.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_JSON_ENV: &str = "IMAGE_ID_LOG_JSON";

pub fn init_tracing(level: Level) {
    let json = json_requested(std::env::var(LOG_JSON_ENV).ok().as_deref());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // try_init: a second call (tests, hot reload) is silently ignored.
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .try_init()
            .ok();
    }
}

fn json_requested(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}
