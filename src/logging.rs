//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; installing a subscriber is left to the
//! embedding application. [`init_tracing`] is a convenience for binaries and tests:
//! it reads the filter from `BATCHSTAGE_LOG` (default `info`) and is safe to call
//! repeatedly.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "BATCHSTAGE_LOG";

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install a formatted subscriber filtered by [`LOG_ENV`].
pub fn init_tracing() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter),
        );

        // Another subscriber may already be installed by the host application.
        if subscriber.try_init().is_err() {
            tracing::debug!("global tracing subscriber already set, keeping it");
        }
    });
}
