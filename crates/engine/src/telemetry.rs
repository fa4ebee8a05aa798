//! Tracing setup for embedders and tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// Reads `RUST_LOG` for the filter, defaulting to engine-level info.
/// Loads a `.env` file when present so embedders can configure logging
/// alongside their other settings. Calling this twice is an error; tests
/// should prefer [`try_init`].
pub fn init() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syncline_engine=info,syncline_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Like [`init`] but quietly does nothing if a subscriber is already set.
pub fn try_init() {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syncline_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
