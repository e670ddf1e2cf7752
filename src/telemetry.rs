//! Tracing bootstrap helpers.
//!
//! Structured events travel through the event bus; `tracing` carries the
//! operational log. Call [`init_tracing`] once at startup to install a
//! subscriber honoring `RUST_LOG`, with span-trace capture for diagnostics.

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the default subscriber. Idempotent: a second call is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(ErrorLayer::default())
        .try_init();
}
