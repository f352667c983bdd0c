//! Logging init for the gateway.
//!
//! Grounded on `crates/synapse-telemetry/src/lib.rs::init`, stripped to the `fmt`-layer
//! branch only: no metrics backend is named in scope (provider latency/throughput
//! metrics are sourced from the Key Health Tracker and Dispatcher's own bookkeeping,
//! not an external metrics system), so the OTLP exporter machinery carried by the
//! teacher's version has no counterpart here.

/// Initialize `tracing_subscriber` with an `EnvFilter` built from `log_filter`, falling
/// back to `"info"` if it fails to parse (matching the teacher's fallback).
pub fn init(log_filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
