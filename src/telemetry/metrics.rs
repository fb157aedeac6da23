//! Metric instrument factories for listclean-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"listclean-rs"` meter.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};

/// Returns the shared meter for listclean-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("listclean-rs")
}

/// Counter: queue-store operations (pop, pop_empty, add, cardinality, ...).
/// Labels: `set`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("listclean.queue.operations")
        .with_description("Number of queue store operations")
        .build()
}

/// Gauge: set cardinality observed at the last stats read.
/// Labels: `set` ("todo" | "accepted" | "rejected").
pub fn queue_depth() -> Gauge<u64> {
    meter()
        .u64_gauge("listclean.queue.depth")
        .with_description("Items in each queue set")
        .build()
}

/// Counter: items written to a result set.
/// Labels: `verdict` ("accepted" | "rejected").
pub fn items_classified() -> Counter<u64> {
    meter()
        .u64_counter("listclean.items.classified")
        .with_description("Number of items classified")
        .build()
}

/// Counter: verification attempts that failed instead of answering.
/// Labels: `kind` ("io" | "timeout" | "dns" | "protocol" | "proxy" | "invalid_item").
pub fn verify_errors() -> Counter<u64> {
    meter()
        .u64_counter("listclean.verify.errors")
        .with_description("Number of verification failures")
        .build()
}

/// Counter: items popped but not classified because the run was cancelled.
/// Labels: `result` ("requeued" | "lost").
pub fn items_abandoned() -> Counter<u64> {
    meter()
        .u64_counter("listclean.items.abandoned")
        .with_description("Items interrupted by cancellation")
        .build()
}

/// Counter: proxy endpoint selections.
/// Labels: `policy`.
pub fn proxy_selections() -> Counter<u64> {
    meter()
        .u64_counter("listclean.proxy.selections")
        .with_description("Number of proxy endpoint selections")
        .build()
}

/// Histogram: verification duration in milliseconds.
/// Labels: `verdict`.
pub fn verify_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("listclean.verify.duration_ms")
        .with_description("Verification duration in milliseconds")
        .with_unit("ms")
        .build()
}
