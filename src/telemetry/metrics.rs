//! Metric instrument factories for the async workers.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider the instruments are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("qosagent")
}

/// Counter: works passed to `add_work`.
/// Labels: `workers`, `result` ("dispatched" | "queued" | "invalid" | "no_runtime").
pub fn work_added() -> Counter<u64> {
    meter()
        .u64_counter("qosagent.workers.added")
        .with_description("Number of works added")
        .build()
}

/// Counter: pending replacements dropped in favour of a newer work.
/// Labels: `workers`.
pub fn work_overwritten() -> Counter<u64> {
    meter()
        .u64_counter("qosagent.workers.overwritten")
        .with_description("Number of undelivered works overwritten before running")
        .build()
}

/// Counter: finished executions.
/// Labels: `workers`, `result` ("ok" | "error" | "panic").
pub fn work_completed() -> Counter<u64> {
    meter()
        .u64_counter("qosagent.workers.completed")
        .with_description("Number of completed work executions")
        .build()
}

/// Histogram: execution duration in milliseconds.
/// Labels: `workers`, `result`.
pub fn work_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("qosagent.workers.duration_ms")
        .with_description("Work execution duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: idle statuses removed by the cleanup loop.
/// Labels: `workers`.
pub fn statuses_cleaned() -> Counter<u64> {
    meter()
        .u64_counter("qosagent.workers.statuses_cleaned")
        .with_description("Number of idle work statuses cleaned up")
        .build()
}
