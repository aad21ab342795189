//! Work execution span helpers.

use tracing::Span;

use crate::model::WorkId;

/// Start a span wrapping one execution of a work.
///
/// The `work.result` field is declared empty and filled in by
/// [`record_outcome`] once the execution ends.
pub fn start_work_span(workers: &str, work_name: &str, work_id: &WorkId) -> Span {
    tracing::info_span!(
        "work.execute",
        "work.workers" = workers,
        "work.name" = work_name,
        "work.id" = %work_id,
        "work.result" = tracing::field::Empty,
    )
}

/// Record how an execution ended on its span.
pub fn record_outcome(span: &Span, result: &str) {
    span.record("work.result", result);
}
