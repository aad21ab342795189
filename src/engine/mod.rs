//! Async workers: per-key single-flight dispatch with cancel-and-coalesce.

pub mod context;
pub(crate) mod status;
pub mod workers;

pub use context::WorkContext;
pub use workers::AsyncWorkers;
