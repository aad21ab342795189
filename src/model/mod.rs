//! Core data model.
//!
//! A piece of work is a function to run for a named key (a pod UID, a pool
//! name, a profile key), the params it runs with, and when it was delivered.

pub mod work;

pub use work::{Work, WorkFn, WorkId, WorkStatusSnapshot};
