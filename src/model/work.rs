//! Work definitions handed to [`AsyncWorkers`](crate::engine::AsyncWorkers).

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::WorkContext;

// ---------------------------------------------------------------------------
// Work ID
// ---------------------------------------------------------------------------

/// Newtype for work IDs. Only used to correlate log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Work
// ---------------------------------------------------------------------------

/// The function a work runs. Receives the execution context and a copy of
/// the work's params.
pub type WorkFn =
    Arc<dyn Fn(WorkContext, Vec<serde_json::Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A unit of asynchronous work.
///
/// Built by the caller, then owned by the workers once submitted. A work
/// without a function is rejected by `add_work`.
#[derive(Clone)]
pub struct Work {
    pub id: WorkId,
    func: Option<WorkFn>,
    /// Positional arguments passed to the function. Opaque to the workers.
    pub params: Vec<serde_json::Value>,
    pub delivered_at: DateTime<Utc>,
}

impl Work {
    /// Create a work that runs `f`.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(WorkContext, Vec<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::default().func(f)
    }

    pub fn func<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(WorkContext, Vec<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let func: WorkFn = Arc::new(move |ctx, params| f(ctx, params).boxed());
        self.func = Some(func);
        self
    }

    pub fn params(mut self, params: Vec<serde_json::Value>) -> Self {
        self.params = params;
        self
    }

    pub fn param(mut self, param: impl Into<serde_json::Value>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn delivered_at(mut self, at: DateTime<Utc>) -> Self {
        self.delivered_at = at;
        self
    }

    pub fn has_func(&self) -> bool {
        self.func.is_some()
    }

    pub(crate) fn function(&self) -> Option<&WorkFn> {
        self.func.as_ref()
    }
}

impl Default for Work {
    fn default() -> Self {
        Self {
            id: WorkId::new(),
            func: None,
            params: Vec::new(),
            delivered_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for Work {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Work")
            .field("id", &self.id)
            .field("has_func", &self.func.is_some())
            .field("params", &self.params)
            .field("delivered_at", &self.delivered_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of one key's status, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStatusSnapshot {
    pub working: bool,
    /// The work currently executing, if any.
    pub current: Option<WorkId>,
    pub started_at: Option<DateTime<Utc>>,
    /// The replacement that will run once the current work completes.
    pub pending: Option<WorkId>,
}
