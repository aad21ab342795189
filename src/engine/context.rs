//! Execution context handed to every running work.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::model::WorkId;

/// Execution context provided to a work while it runs.
///
/// Cancellation is cooperative: when newer work arrives for the same key the
/// token is cancelled, and the running function is expected to notice and
/// return as soon as it safely can. Nothing is ever killed.
#[derive(Debug, Clone)]
pub struct WorkContext {
    name: String,
    work_id: WorkId,
    cancel_token: CancellationToken,
}

impl WorkContext {
    pub(crate) fn new(name: &str, work_id: WorkId, cancel_token: CancellationToken) -> Self {
        Self {
            name: name.to_string(),
            work_id,
            cancel_token,
        }
    }

    /// The key this work runs under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn work_id(&self) -> WorkId {
        self.work_id
    }

    /// Returns `true` if a replacement has asked this work to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves once cancellation is requested. Meant for `tokio::select!`.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel_token.cancelled()
    }

    /// The underlying token, for passing to APIs that accept one directly.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}
