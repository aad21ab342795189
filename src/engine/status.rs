//! Per-key status bookkeeping.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::model::Work;

/// Status of one key. Only touched while holding the workers lock.
///
/// While `working` is set, `cancel_token` and `work` are always present.
/// The token survives a reset to idle so that a live one can be reused by
/// the next dispatch.
#[derive(Debug, Default)]
pub(crate) struct WorkStatus {
    pub(crate) working: bool,
    pub(crate) cancel_token: Option<CancellationToken>,
    pub(crate) work: Option<Arc<Work>>,
    pub(crate) started_at: Option<DateTime<Utc>>,
}

impl WorkStatus {
    pub(crate) fn is_working(&self) -> bool {
        self.working
    }

    /// Returns the token for the next dispatch, minting a new one when there
    /// is none yet or the previous one was cancelled.
    pub(crate) fn refresh_token(&mut self) -> CancellationToken {
        match self.cancel_token {
            Some(ref token) if !token.is_cancelled() => token.clone(),
            _ => {
                let token = CancellationToken::new();
                self.cancel_token = Some(token.clone());
                token
            }
        }
    }

    /// Mark the key as running `work`.
    pub(crate) fn begin(&mut self, work: Arc<Work>) {
        self.working = true;
        self.work = Some(work);
        self.started_at = Some(Utc::now());
    }

    /// Back to idle. The token is kept.
    pub(crate) fn reset(&mut self) {
        self.working = false;
        self.work = None;
        self.started_at = None;
    }
}
