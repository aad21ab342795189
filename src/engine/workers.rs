//! Per-key single-flight async workers.
//!
//! At most one execution runs per work name. Work added for a busy name
//! replaces whatever was already waiting for it (latest wins) and cancels the
//! running execution; the replacement is dispatched the moment the running
//! one completes. A background loop drops bookkeeping for idle names.

use futures::FutureExt;
use opentelemetry::KeyValue;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info};

use crate::config::WorkersConfig;
use crate::error::{Error, Result};
use crate::model::{Work, WorkStatusSnapshot};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_outcome, start_work_span};

use super::context::WorkContext;
use super::status::WorkStatus;

/// How one execution of a work ended.
#[derive(Debug)]
pub(crate) enum WorkOutcome {
    Succeeded,
    Failed(anyhow::Error),
    /// The function panicked. Holds the panic message.
    Panicked(String),
}

impl WorkOutcome {
    /// Metric / span label.
    fn as_str(&self) -> &'static str {
        match self {
            WorkOutcome::Succeeded => "ok",
            WorkOutcome::Failed(_) => "error",
            WorkOutcome::Panicked(_) => "panic",
        }
    }
}

#[derive(Default)]
struct Tables {
    statuses: HashMap<String, WorkStatus>,
    /// Latest work added while its name was busy. At most one per name.
    undelivered: HashMap<String, Arc<Work>>,
}

struct Inner {
    config: WorkersConfig,
    tables: Mutex<Tables>,
}

/// Single-flight, cancel-and-coalesce work dispatcher keyed by work name.
///
/// Cheap to clone; clones share the same tables. Both tables sit behind one
/// mutex so "execution just finished" and "new work just arrived" can never
/// interleave. Work itself always runs outside the lock, on its own Tokio
/// task.
#[derive(Clone)]
pub struct AsyncWorkers {
    inner: Arc<Inner>,
}

impl AsyncWorkers {
    /// Create workers with the default cleanup interval.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(WorkersConfig {
            name: name.into(),
            ..WorkersConfig::default()
        })
    }

    pub fn with_config(config: WorkersConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                tables: Mutex::new(Tables::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Add work for `work_name`.
    ///
    /// If nothing is running for the name the work is dispatched right away.
    /// Otherwise it becomes the name's pending replacement, dropping any
    /// earlier one, and the running execution is asked to stop. Never waits
    /// for the work to run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] when called outside a Tokio runtime and
    /// [`Error::InvalidWork`] if the work has no function. Nothing is
    /// recorded in either case.
    pub fn add_work(&self, work_name: &str, work: Work) -> Result<()> {
        let Ok(runtime) = Handle::try_current() else {
            metrics::work_added().add(1, &self.labels("no_runtime"));
            return Err(Error::NoRuntime {
                name: work_name.to_string(),
            });
        };

        if let Err(reason) = validate_work(&work) {
            metrics::work_added().add(1, &self.labels("invalid"));
            return Err(Error::InvalidWork {
                name: work_name.to_string(),
                reason,
            });
        }

        let mut guard = self.lock();
        let tables = &mut *guard;

        info!(
            workers = %self.name(),
            work_name,
            work_id = %work.id,
            params = ?work.params,
            delivered_at = %work.delivered_at,
            "add work"
        );

        let status = tables
            .statuses
            .entry(work_name.to_string())
            .or_insert_with(|| {
                info!(workers = %self.name(), work_name, "create status for work");
                WorkStatus::default()
            });

        let work = Arc::new(work);

        if !status.is_working() {
            info!(
                workers = %self.name(),
                work_name,
                work_id = %work.id,
                "status isn't working, handle work immediately"
            );
            let ctx = context_for_work(status, work_name, &work);
            self.dispatch(&runtime, ctx, work_name, work);
            metrics::work_added().add(1, &self.labels("dispatched"));
            return Ok(());
        }

        info!(
            workers = %self.name(),
            work_name,
            work_id = %work.id,
            "status is working, queue work"
        );

        if let Some(old) = tables
            .undelivered
            .insert(work_name.to_string(), Arc::clone(&work))
        {
            info!(
                workers = %self.name(),
                work_name,
                old_work_id = %old.id,
                old_delivered_at = %old.delivered_at,
                new_work_id = %work.id,
                new_delivered_at = %work.delivered_at,
                "overwrite undelivered work"
            );
            metrics::work_overwritten().add(1, &[self.workers_label()]);
        }

        let (Some(token), Some(current)) = (status.cancel_token.as_ref(), status.work.as_ref())
        else {
            fatal(
                self.name(),
                work_name,
                "working status is missing its cancel token or current work",
            );
        };

        info!(
            workers = %self.name(),
            work_name,
            work_id = %current.id,
            "cancelling current working work"
        );
        token.cancel();
        metrics::work_added().add(1, &self.labels("queued"));

        Ok(())
    }

    /// Spawn the execution of `work` on its own task.
    fn dispatch(&self, runtime: &Handle, ctx: WorkContext, work_name: &str, work: Arc<Work>) {
        let workers = self.clone();
        let work_name = work_name.to_string();
        let span = start_work_span(self.name(), &work_name, &work.id);
        runtime.spawn(
            async move { workers.handle_work(ctx, &work_name, work).await }.instrument(span),
        );
    }

    async fn handle_work(&self, ctx: WorkContext, work_name: &str, work: Arc<Work>) {
        info!(
            workers = %self.name(),
            work_name,
            work_id = %work.id,
            params = ?work.params,
            delivered_at = %work.delivered_at,
            "handle work"
        );

        let started = Instant::now();
        let outcome = match work.function() {
            Some(func) => {
                let run = AssertUnwindSafe(async { func(ctx, work.params.clone()).await });
                match run.catch_unwind().await {
                    Ok(Ok(())) => WorkOutcome::Succeeded,
                    Ok(Err(e)) => WorkOutcome::Failed(e),
                    Err(payload) => WorkOutcome::Panicked(panic_message(payload.as_ref())),
                }
            }
            None => WorkOutcome::Failed(anyhow::anyhow!("work has no function")),
        };

        record_outcome(&tracing::Span::current(), outcome.as_str());
        self.complete_work(work_name, &work, outcome, started.elapsed());
    }

    /// Report the outcome of `completed`, then hand the name to its pending
    /// replacement or mark it idle.
    ///
    /// Failed work is not retried; callers resubmit if they want another try.
    fn complete_work(
        &self,
        work_name: &str,
        completed: &Work,
        outcome: WorkOutcome,
        elapsed: Duration,
    ) {
        let duration_ms = elapsed.as_millis() as u64;
        match &outcome {
            WorkOutcome::Succeeded => info!(
                workers = %self.name(),
                work_name,
                work_id = %completed.id,
                delivered_at = %completed.delivered_at,
                duration_ms,
                "complete work"
            ),
            WorkOutcome::Failed(e) => error!(
                workers = %self.name(),
                work_name,
                work_id = %completed.id,
                delivered_at = %completed.delivered_at,
                duration_ms,
                error = %e,
                "complete work with error"
            ),
            WorkOutcome::Panicked(msg) => error!(
                workers = %self.name(),
                work_name,
                work_id = %completed.id,
                delivered_at = %completed.delivered_at,
                duration_ms,
                panic = %msg,
                "complete work after panic"
            ),
        }
        let labels = self.labels(outcome.as_str());
        metrics::work_completed().add(1, &labels);
        metrics::work_duration_ms().record(elapsed.as_secs_f64() * 1000.0, &labels);

        let mut guard = self.lock();
        let tables = &mut *guard;

        let Some(status) = tables.statuses.get_mut(work_name) else {
            fatal(self.name(), work_name, "completed work has no status");
        };

        if let Some(next) = tables.undelivered.remove(work_name) {
            info!(
                workers = %self.name(),
                work_name,
                work_id = %next.id,
                delivered_at = %next.delivered_at,
                "handle undelivered work"
            );
            let ctx = context_for_work(status, work_name, &next);
            // Always on a runtime task here.
            self.dispatch(&Handle::current(), ctx, work_name, next);
        } else {
            status.reset();
            debug!(workers = %self.name(), work_name, "work status reset to idle");
        }
    }

    /// Start the loop that drops idle statuses every cleanup interval.
    ///
    /// Runs until `stop` is cancelled.
    pub fn start(&self, stop: CancellationToken) -> JoinHandle<()> {
        let workers = self.clone();
        // interval() panics on a zero period.
        let period = self.inner.config.cleanup_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                workers = %workers.name(),
                interval_ms = period.as_millis() as u64,
                "cleanup loop started"
            );

            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        info!(workers = %workers.name(), "cleanup loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        workers.cleanup_work_status();
                    }
                }
            }
        })
    }

    /// Drop the status of every name that is not working. Returns how many
    /// were dropped.
    pub fn cleanup_work_status(&self) -> usize {
        let mut guard = self.lock();
        let before = guard.statuses.len();

        guard.statuses.retain(|work_name, status| {
            if status.is_working() {
                return true;
            }
            debug!(workers = %self.name(), work_name = %work_name, "status not in working, clean it");
            false
        });

        let removed = before - guard.statuses.len();
        if removed > 0 {
            metrics::statuses_cleaned().add(removed as u64, &[self.workers_label()]);
        }
        removed
    }

    /// Is an execution for `work_name` in flight?
    pub fn is_working(&self, work_name: &str) -> bool {
        self.lock()
            .statuses
            .get(work_name)
            .is_some_and(WorkStatus::is_working)
    }

    /// Is a replacement waiting for `work_name`?
    pub fn has_pending(&self, work_name: &str) -> bool {
        self.lock().undelivered.contains_key(work_name)
    }

    /// Snapshot of the status tracked for `work_name`, if any.
    pub fn status(&self, work_name: &str) -> Option<WorkStatusSnapshot> {
        let guard = self.lock();
        let status = guard.statuses.get(work_name)?;
        Some(WorkStatusSnapshot {
            working: status.working,
            current: status.work.as_ref().map(|w| w.id),
            started_at: status.started_at,
            pending: guard.undelivered.get(work_name).map(|w| w.id),
        })
    }

    /// Number of names with a tracked status, working or not.
    pub fn tracked_len(&self) -> usize {
        self.lock().statuses.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.inner
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn workers_label(&self) -> KeyValue {
        KeyValue::new("workers", self.name().to_string())
    }

    fn labels(&self, result: &'static str) -> [KeyValue; 2] {
        [self.workers_label(), KeyValue::new("result", result)]
    }
}

/// Point `status` at `work` and return the context it runs with.
///
/// Called with the workers lock held.
fn context_for_work(status: &mut WorkStatus, work_name: &str, work: &Arc<Work>) -> WorkContext {
    let token = status.refresh_token();
    status.begin(Arc::clone(work));
    WorkContext::new(work_name, work.id, token)
}

fn validate_work(work: &Work) -> std::result::Result<(), String> {
    if !work.has_func() {
        return Err("nil work function".to_string());
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Bookkeeping is inconsistent; carrying on would risk running a name twice
/// or leaving it stuck.
fn fatal(workers: &str, work_name: &str, msg: &str) -> ! {
    error!(workers, work_name, "{msg}");
    std::process::abort()
}
