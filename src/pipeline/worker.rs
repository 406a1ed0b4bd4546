//! Fit worker loop.

use crate::candidate::BoundedWindow;
use crate::pipeline::queue::{CandidateQueue, QueueItem};
use crate::pipeline::results::ResultAggregator;
use crate::psf::{FitError, PsfFitter};
use crate::settings::Calibration;
use crate::spot::LocalizedSpot;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::uncertainty::AcceptanceFilters;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How a worker left its loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// Observed the sentinel.
    Drained,
    /// Stopped on a fatal fit error.
    Failed(FitError),
    /// The worker thread panicked.
    Panicked,
}

impl WorkerExit {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Drained)
    }
}

/// Everything a worker borrows from the coordinator.
#[derive(Clone, Copy)]
pub(crate) struct WorkerContext<'a> {
    pub queue: &'a CandidateQueue,
    pub results: &'a ResultAggregator,
    pub fitter: PsfFitter,
    pub calibration: &'a Calibration,
    pub filters: &'a AcceptanceFilters,
    /// Number of workers still inside their loop.
    pub alive: &'a AtomicUsize,
}

enum Rejection {
    Fit(FitError),
    Gate,
}

/// Decrements the live-worker count however the loop ends.
struct AliveGuard<'a>(&'a AtomicUsize);

impl Drop for AliveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Pops windows until the sentinel, fitting and gating each one.
///
/// The caller increments `ctx.alive` before spawning the worker.
pub(crate) fn run_worker(id: usize, ctx: WorkerContext<'_>) -> WorkerExit {
    let _alive = AliveGuard(ctx.alive);
    let _span = trace_span!("fit_worker", worker = id).entered();
    let mut fitted = 0usize;

    loop {
        let window = match ctx.queue.pop() {
            Some(QueueItem::Window(window)) => window,
            Some(QueueItem::Sentinel) => {
                ctx.queue.push_sentinel();
                break;
            }
            None => break,
        };

        match localize(&window, &ctx) {
            Ok(spot) => {
                fitted += 1;
                ctx.results.push(spot);
            }
            Err(Rejection::Fit(err)) if err.is_fatal() => {
                trace_warn!(
                    "fit_worker_failed",
                    worker = id,
                    candidate = window.candidate().index,
                    reason = err.reason()
                );
                return WorkerExit::Failed(err);
            }
            Err(Rejection::Fit(_)) => ctx.results.record_rejected_fit(),
            Err(Rejection::Gate) => ctx.results.record_rejected_gate(),
        }
    }

    trace_event!("fit_worker_done", worker = id, accepted = fitted);
    WorkerExit::Drained
}

fn localize(window: &BoundedWindow, ctx: &WorkerContext<'_>) -> Result<LocalizedSpot, Rejection> {
    let params = ctx.fitter.fit(window).map_err(Rejection::Fit)?;
    let spot = LocalizedSpot::from_fit(window, &params, ctx.calibration).map_err(Rejection::Fit)?;
    ctx.filters.accepts(&spot).map_err(|_| Rejection::Gate)?;
    Ok(spot)
}
