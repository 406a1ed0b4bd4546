//! Producer/consumer localization pipeline.
//!
//! The calling thread acts as the coordinator: it walks the planes of a
//! [`PixelSource`], detects and windows candidates, and feeds the windows to
//! a pool of scoped fit workers through a [`CandidateQueue`]. Shutdown uses a
//! single sentinel that each worker pushes back before exiting, so any pool
//! size drains without a shared countdown.

pub mod queue;
pub mod results;
pub mod worker;

use crate::candidate::{CandidateDetector, SpotWindower};
use crate::image::{PixelSource, Roi};
use crate::settings::FitSettings;
use crate::spot::LocalizedSpot;
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{LocalizeError, LocalizeResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use queue::{CandidateQueue, QueueItem};
pub use results::ResultAggregator;
pub use worker::WorkerExit;

use worker::{run_worker, WorkerContext};

/// Pause between queue-length checks while the queue is over its soft cap.
const BACKPRESSURE_PAUSE: Duration = Duration::from_millis(1);

/// Receives the outcome of a run.
pub trait CompletionHandler {
    /// Called once with every accepted spot.
    fn list_ready(&mut self, spots: &[LocalizedSpot]);

    /// Called after `list_ready`, when the run has fully finished.
    fn processing_ended(&mut self) {}
}

impl CompletionHandler for Vec<LocalizedSpot> {
    fn list_ready(&mut self, spots: &[LocalizedSpot]) {
        self.extend_from_slice(spots);
    }
}

/// Cooperative cancellation flag shared with the caller.
///
/// Stopping prevents further planes from being enumerated; windows already
/// queued are still fitted.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counters describing a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Planes that were detected and windowed.
    pub planes: usize,
    pub candidates: usize,
    /// Windows handed to the workers.
    pub windows: usize,
    /// Candidates dropped by the windower.
    pub rejected_windows: usize,
    /// Accepted spots.
    pub spots: usize,
    pub rejected_fits: usize,
    pub rejected_gate: usize,
    pub workers: usize,
    pub failed_workers: usize,
}

#[derive(Default)]
struct ProducerCounts {
    planes: usize,
    candidates: usize,
    windows: usize,
    rejected_windows: usize,
}

/// Runs detection, windowing and fitting over a pixel source.
#[derive(Clone, Debug)]
pub struct Localizer {
    settings: FitSettings,
}

impl Localizer {
    /// Takes a validated settings snapshot for all subsequent runs.
    pub fn new(settings: FitSettings) -> LocalizeResult<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &FitSettings {
        &self.settings
    }

    /// Localizes every plane of `source` inside `roi` (the whole plane when
    /// `None`) and hands the result to `handler`.
    ///
    /// Spots are delivered ordered by plane and candidate index. On a
    /// run-level error the workers are still shut down and joined, and the
    /// handler is not called.
    pub fn run<S, H>(
        &self,
        source: &mut S,
        roi: Option<Roi>,
        handler: &mut H,
        stop: &StopToken,
    ) -> LocalizeResult<RunSummary>
    where
        S: PixelSource + ?Sized,
        H: CompletionHandler + ?Sized,
    {
        let settings = &self.settings;
        let roi = roi.unwrap_or_else(|| Roi::full(source.width(), source.height()));
        roi.check_within(source.width(), source.height())?;

        let worker_count = settings.worker_count();
        let _span = trace_span!(
            "localize_run",
            planes = source.dims().plane_count(),
            workers = worker_count
        )
        .entered();

        let fitter = settings.fitter()?;
        let queue = CandidateQueue::new();
        let results = ResultAggregator::new();
        let alive = AtomicUsize::new(0);

        let (produced, exits) = std::thread::scope(|scope| {
            let ctx = WorkerContext {
                queue: &queue,
                results: &results,
                fitter,
                calibration: &settings.calibration,
                filters: &settings.filters,
                alive: &alive,
            };

            let mut handles = Vec::with_capacity(worker_count);
            for id in 0..worker_count {
                alive.fetch_add(1, Ordering::AcqRel);
                let spawned = std::thread::Builder::new()
                    .name(format!("spotloc-fit-{id}"))
                    .spawn_scoped(scope, move || run_worker(id, ctx));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        alive.fetch_sub(1, Ordering::AcqRel);
                        queue.push_sentinel();
                        return Err(LocalizeError::WorkerSpawn {
                            reason: err.to_string(),
                        });
                    }
                }
            }

            let produced = self.produce(source, roi, &queue, &alive, stop);
            queue.push_sentinel();

            let exits: Vec<WorkerExit> = handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(WorkerExit::Panicked))
                .collect();
            Ok((produced, exits))
        })?;
        let produced = produced?;

        let summary = RunSummary {
            planes: produced.planes,
            candidates: produced.candidates,
            windows: produced.windows,
            rejected_windows: produced.rejected_windows,
            spots: results.len(),
            rejected_fits: results.rejected_fits(),
            rejected_gate: results.rejected_gate(),
            workers: exits.len(),
            failed_workers: exits.iter().filter(|exit| exit.is_failure()).count(),
        };

        let spots = results.into_sorted();
        if spots.is_empty() {
            trace_warn!("no spots found", planes = summary.planes, windows = summary.windows);
        }
        trace_event!(
            "localize_done",
            spots = summary.spots,
            rejected_fits = summary.rejected_fits,
            rejected_gate = summary.rejected_gate,
            failed_workers = summary.failed_workers
        );

        handler.list_ready(&spots);
        handler.processing_ended();
        Ok(summary)
    }

    /// Coordinator loop: enumerates planes and enqueues windows.
    fn produce<S>(
        &self,
        source: &mut S,
        roi: Roi,
        queue: &CandidateQueue,
        alive: &AtomicUsize,
        stop: &StopToken,
    ) -> LocalizeResult<ProducerCounts>
    where
        S: PixelSource + ?Sized,
    {
        let settings = &self.settings;
        let detector = CandidateDetector::new(settings.detection);
        let windower = SpotWindower::new(settings.windowing, settings.detection.search_half_size);
        let mut counts = ProducerCounts::default();

        for index in source.dims().planes() {
            if stop.is_stopped() {
                trace_event!("localize_stopped", planes = counts.planes);
                break;
            }
            let _plane_span = trace_span!(
                "plane",
                position = index.position,
                frame = index.frame,
                slice = index.slice,
                channel = index.channel
            )
            .entered();

            let plane = source.plane(index)?;
            let candidates = detector.detect(plane, roi, index)?;
            counts.candidates += candidates.len();
            for candidate in &candidates {
                match windower.window(plane, candidate) {
                    Ok(window) => {
                        wait_for_capacity(queue, settings.queue_soft_cap, alive);
                        queue.push(window);
                        counts.windows += 1;
                    }
                    Err(_) => counts.rejected_windows += 1,
                }
            }
            counts.planes += 1;
        }
        Ok(counts)
    }
}

/// Sleeps while the queue holds more than `soft_cap` items and some worker
/// is still able to drain it.
fn wait_for_capacity(queue: &CandidateQueue, soft_cap: usize, alive: &AtomicUsize) {
    let mut paused = false;
    while queue.len() > soft_cap && alive.load(Ordering::Acquire) > 0 {
        if !paused {
            trace_event!("backpressure", queued = queue.len(), soft_cap = soft_cap);
            paused = true;
        }
        std::thread::sleep(BACKPRESSURE_PAUSE);
    }
}

#[cfg(test)]
mod tests {
    use super::{CompletionHandler, StopToken};
    use crate::spot::LocalizedSpot;

    #[test]
    fn stop_token_is_shared_between_clones() {
        let token = StopToken::new();
        let clone = token.clone();
        assert!(!clone.is_stopped());
        token.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn vec_handler_collects_spots() {
        let mut sink: Vec<LocalizedSpot> = Vec::new();
        sink.list_ready(&[]);
        sink.processing_ended();
        assert!(sink.is_empty());
    }
}
