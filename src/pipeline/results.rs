//! Append-only collection of accepted spots shared by the workers.

use crate::spot::LocalizedSpot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Thread-safe result sink with drop counters.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    spots: Mutex<Vec<LocalizedSpot>>,
    rejected_fits: AtomicUsize,
    rejected_gate: AtomicUsize,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an accepted spot.
    pub fn push(&self, spot: LocalizedSpot) {
        self.spots.lock().push(spot);
    }

    /// Counts a candidate whose fit was unusable.
    pub fn record_rejected_fit(&self) {
        self.rejected_fits.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a candidate dropped by the acceptance gate.
    pub fn record_rejected_gate(&self) {
        self.rejected_gate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.spots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rejected_fits(&self) -> usize {
        self.rejected_fits.load(Ordering::Relaxed)
    }

    pub fn rejected_gate(&self) -> usize {
        self.rejected_gate.load(Ordering::Relaxed)
    }

    /// Consumes the aggregator, returning spots ordered by plane and then by
    /// candidate index, independent of which worker appended them.
    pub fn into_sorted(self) -> Vec<LocalizedSpot> {
        let mut spots = self.spots.into_inner();
        spots.sort_by(|a, b| {
            a.plane
                .cmp(&b.plane)
                .then_with(|| a.candidate_index.cmp(&b.candidate_index))
        });
        spots
    }
}
