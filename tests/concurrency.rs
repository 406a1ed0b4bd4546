use spotloc::lowlevel::ResultAggregator;
use spotloc::{
    DetectionParams, FitSettings, ImageStack, Localizer, LocalizedSpot, OwnedImage, PlaneIndex,
    RunSummary, StopToken,
};
use std::sync::Arc;

const SIZE: usize = 64;
const GRID: [usize; 4] = [8, 24, 40, 56];

/// 4x4 grid of spots spaced 16 px apart, with sub-pixel offsets varying per
/// frame so every plane fits differently.
fn grid_plane(frame: usize) -> OwnedImage<f32> {
    let offset = 0.1 * frame as f64;
    let mut data = vec![10.0f32; SIZE * SIZE];
    for &gy in &GRID {
        for &gx in &GRID {
            let (cx, cy) = (gx as f64 + offset, gy as f64 - offset);
            for y in gy - 6..=(gy + 6).min(SIZE - 1) {
                for x in gx - 6..=(gx + 6).min(SIZE - 1) {
                    let dx = x as f64 - cx;
                    let dy = y as f64 - cy;
                    data[y * SIZE + x] += (1000.0 * (-(dx * dx + dy * dy) / 2.88).exp()) as f32;
                }
            }
        }
    }
    OwnedImage::new(data, SIZE, SIZE).unwrap()
}

fn settings(worker_threads: usize, queue_soft_cap: usize) -> FitSettings {
    FitSettings {
        detection: DetectionParams {
            noise_amplitude: Some(10.0),
            ..DetectionParams::default()
        },
        worker_threads,
        queue_soft_cap,
        ..FitSettings::default()
    }
}

fn run(stack: &mut ImageStack, settings: FitSettings) -> (RunSummary, Vec<LocalizedSpot>) {
    let mut spots = Vec::new();
    let summary = Localizer::new(settings)
        .unwrap()
        .run(stack, None, &mut spots, &StopToken::new())
        .unwrap();
    (summary, spots)
}

fn grid_stack(frames: usize) -> ImageStack {
    ImageStack::frames((0..frames).map(grid_plane).collect()).unwrap()
}

#[test]
fn result_is_independent_of_worker_count() {
    let (single, reference) = run(&mut grid_stack(3), settings(1, 1024));
    assert_eq!(single.workers, 1);
    assert_eq!(reference.len(), 48);

    for workers in [2, 4, 8] {
        let (summary, spots) = run(&mut grid_stack(3), settings(workers, 1024));
        assert_eq!(summary.workers, workers);
        assert_eq!(summary.failed_workers, 0);
        assert_eq!(spots, reference, "{workers} workers");
    }
}

#[test]
fn worker_hint_is_capped() {
    let (summary, spots) = run(&mut grid_stack(1), settings(64, 1024));
    assert_eq!(summary.workers, 8);
    assert_eq!(spots.len(), 16);
}

#[test]
fn tiny_soft_cap_throttles_without_losing_windows() {
    let (_, reference) = run(&mut grid_stack(4), settings(2, 1024));
    let (summary, spots) = run(&mut grid_stack(4), settings(2, 1));
    assert_eq!(summary.windows, 64);
    assert_eq!(spots, reference);
}

#[test]
fn fatal_fit_error_stops_only_one_worker() {
    let mut plane = grid_plane(0);
    plane.data_mut()[24 * SIZE + 40] = f32::INFINITY;
    let mut stack = ImageStack::single(plane);

    let (summary, spots) = run(&mut stack, settings(4, 1024));
    assert_eq!(summary.workers, 4);
    assert_eq!(summary.failed_workers, 1);
    assert_eq!(summary.windows, 16);
    assert_eq!(spots.len(), 15);
    assert!(spots
        .iter()
        .all(|s| (s.x_px - 40.0).abs() > 1.0 || (s.y_px - 24.0).abs() > 1.0));
}

#[test]
fn run_ends_when_the_only_worker_fails() {
    let mut plane = grid_plane(0);
    plane.data_mut()[24 * SIZE + 40] = f32::INFINITY;
    let mut stack = ImageStack::single(plane);

    let (summary, spots) = run(&mut stack, settings(1, 1));
    assert_eq!(summary.failed_workers, 1);
    // Candidates are queued in x order; (40, 24) is the tenth.
    assert_eq!(spots.len(), 9);
    assert!(spots.iter().all(|s| s.candidate_index < 9));
}

#[test]
fn aggregator_orders_concurrent_pushes() {
    let results = Arc::new(ResultAggregator::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let results = Arc::clone(&results);
            std::thread::spawn(move || {
                for i in 0..50 {
                    let index = i * 8 + t;
                    results.push(LocalizedSpot {
                        plane: PlaneIndex::new(0, 0, index % 3),
                        candidate_index: index,
                        x: 0.0,
                        y: 0.0,
                        x_px: 0.0,
                        y_px: 0.0,
                        photons: 1.0,
                        background: 0.0,
                        width: 1.0,
                        sigma_x: 1.0,
                        sigma_y: 1.0,
                        angle: None,
                        precision: 0.1,
                        photon_precision: 0.1,
                        defocus: None,
                        iterations: 1,
                        converged: true,
                    });
                    if i % 10 == 0 {
                        results.record_rejected_fit();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let results = Arc::try_unwrap(results).unwrap();
    assert_eq!(results.len(), 400);
    assert_eq!(results.rejected_fits(), 40);
    let spots = results.into_sorted();
    for pair in spots.windows(2) {
        let a = (pair[0].plane, pair[0].candidate_index);
        let b = (pair[1].plane, pair[1].candidate_index);
        assert!(a < b);
    }
}
