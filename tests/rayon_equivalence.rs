#![cfg(feature = "rayon")]

use spotloc::lowlevel::{band_pass, gaussian_blur};
use spotloc::{CandidateDetector, DetectionParams, OwnedImage, PlaneIndex, Prefilter, Roi};

fn make_plane(width: usize, height: usize) -> OwnedImage<f32> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let texture = ((x * 11) ^ (y * 3) ^ (x * y)) & 0x3F;
            data.push(50.0 + texture as f32 + 0.5 * x as f32);
        }
    }
    for &(cx, cy) in &[(20.0f32, 30.0f32), (70.0, 12.0), (55.0, 48.0)] {
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                data[y * width + x] += 2000.0 * (-(dx * dx + dy * dy) / 3.38).exp();
            }
        }
    }
    OwnedImage::new(data, width, height).unwrap()
}

/// Straightforward clamped separable convolution.
fn reference_blur(img: &OwnedImage<f32>, sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil() as isize;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|d| (-(d * d) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);

    let (w, h) = (img.width() as isize, img.height() as isize);
    let src = img.data();
    let mut rows = vec![0.0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, &kv) in kernel.iter().enumerate() {
                let sx = (x + k as isize - radius).clamp(0, w - 1);
                acc += kv * src[(y * w + sx) as usize];
            }
            rows[(y * w + x) as usize] = acc;
        }
    }
    let mut out = vec![0.0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, &kv) in kernel.iter().enumerate() {
                let sy = (y + k as isize - radius).clamp(0, h - 1);
                acc += kv * rows[(sy * w + x) as usize];
            }
            out[(y * w + x) as usize] = acc;
        }
    }
    out
}

#[test]
fn parallel_blur_matches_reference() {
    let img = make_plane(96, 64);
    for sigma in [1.0f32, 2.5] {
        let blurred = gaussian_blur(img.view(), sigma).unwrap();
        let expected = reference_blur(&img, sigma);
        for (i, (&got, &want)) in blurred.data().iter().zip(&expected).enumerate() {
            assert!(
                (got - want).abs() <= 1e-5 * want.abs().max(1.0),
                "sigma {sigma} pixel {i}: {got} vs {want}"
            );
        }
    }
}

#[test]
fn parallel_band_pass_is_repeatable() {
    let img = make_plane(96, 64);
    let first = band_pass(img.view(), 1.0, 4.0).unwrap();
    for _ in 0..4 {
        let again = band_pass(img.view(), 1.0, 4.0).unwrap();
        assert_eq!(again.data(), first.data());
    }
}

#[test]
fn band_pass_detection_finds_all_spots() {
    let img = make_plane(96, 64);
    let detector = CandidateDetector::new(DetectionParams {
        noise_amplitude: Some(20.0),
        prefilter: Prefilter::BandPass {
            narrow_sigma: 1.0,
            wide_sigma: 4.0,
        },
        ..DetectionParams::default()
    });
    let found = detector
        .detect(img.view(), Roi::full(96, 64), PlaneIndex::default())
        .unwrap();
    for (x, y) in [(20, 30), (70, 12), (55, 48)] {
        assert!(
            found.iter().any(|c| c.x == x && c.y == y),
            "spot at ({x}, {y}) missing"
        );
    }
}
