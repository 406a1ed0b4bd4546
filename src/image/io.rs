//! Convenience helpers for loading planes via the `image` crate.
//!
//! Available when the `image-io` feature is enabled. Pixel values keep their
//! raw camera units (ADU); 8-bit and 16-bit grayscale are both supported.

use crate::image::{ImageStack, OwnedImage};
use crate::util::{LocalizeError, LocalizeResult};
use std::path::Path;

/// Converts a 16-bit grayscale buffer into an `f32` plane.
pub fn plane_from_gray16(
    img: &image::ImageBuffer<image::Luma<u16>, Vec<u16>>,
) -> LocalizeResult<OwnedImage<f32>> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let data = img.as_raw().iter().map(|&v| v as f32).collect();
    OwnedImage::new(data, width, height)
}

/// Converts any decoded image into an `f32` plane, keeping 16-bit depth.
pub fn plane_from_dynamic_image(img: &image::DynamicImage) -> LocalizeResult<OwnedImage<f32>> {
    match img {
        image::DynamicImage::ImageLuma8(gray) => {
            let data = gray.as_raw().iter().map(|&v| v as f32).collect();
            OwnedImage::new(data, gray.width() as usize, gray.height() as usize)
        }
        other => plane_from_gray16(&other.to_luma16()),
    }
}

/// Loads an image from disk as a single `f32` plane.
pub fn load_gray_plane<P: AsRef<Path>>(path: P) -> LocalizeResult<OwnedImage<f32>> {
    let img = image::open(path).map_err(|err| LocalizeError::ImageIo {
        reason: err.to_string(),
    })?;
    plane_from_dynamic_image(&img)
}

/// Loads one plane per path and stacks them as consecutive frames.
pub fn load_frame_series<P: AsRef<Path>>(paths: &[P]) -> LocalizeResult<ImageStack> {
    let planes = paths
        .iter()
        .map(load_gray_plane)
        .collect::<LocalizeResult<Vec<_>>>()?;
    ImageStack::frames(planes)
}
