//! Image views, owned planes and multi-dimensional stacks.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. ROI slices are zero-copy
//! views into the same backing slice and retain the original stride.

use crate::util::{LocalizeError, LocalizeResult};

pub mod filter;
#[cfg(feature = "image-io")]
pub mod io;
mod stack;

pub use stack::{ImageStack, PixelSource, PlaneIndex, StackDims};

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> LocalizeResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> LocalizeResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(LocalizeError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(&self, roi: Roi) -> LocalizeResult<ImageView<'a, T>> {
        roi.check_within(self.width, self.height)?;
        let start = roi
            .y
            .checked_mul(self.stride)
            .and_then(|v| v.checked_add(roi.x))
            .ok_or(LocalizeError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })?;
        let data = self
            .data
            .get(start..)
            .ok_or(LocalizeError::BufferTooSmall {
                needed: start.saturating_add(1),
                got: self.data.len(),
            })?;

        ImageView::new(data, roi.width, roi.height, self.stride)
    }
}

impl ImageView<'_, f32> {
    /// Returns the pixel at signed coordinates, or `None` outside the image.
    #[inline]
    pub(crate) fn at(&self, x: isize, y: isize) -> Option<f32> {
        if x < 0 || y < 0 {
            return None;
        }
        self.get(x as usize, y as usize).copied()
    }
}

/// Owned contiguous image buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedImage<T = f32> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Copy> OwnedImage<T> {
    /// Wraps a row-major buffer of exactly `width * height` elements.
    pub fn new(data: Vec<T>, width: usize, height: usize) -> LocalizeResult<Self> {
        let needed = required_len(width, height, width)?;
        if data.len() < needed {
            return Err(LocalizeError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(LocalizeError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Copies a (possibly strided) view into a contiguous buffer.
    pub fn from_view(view: ImageView<'_, T>) -> LocalizeResult<Self> {
        let width = view.width();
        let height = view.height();
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let row = view.row(y).ok_or(LocalizeError::BufferTooSmall {
                needed: (y + 1) * view.stride(),
                got: view.as_slice().len(),
            })?;
            data.extend_from_slice(row);
        }
        Self::new(data, width, height)
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, T> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the row-major pixel buffer.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns the row-major pixel buffer for in-place edits.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Rectangular region of interest in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roi {
    /// Left column.
    pub x: usize,
    /// Top row.
    pub y: usize,
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

impl Roi {
    /// Creates a region from its top-left corner and size.
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region covering a whole `width x height` plane.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    pub fn x_end(&self) -> usize {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn y_end(&self) -> usize {
        self.y + self.height
    }

    /// Returns true when the pixel lies inside the region.
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && x < self.x_end() && y >= self.y && y < self.y_end()
    }

    /// Verifies that the region is non-empty and fits inside an image.
    pub fn check_within(&self, img_width: usize, img_height: usize) -> LocalizeResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(LocalizeError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let out_of_bounds = LocalizeError::RoiOutOfBounds {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            img_width,
            img_height,
        };
        let end_x = self.x.checked_add(self.width).ok_or(out_of_bounds.clone())?;
        let end_y = self.y.checked_add(self.height).ok_or(out_of_bounds.clone())?;
        if end_x > img_width || end_y > img_height {
            return Err(out_of_bounds);
        }
        Ok(())
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> LocalizeResult<usize> {
    if width == 0 || height == 0 {
        return Err(LocalizeError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(LocalizeError::InvalidStride { width, stride });
    }
    let needed = (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(LocalizeError::InvalidDimensions { width, height })?;
    Ok(needed)
}
