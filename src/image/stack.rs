//! Plane addressing and the pixel-source abstraction consumed by the pipeline.

use crate::image::{ImageView, OwnedImage};
use crate::util::{LocalizeError, LocalizeResult};

/// Coordinates of one 2D plane inside a multi-dimensional acquisition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaneIndex {
    /// Stage position (multi-position acquisitions).
    pub position: usize,
    /// Time point.
    pub frame: usize,
    /// Z slice.
    pub slice: usize,
    /// Fluorescence channel.
    pub channel: usize,
}

impl PlaneIndex {
    /// Creates an index for a single-position acquisition.
    pub fn new(channel: usize, slice: usize, frame: usize) -> Self {
        Self {
            position: 0,
            frame,
            slice,
            channel,
        }
    }
}

/// Extent of each stack dimension; every count is at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackDims {
    pub positions: usize,
    pub channels: usize,
    pub slices: usize,
    pub frames: usize,
}

impl StackDims {
    /// Dimensions of a single-plane image.
    pub fn single() -> Self {
        Self {
            positions: 1,
            channels: 1,
            slices: 1,
            frames: 1,
        }
    }

    /// Total number of planes.
    pub fn plane_count(&self) -> usize {
        self.positions * self.channels * self.slices * self.frames
    }

    /// Enumerates planes position-major, then frame, slice and channel.
    pub fn planes(&self) -> impl Iterator<Item = PlaneIndex> + '_ {
        (0..self.positions).flat_map(move |position| {
            (0..self.frames).flat_map(move |frame| {
                (0..self.slices).flat_map(move |slice| {
                    (0..self.channels).map(move |channel| PlaneIndex {
                        position,
                        frame,
                        slice,
                        channel,
                    })
                })
            })
        })
    }

    /// Checks that `index` addresses a plane inside these dimensions.
    pub fn check(&self, index: PlaneIndex) -> LocalizeResult<()> {
        let axes = [
            (index.position, self.positions, "position"),
            (index.channel, self.channels, "channel"),
            (index.slice, self.slices, "slice"),
            (index.frame, self.frames, "frame"),
        ];
        for (value, len, context) in axes {
            if value >= len {
                return Err(LocalizeError::PlaneOutOfRange {
                    index: value,
                    len,
                    context,
                });
            }
        }
        Ok(())
    }

    /// Row-major offset of `index` in position/frame/slice/channel order.
    fn offset(&self, index: PlaneIndex) -> usize {
        ((index.position * self.frames + index.frame) * self.slices + index.slice) * self.channels
            + index.channel
    }
}

/// Accessor for the planes of an image source.
///
/// The returned view may borrow an internal buffer that the source reuses for
/// the next plane, so callers must copy out anything they keep.
pub trait PixelSource {
    /// Extent of the stack dimensions.
    fn dims(&self) -> StackDims;

    /// Plane width in pixels.
    fn width(&self) -> usize;

    /// Plane height in pixels.
    fn height(&self) -> usize;

    /// Selects and returns one plane.
    fn plane(&mut self, index: PlaneIndex) -> LocalizeResult<ImageView<'_, f32>>;
}

/// In-memory stack of equally sized `f32` planes.
#[derive(Clone, Debug)]
pub struct ImageStack {
    dims: StackDims,
    width: usize,
    height: usize,
    planes: Vec<OwnedImage<f32>>,
}

impl ImageStack {
    /// Builds a stack from planes ordered position/frame/slice/channel.
    pub fn new(dims: StackDims, planes: Vec<OwnedImage<f32>>) -> LocalizeResult<Self> {
        if dims.positions == 0 || dims.channels == 0 || dims.slices == 0 || dims.frames == 0 {
            return Err(LocalizeError::InvalidInput("stack dimensions must be non-zero"));
        }
        if planes.len() != dims.plane_count() {
            return Err(LocalizeError::InvalidInput(
                "plane count does not match stack dimensions",
            ));
        }
        let first = planes
            .first()
            .ok_or(LocalizeError::InvalidInput("stack has no planes"))?;
        let (width, height) = (first.width(), first.height());
        if planes
            .iter()
            .any(|p| p.width() != width || p.height() != height)
        {
            return Err(LocalizeError::InvalidInput("planes differ in size"));
        }
        Ok(Self {
            dims,
            width,
            height,
            planes,
        })
    }

    /// Wraps a single plane.
    pub fn single(plane: OwnedImage<f32>) -> Self {
        Self {
            dims: StackDims::single(),
            width: plane.width(),
            height: plane.height(),
            planes: vec![plane],
        }
    }

    /// Builds a time series (one plane per frame).
    pub fn frames(planes: Vec<OwnedImage<f32>>) -> LocalizeResult<Self> {
        let dims = StackDims {
            frames: planes.len(),
            ..StackDims::single()
        };
        Self::new(dims, planes)
    }
}

impl PixelSource for ImageStack {
    fn dims(&self) -> StackDims {
        self.dims
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn plane(&mut self, index: PlaneIndex) -> LocalizeResult<ImageView<'_, f32>> {
        self.dims.check(index)?;
        let offset = self.dims.offset(index);
        let plane = self.planes.get(offset).ok_or(LocalizeError::PlaneOutOfRange {
            index: offset,
            len: self.planes.len(),
            context: "stack",
        })?;
        Ok(plane.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planes_enumerate_every_combination_once() {
        let dims = StackDims {
            positions: 1,
            channels: 2,
            slices: 3,
            frames: 2,
        };
        let planes: Vec<_> = dims.planes().collect();
        assert_eq!(planes.len(), 12);
        for (i, p) in planes.iter().enumerate() {
            assert_eq!(dims.offset(*p), i);
        }
    }

    #[test]
    fn check_rejects_out_of_range_axis() {
        let dims = StackDims::single();
        let err = dims.check(PlaneIndex::new(1, 0, 0)).unwrap_err();
        assert_eq!(
            err,
            LocalizeError::PlaneOutOfRange {
                index: 1,
                len: 1,
                context: "channel",
            }
        );
    }
}
