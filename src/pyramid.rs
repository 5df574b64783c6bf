
use std::num::NonZeroUsize;

use anyhow::{Result, bail};

use crate::{
    error::InvariantViolation,
    params::MIN_PAD,
    plane::Plane,
    reduce::reduce_average,
    refine::{refine_diagonal_bilinear, refine_horizontal_bilinear, refine_vertical_bilinear},
    util::Pixel,
};

/// Index of the full-pel plane inside [`SubpelPlanes`].
pub const PLANE_FULL: usize = 0;
/// Samples shifted half a pixel to the right.
pub const PLANE_H: usize = 1;
/// Samples shifted half a pixel down.
pub const PLANE_V: usize = 2;
/// Samples shifted half a pixel right and down.
pub const PLANE_HV: usize = 3;

/// The four half-pel phases of one reference level.
#[derive(Debug, Clone, Copy)]
pub struct SubpelPlanes<'a, T> {
    planes: [&'a Plane<T>; 4],
}

impl<'a, T: Pixel> SubpelPlanes<'a, T> {
    #[must_use]
    pub const fn plane(&self, id: usize) -> &'a Plane<T> {
        self.planes[id]
    }

    #[must_use]
    pub const fn full(&self) -> &'a Plane<T> {
        self.planes[PLANE_FULL]
    }
}

/// One resolution of a [`FramePyramid`].
#[derive(Debug, Clone)]
pub struct PyramidLevel<T> {
    full: Plane<T>,
    halfpel: Option<[Plane<T>; 3]>,
}

impl<T: Pixel> PyramidLevel<T> {
    #[must_use]
    pub const fn plane(&self) -> &Plane<T> {
        &self.full
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.full.width.get()
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.full.height.get()
    }

    /// Half-pel phases, present on levels built for use as a reference.
    #[must_use]
    pub fn subpel(&self) -> Option<SubpelPlanes<'_, T>> {
        self.halfpel.as_ref().map(|[h, v, hv]| SubpelPlanes {
            planes: [&self.full, h, v, hv],
        })
    }

    fn build_halfpel(&mut self) {
        let full = &self.full;
        let width = full.pitch;
        let Some(height) = NonZeroUsize::new(full.padded_height()) else {
            return;
        };
        let mut planes = [0; 3].map(|_| Plane::new(full.width, full.height, full.pad));
        let [h, v, hv] = &mut planes;
        refine_horizontal_bilinear(h.data_mut(), full.data(), full.pitch, width, height);
        refine_vertical_bilinear(v.data_mut(), full.data(), full.pitch, width, height);
        refine_diagonal_bilinear(hv.data_mut(), full.data(), full.pitch, width, height);
        self.halfpel = Some(planes);
    }
}

/// A picture at successively halved resolutions, level 0 being the original.
#[derive(Debug, Clone)]
pub struct FramePyramid<T> {
    levels: Vec<PyramidLevel<T>>,
}

impl<T: Pixel> FramePyramid<T> {
    /// Builds `num_levels` padded levels out of a `width` x `height` picture.
    ///
    /// Each coarser level is a 2x2 average of the one above it. With
    /// `with_subpel` every level also gets its half-pel phases, which is what
    /// a picture needs to serve as a reference.
    pub fn build(
        src: &[T],
        src_pitch: NonZeroUsize,
        width: NonZeroUsize,
        height: NonZeroUsize,
        num_levels: usize,
        pad: usize,
        with_subpel: bool,
    ) -> Result<Self> {
        if pad < MIN_PAD {
            return Err(InvariantViolation::PaddingTooSmall {
                pad,
                required: MIN_PAD,
            }
            .into());
        }
        if src_pitch < width || src.len() < (height.get() - 1) * src_pitch.get() + width.get() {
            return Err(InvariantViolation::DimensionMismatch {
                what: "source buffer",
                expected_width: width.get(),
                expected_height: height.get(),
                found_width: src_pitch.get(),
                found_height: src.len() / src_pitch.get(),
            }
            .into());
        }
        if num_levels == 0 {
            bail!("FramePyramid: at least one level is required.");
        }

        let mut levels: Vec<PyramidLevel<T>> = Vec::with_capacity(num_levels);
        levels.push(PyramidLevel {
            full: Plane::from_slice(src, src_pitch, width, height, pad),
            halfpel: None,
        });
        for level in 1..num_levels {
            let prev = &levels[level - 1].full;
            let (Some(w), Some(h)) = (
                NonZeroUsize::new(prev.width.get() / 2),
                NonZeroUsize::new(prev.height.get() / 2),
            ) else {
                bail!(
                    "FramePyramid: a {}x{} picture cannot be reduced {} times.",
                    width,
                    height,
                    num_levels - 1
                );
            };
            let mut plane = Plane::new(w, h, pad);
            let dest_origin = plane.origin();
            let (dest_pitch, src_pitch) = (plane.pitch, prev.pitch);
            reduce_average(
                &mut plane.data_mut()[dest_origin..],
                &prev.data()[prev.origin()..],
                dest_pitch,
                src_pitch,
                w,
                h,
            );
            plane.pad_edges();
            levels.push(PyramidLevel {
                full: plane,
                halfpel: None,
            });
        }

        if with_subpel {
            for level in &mut levels {
                level.build_halfpel();
            }
        }

        Ok(Self { levels })
    }

    #[must_use]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn level(&self, level: usize) -> Option<&PyramidLevel<T>> {
        self.levels.get(level)
    }

    /// Level `level`, or a [`InvariantViolation::LayerMismatch`] naming `what`.
    pub fn require_level(
        &self,
        level: usize,
        what: &'static str,
    ) -> Result<&PyramidLevel<T>, InvariantViolation> {
        self.levels
            .get(level)
            .ok_or(InvariantViolation::LayerMismatch { level, what })
    }
}
