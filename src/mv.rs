
use crate::geometry::PartId;

/// Cost carried by slots that hold no usable result.
pub const MAX_COST: u32 = u32::MAX;

/// A motion vector in quarter-pel units of the layer it was searched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MotionVector {
    pub x: i16,
    pub y: i16,
}

impl MotionVector {
    pub const ZERO: Self = Self { x: 0, y: 0 };
    /// Reserved value marking an intra-coded neighbor.
    pub const INTRA: Self = Self {
        x: i16::MIN,
        y: i16::MIN,
    };

    #[must_use]
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    /// Builds a vector from a displacement in whole pixels.
    #[must_use]
    pub const fn from_fullpel(x: i16, y: i16) -> Self {
        Self {
            x: x.saturating_mul(4),
            y: y.saturating_mul(4),
        }
    }

    #[must_use]
    pub const fn is_intra(self) -> bool {
        self.x == Self::INTRA.x && self.y == Self::INTRA.y
    }

    #[must_use]
    pub const fn is_fullpel(self) -> bool {
        self.x & 3 == 0 && self.y & 3 == 0
    }

    /// Integer part of the displacement, in whole pixels.
    #[must_use]
    pub const fn fullpel(self) -> (isize, isize) {
        ((self.x >> 2) as isize, (self.y >> 2) as isize)
    }

    /// Fractional part of the displacement, in quarter pixels (0-3).
    #[must_use]
    pub const fn frac(self) -> (usize, usize) {
        ((self.x & 3) as usize, (self.y & 3) as usize)
    }

    /// Rounds each component to the nearest whole pixel, halves away from zero.
    #[must_use]
    pub fn round_to_fullpel(self) -> Self {
        fn round(v: i16) -> i16 {
            let v = i32::from(v);
            let r = if v >= 0 { (v + 2) >> 2 } else { -((-v + 2) >> 2) };
            clip_i16(r * 4)
        }
        Self::new(round(self.x), round(self.y))
    }

    /// Displacement of the same motion on a layer with twice the resolution.
    #[must_use]
    pub const fn scale_to_finer(self) -> Self {
        Self {
            x: self.x.saturating_mul(2),
            y: self.y.saturating_mul(2),
        }
    }

    /// Adds an offset in quarter pixels, saturating at the `i16` limits.
    #[must_use]
    pub const fn offset(self, dx: i16, dy: i16) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }

    #[must_use]
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        let dx = (i32::from(self.x) - i32::from(other.x)).unsigned_abs();
        let dy = (i32::from(self.y) - i32::from(other.y)).unsigned_abs();
        dx.max(dy)
    }
}

#[must_use]
pub(crate) fn clip_i16(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// One evaluated (or placeholder) search position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchNode {
    pub mv: MotionVector,
    pub ref_idx: i8,
    pub is_valid: bool,
    pub is_subpel_done: bool,
    pub distortion: u32,
    pub mv_cost: u32,
    pub total_cost: u32,
    pub part_id: PartId,
    /// Distortion removed by sub-pel refinement
    pub sdi: u32,
}

impl SearchNode {
    /// A node that has not been costed yet.
    ///
    /// A negative reference index or the intra sentinel yields an unavailable
    /// node with a zero vector.
    #[must_use]
    pub fn new(mv: MotionVector, ref_idx: i8, part_id: PartId) -> Self {
        let is_valid = ref_idx >= 0 && !mv.is_intra();
        Self {
            mv: if is_valid { mv } else { MotionVector::ZERO },
            ref_idx,
            is_valid,
            is_subpel_done: false,
            distortion: MAX_COST,
            mv_cost: 0,
            total_cost: MAX_COST,
            part_id,
            sdi: 0,
        }
    }

    #[must_use]
    pub fn unavailable(ref_idx: i8, part_id: PartId) -> Self {
        Self {
            is_valid: false,
            ..Self::new(MotionVector::ZERO, ref_idx, part_id)
        }
    }

    #[must_use]
    pub const fn with_cost(mut self, distortion: u32, mv_cost: u32) -> Self {
        self.distortion = distortion;
        self.mv_cost = mv_cost;
        self.total_cost = distortion.saturating_add(mv_cost);
        self
    }

    #[must_use]
    pub const fn has_cost(&self) -> bool {
        self.is_valid && self.total_cost != MAX_COST
    }
}
