
use crate::{
    mv::{MotionVector, clip_i16},
    params::PartitionMask,
    util::{median, median4, round_div},
};

/// Number of partition ids a search block is evaluated for.
pub const NUM_PART_IDS: usize = 17;
/// Full pixels kept free between a displaced block and the end of the
/// padding, so that sub-pel samples never read outside the plane.
pub const SUBPEL_MARGIN: usize = 4;

/// One prediction unit of a search block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PartId {
    Part2Nx2N = 0,
    Part2NxNTop,
    Part2NxNBottom,
    PartNx2NLeft,
    PartNx2NRight,
    Part2NxnUTop,
    Part2NxnUBottom,
    Part2NxnDTop,
    Part2NxnDBottom,
    PartNLx2NLeft,
    PartNLx2NRight,
    PartNRx2NLeft,
    PartNRx2NRight,
    PartNxNTopLeft,
    PartNxNTopRight,
    PartNxNBottomLeft,
    PartNxNBottomRight,
}

/// Offset and size of a partition in quarters of the block side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartGeometry {
    pub x: u8,
    pub y: u8,
    pub w: u8,
    pub h: u8,
}

impl PartGeometry {
    const fn new(x: u8, y: u8, w: u8, h: u8) -> Self {
        Self { x, y, w, h }
    }

    /// `(x, y, width, height)` in pixels for a block of `block_size`.
    #[must_use]
    pub const fn pixel_rect(self, block_size: usize) -> (usize, usize, usize, usize) {
        let q = block_size / 4;
        (
            self.x as usize * q,
            self.y as usize * q,
            self.w as usize * q,
            self.h as usize * q,
        )
    }
}

const PART_GEOMETRY: [PartGeometry; NUM_PART_IDS] = [
    PartGeometry::new(0, 0, 4, 4),
    PartGeometry::new(0, 0, 4, 2),
    PartGeometry::new(0, 2, 4, 2),
    PartGeometry::new(0, 0, 2, 4),
    PartGeometry::new(2, 0, 2, 4),
    PartGeometry::new(0, 0, 4, 1),
    PartGeometry::new(0, 1, 4, 3),
    PartGeometry::new(0, 0, 4, 3),
    PartGeometry::new(0, 3, 4, 1),
    PartGeometry::new(0, 0, 1, 4),
    PartGeometry::new(1, 0, 3, 4),
    PartGeometry::new(0, 0, 3, 4),
    PartGeometry::new(3, 0, 1, 4),
    PartGeometry::new(0, 0, 2, 2),
    PartGeometry::new(2, 0, 2, 2),
    PartGeometry::new(0, 2, 2, 2),
    PartGeometry::new(2, 2, 2, 2),
];

impl PartId {
    pub const ALL: [Self; NUM_PART_IDS] = [
        Self::Part2Nx2N,
        Self::Part2NxNTop,
        Self::Part2NxNBottom,
        Self::PartNx2NLeft,
        Self::PartNx2NRight,
        Self::Part2NxnUTop,
        Self::Part2NxnUBottom,
        Self::Part2NxnDTop,
        Self::Part2NxnDBottom,
        Self::PartNLx2NLeft,
        Self::PartNLx2NRight,
        Self::PartNRx2NLeft,
        Self::PartNRx2NRight,
        Self::PartNxNTopLeft,
        Self::PartNxNTopRight,
        Self::PartNxNBottomLeft,
        Self::PartNxNBottomRight,
    ];

    /// The four NxN quadrants in raster order.
    pub const QUADRANTS: [Self; 4] = [
        Self::PartNxNTopLeft,
        Self::PartNxNTopRight,
        Self::PartNxNBottomLeft,
        Self::PartNxNBottomRight,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn geometry(self) -> PartGeometry {
        PART_GEOMETRY[self as usize]
    }

    #[must_use]
    pub const fn part_type(self) -> PartType {
        match self {
            Self::Part2Nx2N => PartType::Size2Nx2N,
            Self::Part2NxNTop | Self::Part2NxNBottom => PartType::Size2NxN,
            Self::PartNx2NLeft | Self::PartNx2NRight => PartType::SizeNx2N,
            Self::Part2NxnUTop | Self::Part2NxnUBottom => PartType::Size2NxnU,
            Self::Part2NxnDTop | Self::Part2NxnDBottom => PartType::Size2NxnD,
            Self::PartNLx2NLeft | Self::PartNLx2NRight => PartType::SizeNLx2N,
            Self::PartNRx2NLeft | Self::PartNRx2NRight => PartType::SizeNRx2N,
            Self::PartNxNTopLeft
            | Self::PartNxNTopRight
            | Self::PartNxNBottomLeft
            | Self::PartNxNBottomRight => PartType::SizeNxN,
        }
    }
}

/// How a search block is split into prediction units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartType {
    Size2Nx2N,
    Size2NxN,
    SizeNx2N,
    Size2NxnU,
    Size2NxnD,
    SizeNLx2N,
    SizeNRx2N,
    SizeNxN,
}

impl PartType {
    pub const ALL: [Self; 8] = [
        Self::Size2Nx2N,
        Self::Size2NxN,
        Self::SizeNx2N,
        Self::Size2NxnU,
        Self::Size2NxnD,
        Self::SizeNLx2N,
        Self::SizeNRx2N,
        Self::SizeNxN,
    ];

    /// Partition ids making up this split, in coding order.
    #[must_use]
    pub const fn parts(self) -> &'static [PartId] {
        match self {
            Self::Size2Nx2N => &[PartId::Part2Nx2N],
            Self::Size2NxN => &[PartId::Part2NxNTop, PartId::Part2NxNBottom],
            Self::SizeNx2N => &[PartId::PartNx2NLeft, PartId::PartNx2NRight],
            Self::Size2NxnU => &[PartId::Part2NxnUTop, PartId::Part2NxnUBottom],
            Self::Size2NxnD => &[PartId::Part2NxnDTop, PartId::Part2NxnDBottom],
            Self::SizeNLx2N => &[PartId::PartNLx2NLeft, PartId::PartNLx2NRight],
            Self::SizeNRx2N => &[PartId::PartNRx2NLeft, PartId::PartNRx2NRight],
            Self::SizeNxN => &PartId::QUADRANTS,
        }
    }

    #[must_use]
    pub fn is_enabled(self, mask: PartitionMask) -> bool {
        let flag = match self {
            Self::Size2Nx2N => PartitionMask::SIZE_2NX2N,
            Self::Size2NxN | Self::SizeNx2N => PartitionMask::SMP,
            Self::Size2NxnU | Self::Size2NxnD | Self::SizeNLx2N | Self::SizeNRx2N => {
                PartitionMask::AMP
            }
            Self::SizeNxN => PartitionMask::NXN,
        };
        mask.contains(flag)
    }
}

/// A set of partition ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartSet(u32);

impl PartSet {
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn single(part: PartId) -> Self {
        Self(1 << part as u32)
    }

    /// Every partition id whose type is enabled by `mask`.
    #[must_use]
    pub fn from_mask(mask: PartitionMask) -> Self {
        let mut set = Self::EMPTY;
        for part_type in PartType::ALL {
            if part_type.is_enabled(mask) {
                for &part in part_type.parts() {
                    set.insert(part);
                }
            }
        }
        set
    }

    pub const fn insert(&mut self, part: PartId) {
        self.0 |= 1 << part as u32;
    }

    #[must_use]
    pub const fn contains(self, part: PartId) -> bool {
        self.0 & (1 << part as u32) != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = PartId> {
        PartId::ALL.into_iter().filter(move |&p| self.contains(p))
    }
}

/// Position of sub-block (`col`, `row`) of the 4x4 sub-block grid, which is
/// stored quadrant by quadrant with each quadrant in raster order.
#[must_use]
pub const fn sub_block_index(col: usize, row: usize) -> usize {
    let quadrant = (col >> 1) + 2 * (row >> 1);
    quadrant * 4 + (row & 1) * 2 + (col & 1)
}

/// Allowed displacements of one block, with exclusive bounds.
///
/// A vector is inside the range iff `min < mv < max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MvRange {
    pub min: MotionVector,
    pub max: MotionVector,
}

impl MvRange {
    #[must_use]
    pub const fn new(min: MotionVector, max: MotionVector) -> Self {
        Self { min, max }
    }

    /// Range of a `size` block at (`x`, `y`) on a `width` x `height` plane
    /// padded by `pad` pixels, limited to the full-pel search range.
    ///
    /// The displaced block keeps [`SUBPEL_MARGIN`] pixels away from the end of
    /// the padding.
    #[must_use]
    pub fn for_block(
        x: usize,
        y: usize,
        size: usize,
        width: usize,
        height: usize,
        search_x: u16,
        search_y: u16,
        pad: usize,
    ) -> Self {
        debug_assert!(pad >= size + SUBPEL_MARGIN);
        let reach = (pad - SUBPEL_MARGIN) as i32;
        let axis = |pos: usize, extent: usize, search: u16| {
            let search = i32::from(search);
            let lo = (-search).max(-reach - pos as i32);
            let hi = search.min(extent as i32 + reach - size as i32 - pos as i32);
            (clip_i16(lo * 4 - 1), clip_i16(hi * 4 + 1))
        };
        let (min_x, max_x) = axis(x, width, search_x);
        let (min_y, max_y) = axis(y, height, search_y);
        Self {
            min: MotionVector::new(min_x, min_y),
            max: MotionVector::new(max_x, max_y),
        }
    }

    #[must_use]
    pub const fn contains(&self, mv: MotionVector) -> bool {
        mv.x > self.min.x && mv.x < self.max.x && mv.y > self.min.y && mv.y < self.max.y
    }

    /// Clamps `mv` to the closest vector inside the range.
    #[must_use]
    pub fn clip(&self, mv: MotionVector) -> MotionVector {
        MotionVector::new(
            clamp_exclusive(mv.x, self.min.x, self.max.x),
            clamp_exclusive(mv.y, self.min.y, self.max.y),
        )
    }

    /// Clamps `mv` to the closest full-pel vector inside the range.
    #[must_use]
    pub fn clip_fullpel(&self, mv: MotionVector) -> MotionVector {
        let (lo, hi) = self.fullpel_bounds();
        MotionVector::new(mv.x.clamp(lo.x, hi.x), mv.y.clamp(lo.y, hi.y))
    }

    /// The largest full-pel aligned range inside this one.
    #[must_use]
    pub fn fullpel_bounds(&self) -> (MotionVector, MotionVector) {
        let lo = |v: i16| (i32::from(v) + 1 + 3).div_euclid(4) * 4;
        let hi = |v: i16| (i32::from(v) - 1).div_euclid(4) * 4;
        (
            MotionVector::new(clip_i16(lo(self.min.x)), clip_i16(lo(self.min.y))),
            MotionVector::new(clip_i16(hi(self.max.x)), clip_i16(hi(self.max.y))),
        )
    }
}

fn clamp_exclusive(v: i16, min: i16, max: i16) -> i16 {
    debug_assert!(i32::from(min) + 1 <= i32::from(max) - 1);
    v.clamp(min.saturating_add(1), max.saturating_sub(1))
}

/// Component-wise median of three vectors.
#[must_use]
pub fn median3_mv(a: MotionVector, b: MotionVector, c: MotionVector) -> MotionVector {
    MotionVector::new(median(a.x, b.x, c.x), median(a.y, b.y, c.y))
}

/// Motion vector predictor of a block from its causal neighbors.
///
/// Median of all four neighbors, or of the other three when the top-left
/// one is missing. Other unavailable neighbors count as the zero vector.
#[must_use]
pub fn mv_predictor(
    left: Option<MotionVector>,
    top: Option<MotionVector>,
    top_right: Option<MotionVector>,
    top_left: Option<MotionVector>,
) -> MotionVector {
    let [l, t, tr] = [left, top, top_right].map(Option::unwrap_or_default);
    let Some(tl) = top_left else {
        return median3_mv(l, t, tr);
    };
    MotionVector::new(
        clip_i16(median4(
            l.x.into(),
            t.x.into(),
            tr.x.into(),
            tl.x.into(),
        )),
        clip_i16(median4(
            l.y.into(),
            t.y.into(),
            tr.y.into(),
            tl.y.into(),
        )),
    )
}

/// Rescales a vector found between pictures `td_src` apart to a pair of
/// pictures `td_dst` apart, rounding to nearest and clipping to `i16`.
#[must_use]
pub fn project_temporal_mv(mv: MotionVector, td_src: i32, td_dst: i32) -> MotionVector {
    if td_src == 0 || td_src == td_dst {
        return mv;
    }
    let scale = |v: i16| {
        let scaled = round_div(i64::from(v) * i64::from(td_dst), i64::from(td_src));
        scaled.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
    };
    MotionVector::new(scale(mv.x), scale(mv.y))
}

/// Expresses a vector of pyramid level `from` in the units of level `to`.
#[must_use]
pub fn project_to_level(mv: MotionVector, from: usize, to: usize) -> MotionVector {
    if from >= to {
        let mut out = mv;
        for _ in to..from {
            out = out.scale_to_finer();
        }
        out
    } else {
        let den = 1i64 << (to - from);
        let scale = |v: i16| clip_i16(round_div(i64::from(v), den) as i32);
        MotionVector::new(scale(mv.x), scale(mv.y))
    }
}
