
use std::num::NonZeroUsize;

use anyhow::{Result, bail};
use cfg_if::cfg_if;

use crate::{
    average::average2,
    mv::MotionVector,
    params::CostMetric,
    pyramid::{PLANE_FULL, PLANE_H, PLANE_HV, PLANE_V, SubpelPlanes},
    util::{Pixel, bitblt, get_sad, get_satd_with},
};

/// Instruction set the cost kernels are allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CpuFeatureLevel {
    Rust,
    Avx2,
}

impl CpuFeatureLevel {
    pub const ALL: [Self; 2] = [Self::Rust, Self::Avx2];

    /// Whether the running CPU can execute kernels of this level.
    #[must_use]
    pub fn is_supported(self) -> bool {
        match self {
            Self::Rust => true,
            Self::Avx2 => {
                cfg_if! {
                    if #[cfg(target_arch = "x86_64")] {
                        crate::util::has_avx2()
                    } else {
                        false
                    }
                }
            }
        }
    }
}

impl Default for CpuFeatureLevel {
    fn default() -> Self {
        cfg_if! {
            if #[cfg(all(target_arch = "x86_64", not(feature = "no_simd")))] {
                if crate::util::has_avx2() {
                    return Self::Avx2;
                }
            }
        }
        Self::Rust
    }
}

impl TryFrom<i64> for CpuFeatureLevel {
    type Error = anyhow::Error;

    fn try_from(val: i64) -> Result<Self> {
        Ok(match val {
            0 => Self::Rust,
            1 => Self::Avx2,
            _ => bail!("Invalid value for 'cpu', must be 0 or 1, got {val}."),
        })
    }
}

/// Where one of the two samples of a quarter-pel position is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfpelTap {
    /// One of the `PLANE_*` indices of [`SubpelPlanes`]
    pub plane: u8,
    /// Whole-pixel offset added to the block position
    pub dx: u8,
    pub dy: u8,
}

/// The two half-pel samples averaged into a quarter-pel sample. Positions
/// that fall on a half-pel grid point have `a == b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpelTaps {
    pub a: HalfpelTap,
    pub b: HalfpelTap,
}

impl SubpelTaps {
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        self.a.plane == self.b.plane && self.a.dx == self.b.dx && self.a.dy == self.b.dy
    }
}

const fn halfpel_tap(hx: usize, hy: usize) -> HalfpelTap {
    HalfpelTap {
        plane: [PLANE_FULL, PLANE_H, PLANE_V, PLANE_HV][(hx & 1) + 2 * (hy & 1)] as u8,
        dx: (hx >> 1) as u8,
        dy: (hy >> 1) as u8,
    }
}

const fn build_subpel_lookup() -> [SubpelTaps; 16] {
    let mut table = [SubpelTaps {
        a: halfpel_tap(0, 0),
        b: halfpel_tap(0, 0),
    }; 16];
    let mut i = 0;
    while i < 16 {
        let (fx, fy) = (i & 3, i >> 2);
        table[i] = SubpelTaps {
            a: halfpel_tap(fx / 2, fy / 2),
            b: halfpel_tap(fx.div_ceil(2), fy.div_ceil(2)),
        };
        i += 1;
    }
    table
}

/// Taps for every quarter-pel phase, indexed by `frac_x + 4 * frac_y`.
pub const SUBPEL_LOOKUP: [SubpelTaps; 16] = build_subpel_lookup();

/// The pixel-level primitives the search is built on.
///
/// Implementations are selected once per engine through [`select_kernels`].
pub trait CostKernels<T: Pixel>: Send + Sync {
    fn level(&self) -> CpuFeatureLevel;

    fn sad(
        &self,
        width: NonZeroUsize,
        height: NonZeroUsize,
        src: &[T],
        src_pitch: NonZeroUsize,
        ref_: &[T],
        ref_pitch: NonZeroUsize,
    ) -> u64;

    /// 4x4 Walsh-Hadamard transform of a row-major residual, in place.
    fn hadamard4x4(&self, block: &mut [i32; 16]) {
        crate::util::hadamard4x4(block);
    }

    /// SATD over 4x4 tiles, each transformed by [`Self::hadamard4x4`].
    fn satd(
        &self,
        width: NonZeroUsize,
        height: NonZeroUsize,
        src: &[T],
        src_pitch: NonZeroUsize,
        ref_: &[T],
        ref_pitch: NonZeroUsize,
    ) -> u64 {
        get_satd_with(width, height, src, src_pitch, ref_, ref_pitch, |block| {
            CostKernels::<T>::hadamard4x4(self, block);
        })
    }

    fn average(
        &self,
        dest: &mut [T],
        dest_pitch: NonZeroUsize,
        src1: &[T],
        src1_pitch: NonZeroUsize,
        src2: &[T],
        src2_pitch: NonZeroUsize,
        width: NonZeroUsize,
        height: NonZeroUsize,
    );

    /// Distortion under `metric`, saturated to `u32`.
    ///
    /// SATD needs both sides to be multiples of 4 and falls back to SAD
    /// otherwise.
    fn distortion(
        &self,
        metric: CostMetric,
        width: NonZeroUsize,
        height: NonZeroUsize,
        src: &[T],
        src_pitch: NonZeroUsize,
        ref_: &[T],
        ref_pitch: NonZeroUsize,
    ) -> u32 {
        let satd_ok = width.get() % 4 == 0 && height.get() % 4 == 0;
        let d = match metric {
            CostMetric::Satd if satd_ok => {
                self.satd(width, height, src, src_pitch, ref_, ref_pitch)
            }
            _ => self.sad(width, height, src, src_pitch, ref_, ref_pitch),
        };
        u32::try_from(d).unwrap_or(u32::MAX)
    }

    /// Writes the `width` x `height` prediction of the block at (`x`, `y`)
    /// displaced by the quarter-pel vector `mv` into `dest`.
    fn interpolate_subpel(
        &self,
        planes: &SubpelPlanes<'_, T>,
        x: isize,
        y: isize,
        mv: MotionVector,
        width: NonZeroUsize,
        height: NonZeroUsize,
        dest: &mut [T],
        dest_pitch: NonZeroUsize,
    ) {
        let (fx, fy) = mv.frac();
        let (ix, iy) = mv.fullpel();
        let taps = SUBPEL_LOOKUP[fx + 4 * fy];
        let read = |tap: HalfpelTap| {
            let plane = planes.plane(usize::from(tap.plane));
            let data = plane.slice_at(x + ix + isize::from(tap.dx), y + iy + isize::from(tap.dy));
            (data, plane.pitch)
        };
        let (a, a_pitch) = read(taps.a);
        if taps.is_direct() {
            bitblt(dest, dest_pitch, a, a_pitch, width, height);
        } else {
            let (b, b_pitch) = read(taps.b);
            self.average(dest, dest_pitch, a, a_pitch, b, b_pitch, width, height);
        }
    }
}

/// Portable kernels.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustKernels;

impl<T: Pixel> CostKernels<T> for RustKernels {
    fn level(&self) -> CpuFeatureLevel {
        CpuFeatureLevel::Rust
    }

    fn sad(
        &self,
        width: NonZeroUsize,
        height: NonZeroUsize,
        src: &[T],
        src_pitch: NonZeroUsize,
        ref_: &[T],
        ref_pitch: NonZeroUsize,
    ) -> u64 {
        get_sad(width, height, src, src_pitch, ref_, ref_pitch)
    }

    fn average(
        &self,
        dest: &mut [T],
        dest_pitch: NonZeroUsize,
        src1: &[T],
        src1_pitch: NonZeroUsize,
        src2: &[T],
        src2_pitch: NonZeroUsize,
        width: NonZeroUsize,
        height: NonZeroUsize,
    ) {
        average2(
            dest, dest_pitch, src1, src1_pitch, src2, src2_pitch, width, height,
        );
    }
}

/// AVX2 kernels. Only 8-bit SAD is vectorized, everything else forwards to
/// [`RustKernels`].
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Avx2Kernels;

#[cfg(target_arch = "x86_64")]
impl<T: Pixel> CostKernels<T> for Avx2Kernels {
    fn level(&self) -> CpuFeatureLevel {
        CpuFeatureLevel::Avx2
    }

    fn sad(
        &self,
        width: NonZeroUsize,
        height: NonZeroUsize,
        src: &[T],
        src_pitch: NonZeroUsize,
        ref_: &[T],
        ref_pitch: NonZeroUsize,
    ) -> u64 {
        if size_of::<T>() == 1 {
            // SAFETY: a one-byte `Pixel` is `u8`, so the slices can be
            // reinterpreted without changing length or alignment.
            let (src, ref_) = unsafe {
                (
                    std::slice::from_raw_parts(src.as_ptr().cast::<u8>(), src.len()),
                    std::slice::from_raw_parts(ref_.as_ptr().cast::<u8>(), ref_.len()),
                )
            };
            // SAFETY: this kernel set is only handed out when AVX2 is present
            return unsafe {
                crate::util::get_sad_u8_avx2(width, height, src, src_pitch, ref_, ref_pitch)
            };
        }
        get_sad(width, height, src, src_pitch, ref_, ref_pitch)
    }

    fn average(
        &self,
        dest: &mut [T],
        dest_pitch: NonZeroUsize,
        src1: &[T],
        src1_pitch: NonZeroUsize,
        src2: &[T],
        src2_pitch: NonZeroUsize,
        width: NonZeroUsize,
        height: NonZeroUsize,
    ) {
        average2(
            dest, dest_pitch, src1, src1_pitch, src2, src2_pitch, width, height,
        );
    }
}

/// The kernel set for `level`, falling back to [`RustKernels`] when the CPU
/// lacks the requested features.
#[must_use]
pub fn select_kernels<T: Pixel>(level: CpuFeatureLevel) -> &'static dyn CostKernels<T> {
    match level {
        #[cfg(target_arch = "x86_64")]
        CpuFeatureLevel::Avx2 if level.is_supported() => &Avx2Kernels,
        _ => &RustKernels,
    }
}
