
use anyhow::{Result, bail};
use bitflags::bitflags;
use log::warn;

use crate::{geometry::SUBPEL_MARGIN, kernels::CpuFeatureLevel};

/// Speed/quality trade-off selecting the defaults of every search knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityPreset {
    Pristine = 0,
    HighQuality = 1,
    Medium = 2,
    HighSpeed = 3,
    XtremeSpeed = 4,
}

impl TryFrom<i64> for QualityPreset {
    type Error = anyhow::Error;

    fn try_from(val: i64) -> Result<Self> {
        Ok(match val {
            0 => Self::Pristine,
            1 => Self::HighQuality,
            2 => Self::Medium,
            3 => Self::HighSpeed,
            4 => Self::XtremeSpeed,
            _ => bail!("Invalid value for 'preset', must be 0-4, got {val}."),
        })
    }
}

/// Distortion metric used for a search stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostMetric {
    /// Sum of absolute differences.
    Sad = 0,
    /// Sum of absolute Hadamard-transformed differences.
    Satd = 1,
}

impl TryFrom<i64> for CostMetric {
    type Error = anyhow::Error;

    fn try_from(val: i64) -> Result<Self> {
        Ok(match val {
            0 => Self::Sad,
            1 => Self::Satd,
            _ => bail!("Invalid value for 'metric', must be 0 or 1, got {val}."),
        })
    }
}

bitflags! {
    /// Partition shapes the encode layer is allowed to search.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PartitionMask: u8 {
        const SIZE_2NX2N = 0x01;
        /// 2NxN and Nx2N
        const SMP = 0x02;
        /// 2NxnU, 2NxnD, nLx2N and nRx2N
        const AMP = 0x04;
        const NXN = 0x08;
    }
}

/// Largest number of results kept per partition and direction.
pub const MAX_RESULTS: usize = 2;
/// Largest number of pyramid levels, the encode layer included.
pub const MAX_LAYERS: usize = 5;
/// Side of a coding tree block in pixels.
pub const CTB_SIZE: usize = 64;
/// Block size searched on the encode layer.
pub const ENCODE_BLOCK_SIZE: usize = 16;
/// Block size searched on the coarser layers.
pub const COARSE_BLOCK_SIZE: usize = 8;
/// Smallest padding that fits a displaced CTB plus the sub-pel margin.
pub const MIN_PAD: usize = CTB_SIZE + 2 * SUBPEL_MARGIN;

/// All knobs of the motion search, consumed once at engine creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeConfig {
    pub preset: QualityPreset,
    /// Partition shapes searched on the encode layer
    pub part_mask: PartitionMask,
    /// Evaluate bi-prediction when both lists have references
    pub bipred: bool,
    /// Horizontal search range on the encode layer, in full pixels
    pub search_range_x: u16,
    /// Vertical search range on the encode layer, in full pixels
    pub search_range_y: u16,
    /// Diamond iterations at half-pel precision
    pub num_hpel_steps: u8,
    /// Diamond iterations at quarter-pel precision
    pub num_qpel_steps: u8,
    /// Search the four 4x4 quadrants of coarse-layer blocks as well
    pub coarse_4x4: bool,
    /// Pyramid levels including the encode layer
    pub num_layers: usize,
    /// Upper bound on candidates per block after deduplication
    pub max_init_candts: usize,
    /// Results kept per partition and direction
    pub max_results: usize,
    /// Lambda in Q`lambda_q_shift` fixed point
    pub lambda: u32,
    pub lambda_q_shift: u8,
    pub fullpel_metric: CostMetric,
    pub subpel_metric: CostMetric,
    /// Re-centering iterations of the 3x3 full-pel grid around the winner
    pub fpel_refine_iters: u8,
    /// Chebyshev radius in quarter pixels within which vectors join a cluster
    pub cluster_area: i16,
    pub max_clusters_per_ref: usize,
    /// Padding around every pyramid plane, in pixels of that plane
    pub pad: usize,
    pub bit_depth: u8,
    pub cpu_level: CpuFeatureLevel,
}

impl MeConfig {
    #[must_use]
    pub fn from_preset(preset: QualityPreset) -> Self {
        let mut config = Self {
            preset,
            part_mask: PartitionMask::all(),
            bipred: true,
            search_range_x: 64,
            search_range_y: 32,
            num_hpel_steps: 3,
            num_qpel_steps: 3,
            coarse_4x4: true,
            num_layers: 3,
            max_init_candts: 12,
            max_results: 2,
            lambda: 4 << 8,
            lambda_q_shift: 8,
            fullpel_metric: CostMetric::Sad,
            subpel_metric: CostMetric::Satd,
            fpel_refine_iters: 2,
            cluster_area: 8,
            max_clusters_per_ref: 2,
            pad: 96,
            bit_depth: 8,
            cpu_level: CpuFeatureLevel::default(),
        };

        match preset {
            QualityPreset::Pristine => {}
            QualityPreset::HighQuality => {
                config.num_hpel_steps = 2;
                config.num_qpel_steps = 2;
                config.max_init_candts = 10;
            }
            QualityPreset::Medium => {
                config.part_mask = PartitionMask::SIZE_2NX2N | PartitionMask::SMP | PartitionMask::NXN;
                config.num_hpel_steps = 2;
                config.num_qpel_steps = 1;
                config.max_init_candts = 8;
                config.fpel_refine_iters = 1;
            }
            QualityPreset::HighSpeed => {
                config.part_mask = PartitionMask::SIZE_2NX2N | PartitionMask::NXN;
                config.num_hpel_steps = 1;
                config.num_qpel_steps = 1;
                config.max_init_candts = 6;
                config.max_results = 1;
                config.subpel_metric = CostMetric::Sad;
                config.fpel_refine_iters = 1;
                config.max_clusters_per_ref = 1;
            }
            QualityPreset::XtremeSpeed => {
                config.part_mask = PartitionMask::SIZE_2NX2N | PartitionMask::NXN;
                config.bipred = false;
                config.num_hpel_steps = 1;
                config.num_qpel_steps = 0;
                config.coarse_4x4 = false;
                config.num_layers = 2;
                config.max_init_candts = 4;
                config.max_results = 1;
                config.subpel_metric = CostMetric::Sad;
                config.fpel_refine_iters = 0;
                config.max_clusters_per_ref = 1;
            }
        }

        config
    }

    /// Checks the knobs for consistency. Out-of-range values that have an
    /// obvious safe substitute are clamped with a warning instead.
    pub fn validate(&mut self) -> Result<()> {
        if !self.part_mask.contains(PartitionMask::SIZE_2NX2N) {
            bail!("MeConfig: the 2Nx2N partition cannot be disabled.");
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS {
            bail!(
                "MeConfig: max_results must be between 1 and {MAX_RESULTS}, got {}.",
                self.max_results
            );
        }
        if self.num_layers == 0 || self.num_layers > MAX_LAYERS {
            bail!(
                "MeConfig: num_layers must be between 1 and {MAX_LAYERS}, got {}.",
                self.num_layers
            );
        }
        if !(8..=16).contains(&self.bit_depth) {
            bail!("MeConfig: bit_depth must be 8-16, got {}.", self.bit_depth);
        }
        if self.lambda_q_shift == 0 || self.lambda_q_shift > 16 {
            bail!(
                "MeConfig: lambda_q_shift must be between 1 and 16, got {}.",
                self.lambda_q_shift
            );
        }
        if self.max_init_candts == 0 {
            bail!("MeConfig: max_init_candts must be at least 1.");
        }
        if self.max_clusters_per_ref == 0 {
            bail!("MeConfig: max_clusters_per_ref must be at least 1.");
        }
        if self.cluster_area <= 0 {
            bail!("MeConfig: cluster_area must be positive.");
        }
        if self.search_range_x == 0 || self.search_range_y == 0 {
            bail!("MeConfig: search ranges must be positive.");
        }
        if self.pad < MIN_PAD {
            bail!("MeConfig: pad must be at least {MIN_PAD}, got {}.", self.pad);
        }
        if self.num_hpel_steps > 8 {
            warn!(
                "MeConfig: clamping num_hpel_steps {} to 8",
                self.num_hpel_steps
            );
            self.num_hpel_steps = 8;
        }
        if self.num_qpel_steps > 8 {
            warn!(
                "MeConfig: clamping num_qpel_steps {} to 8",
                self.num_qpel_steps
            );
            self.num_qpel_steps = 8;
        }
        Ok(())
    }
}

impl Default for MeConfig {
    fn default() -> Self {
        Self::from_preset(QualityPreset::Medium)
    }
}
