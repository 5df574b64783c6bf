use thiserror::Error;

use crate::geometry::PartId;

/// Structural conditions the search cannot recover from.
///
/// These are returned through `anyhow::Result` and can be recovered with
/// `downcast_ref::<InvariantViolation>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("reference index {ref_idx} is out of range, the list holds at most {max} references")]
    ReferenceOutOfRange { ref_idx: usize, max: usize },
    #[error("partition {part:?} costs {actual}, but its sub-blocks add up to {expected}")]
    PartitionSum {
        part: PartId,
        expected: u32,
        actual: u32,
    },
    #[error("layer {level} of {what} is missing or has the wrong size")]
    LayerMismatch { level: usize, what: &'static str },
    #[error("plane padding of {pad} pixels is below the required {required}")]
    PaddingTooSmall { pad: usize, required: usize },
    #[error(
        "{what} is {found_width}x{found_height}, expected {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        what: &'static str,
        expected_width: usize,
        expected_height: usize,
        found_width: usize,
        found_height: usize,
    },
}
