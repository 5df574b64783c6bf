//! Hierarchical motion estimation for block-based video encoders.
//!
//! Every frame is searched on a pyramid of resolutions, coarsest first. The
//! winners of each layer seed the next finer one; the full-resolution layer
//! refines them to quarter-pel precision and merges the results of each
//! 64x64 coding tree block bottom-up into a [`CuTree`].
// Performance
#![warn(clippy::clear_with_drain)]
#![warn(clippy::format_collect)]
#![warn(clippy::format_push_string)]
#![warn(clippy::imprecise_flops)]
#![warn(clippy::inefficient_to_string)]
#![warn(clippy::inline_always)]
#![warn(clippy::iter_with_drain)]
#![warn(clippy::large_include_file)]
#![warn(clippy::large_types_passed_by_value)]
#![deny(clippy::linkedlist)]
// Can result in worse code generation: https://github.com/rust-lang/rust-clippy/issues/14944
#![allow(clippy::manual_div_ceil)]
#![warn(clippy::mutex_atomic)]
#![warn(clippy::mutex_integer)]
#![warn(clippy::naive_bytecount)]
#![warn(clippy::needless_bitwise_bool)]
#![warn(clippy::needless_collect)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::non_std_lazy_statics)]
#![warn(clippy::non_zero_suggestions)]
#![warn(clippy::or_fun_call)]
#![warn(clippy::rc_buffer)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::ref_option)]
#![warn(clippy::set_contains_or_insert)]
#![warn(clippy::stable_sort_primitive)]
#![warn(clippy::string_lit_chars_any)]
#![warn(clippy::suboptimal_flops)]
#![warn(clippy::trivial_regex)]
#![warn(clippy::trivially_copy_pass_by_ref)]
#![warn(clippy::unnecessary_box_returns)]
#![warn(clippy::unnecessary_join)]
#![warn(clippy::unused_async)]
#![warn(clippy::verbose_file_reads)]
// Readability/Code Intention
#![warn(clippy::checked_conversions)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::cloned_instead_of_copied)]
#![warn(clippy::enum_glob_use)]
#![warn(clippy::equatable_if_let)]
#![warn(clippy::filter_map_next)]
#![warn(clippy::flat_map_option)]
#![warn(clippy::if_then_some_else_none)]
#![warn(clippy::implicit_clone)]
#![warn(clippy::inconsistent_struct_constructor)]
#![warn(clippy::invalid_upcast_comparisons)]
#![warn(clippy::iter_filter_is_ok)]
#![warn(clippy::iter_filter_is_some)]
#![warn(clippy::iter_on_empty_collections)]
#![warn(clippy::iter_on_single_items)]
#![warn(clippy::macro_use_imports)]
#![warn(clippy::manual_assert)]
#![warn(clippy::manual_instant_elapsed)]
#![warn(clippy::manual_is_power_of_two)]
#![warn(clippy::manual_is_variant_and)]
#![warn(clippy::manual_let_else)]
#![warn(clippy::manual_string_new)]
#![warn(clippy::map_unwrap_or)]
#![warn(clippy::map_with_unused_argument_over_ranges)]
#![warn(clippy::match_bool)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::needless_continue)]
#![warn(clippy::needless_pass_by_ref_mut)]
#![warn(clippy::option_as_ref_cloned)]
#![warn(clippy::option_if_let_else)]
#![warn(clippy::pathbuf_init_then_push)]
#![warn(clippy::precedence_bits)]
#![warn(clippy::range_minus_one)]
#![warn(clippy::range_plus_one)]
#![warn(clippy::redundant_test_prefix)]
#![warn(clippy::ref_option_ref)]
#![warn(clippy::semicolon_if_nothing_returned)]
#![warn(clippy::tests_outside_test_module)]
#![warn(clippy::transmute_ptr_to_ptr)]
#![warn(clippy::unused_peekable)]
#![warn(clippy::unused_rounding)]
#![warn(clippy::verbose_bit_mask)]
#![warn(clippy::zero_sized_map_values)]
// Correctness/Safety
#![warn(clippy::case_sensitive_file_extension_comparisons)]
#![deny(clippy::cfg_not_test)]
#![warn(clippy::collection_is_never_read)]
#![warn(clippy::create_dir)]
#![warn(clippy::dbg_macro)]
#![deny(clippy::debug_assert_with_mut_call)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![warn(clippy::filetype_is_file)]
#![warn(clippy::future_not_send)]
#![warn(clippy::ignore_without_reason)]
#![warn(clippy::infinite_loop)]
#![warn(clippy::large_futures)]
#![warn(clippy::large_stack_arrays)]
#![warn(clippy::large_stack_frames)]
#![warn(clippy::manual_midpoint)]
#![warn(clippy::maybe_infinite_iter)]
#![warn(clippy::mem_forget)]
#![warn(clippy::mismatching_type_param_order)]
#![warn(clippy::mixed_read_write_in_expression)]
#![warn(clippy::mut_mut)]
#![deny(clippy::non_send_fields_in_send_ty)]
#![warn(clippy::path_buf_push_overwrite)]
#![warn(clippy::rc_mutex)]
#![warn(clippy::read_zero_byte_vec)]
#![deny(clippy::significant_drop_in_scrutinee)]
#![warn(clippy::str_split_at_newline)]
#![warn(clippy::string_slice)]
#![warn(clippy::suspicious_operation_groupings)]
#![warn(clippy::suspicious_xor_used_as_pow)]
#![warn(clippy::transmute_undefined_repr)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(clippy::unnecessary_debug_formatting)]
#![warn(clippy::unwrap_used)]
// Annoyances
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::uninlined_format_args)]
#![allow(unsafe_op_in_unsafe_fn)]



#[cfg(feature = "bench")]
pub mod average;
#[cfg(feature = "bench")]
pub mod candidates;
#[cfg(feature = "bench")]
pub mod cluster;
#[cfg(feature = "bench")]
pub mod cost;
#[cfg(feature = "bench")]
pub mod cu_tree;
#[cfg(feature = "bench")]
pub mod error;
#[cfg(feature = "bench")]
pub mod geometry;
#[cfg(feature = "bench")]
pub mod kernels;
#[cfg(feature = "bench")]
pub mod layer;
#[cfg(feature = "bench")]
pub mod merge;
#[cfg(feature = "bench")]
pub mod mv;
#[cfg(feature = "bench")]
pub mod orchestrator;
#[cfg(feature = "bench")]
pub mod pad;
#[cfg(feature = "bench")]
pub mod params;
#[cfg(feature = "bench")]
pub mod plane;
#[cfg(feature = "bench")]
pub mod pyramid;
#[cfg(feature = "bench")]
pub mod reduce;
#[cfg(feature = "bench")]
pub mod reference;
#[cfg(feature = "bench")]
pub mod refine;
#[cfg(feature = "bench")]
pub mod result_bank;
#[cfg(feature = "bench")]
pub mod subpel;
#[cfg(feature = "bench")]
pub mod sync;
#[cfg(feature = "bench")]
pub mod util;
#[cfg(feature = "bench")]
pub mod weighted;

#[cfg(not(feature = "bench"))]
mod average;
#[cfg(not(feature = "bench"))]
mod candidates;
#[cfg(not(feature = "bench"))]
mod cluster;
#[cfg(not(feature = "bench"))]
mod cost;
#[cfg(not(feature = "bench"))]
mod cu_tree;
#[cfg(not(feature = "bench"))]
mod error;
#[cfg(not(feature = "bench"))]
mod geometry;
#[cfg(not(feature = "bench"))]
mod kernels;
#[cfg(not(feature = "bench"))]
mod layer;
#[cfg(not(feature = "bench"))]
mod merge;
#[cfg(not(feature = "bench"))]
mod mv;
#[cfg(not(feature = "bench"))]
mod orchestrator;
#[cfg(not(feature = "bench"))]
mod pad;
#[cfg(not(feature = "bench"))]
mod params;
#[cfg(not(feature = "bench"))]
mod plane;
#[cfg(not(feature = "bench"))]
mod pyramid;
#[cfg(not(feature = "bench"))]
mod reduce;
#[cfg(not(feature = "bench"))]
mod reference;
#[cfg(not(feature = "bench"))]
mod refine;
#[cfg(not(feature = "bench"))]
mod result_bank;
#[cfg(not(feature = "bench"))]
mod subpel;
#[cfg(not(feature = "bench"))]
mod sync;
#[cfg(not(feature = "bench"))]
mod util;
#[cfg(not(feature = "bench"))]
mod weighted;

pub use cu_tree::{CuNode, CuTree, MergeState};
pub use error::InvariantViolation;
pub use geometry::{MvRange, PartId, PartType};
pub use kernels::CpuFeatureLevel;
pub use layer::{BankEntry, GlobalMv, LayerContext, MvBank, MvBankSnapshot};
pub use mv::{MAX_COST, MotionVector, SearchNode};
pub use orchestrator::{FrameMeInput, FrameMeResult, HmeEngine, MeWorker};
pub use params::{
    COARSE_BLOCK_SIZE,
    CTB_SIZE,
    CostMetric,
    ENCODE_BLOCK_SIZE,
    MIN_PAD,
    MeConfig,
    PartitionMask,
    QualityPreset,
};
pub use plane::Plane;
pub use pyramid::{FramePyramid, PyramidLevel, SubpelPlanes};
pub use reference::{RefList, ReferenceDescriptor};
pub use result_bank::{BestOverall, PredKind};
pub use sync::{NoopSync, RowSync};
pub use util::Pixel;
pub use weighted::WeightParams;
