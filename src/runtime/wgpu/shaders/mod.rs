//! WGSL compute shaders and their launchers
//!
//! Each launcher builds (or fetches from the [`PipelineCache`]) one compute
//! pipeline and submits a single dispatch. All vectors are `f32` on the
//! device; index arrays are `u32`.
//!
//! - `blas` - dot product reduction, axpy, recombine
//! - `spmv` - block CSR matrix-vector product
//! - `trsv` - one level of a block triangular sweep

mod blas;
mod pipeline;
mod spmv;
mod trsv;

pub use blas::{MAX_REDUCE_GROUPS, launch_axpy, launch_dot, launch_recombine};
pub use pipeline::{LayoutKey, PipelineCache, WORKGROUP_SIZE, workgroup_count};
pub use spmv::launch_bsr_spmv;
pub use trsv::launch_block_trsv_level;
