//! Block CSR matrix-vector product

use bytemuck::{Pod, Zeroable};
use wgpu::Buffer;

use super::pipeline::{LayoutKey, PipelineCache, WORKGROUP_SIZE, workgroup_count};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct SpmvParams {
    /// Scalar output rows (`nrows * block_size`)
    rows: u32,
    block_size: u32,
    _pad0: u32,
    _pad1: u32,
}

fn bsr_spmv_shader() -> String {
    format!(
        r#"// y = A x for block CSR, one thread per scalar output row

struct SpmvParams {{
    rows: u32,
    block_size: u32,
    _pad0: u32,
    _pad1: u32,
}}

@group(0) @binding(0) var<storage, read> row_ptrs: array<u32>;
@group(0) @binding(1) var<storage, read> col_indices: array<u32>;
@group(0) @binding(2) var<storage, read> values: array<f32>;
@group(0) @binding(3) var<storage, read> x: array<f32>;
@group(0) @binding(4) var<storage, read_write> y: array<f32>;
@group(0) @binding(5) var<uniform> params: SpmvParams;

@compute @workgroup_size({wg})
fn bsr_spmv(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let idx = gid.x;
    if (idx >= params.rows) {{
        return;
    }}

    let bs = params.block_size;
    let block_row = idx / bs;
    let r = idx % bs;

    var sum: f32 = 0.0;
    for (var k = row_ptrs[block_row]; k < row_ptrs[block_row + 1u]; k = k + 1u) {{
        let col = col_indices[k];
        let base = k * bs * bs + r * bs;
        for (var c: u32 = 0u; c < bs; c = c + 1u) {{
            sum = sum + values[base + c] * x[col * bs + c];
        }}
    }}
    y[idx] = sum;
}}
"#,
        wg = WORKGROUP_SIZE
    )
}

/// Launch `y = A x`
///
/// # Buffers
///
/// - `row_ptrs`: block row pointers [nrows + 1] (u32)
/// - `col_indices`: block column indices [nnzb] (u32)
/// - `values`: row-major blocks [nnzb * bs * bs] (f32)
/// - `x`: input [ncols * bs], `y`: output [nrows * bs]
#[allow(clippy::too_many_arguments)]
pub fn launch_bsr_spmv(
    cache: &PipelineCache,
    row_ptrs: &Buffer,
    col_indices: &Buffer,
    values: &Buffer,
    x: &Buffer,
    y: &Buffer,
    nrows: usize,
    block_size: usize,
) {
    let rows = nrows * block_size;
    if rows == 0 {
        return;
    }
    let params = cache.uniform(
        "spmv_params",
        &SpmvParams {
            rows: rows as u32,
            block_size: block_size as u32,
            _pad0: 0,
            _pad1: 0,
        },
    );
    let module = cache.get_or_create_module("bsr_spmv", bsr_spmv_shader);
    let layout = cache.get_or_create_layout(LayoutKey {
        num_readonly_storage: 4,
        num_storage_buffers: 1,
        num_uniform_buffers: 1,
    });
    let pipeline = cache.get_or_create_pipeline("bsr_spmv", "bsr_spmv", &module, &layout);
    let bind_group =
        cache.create_bind_group(&layout, &[row_ptrs, col_indices, values, x, y, &params]);
    cache.dispatch("bsr_spmv", &pipeline, &bind_group, workgroup_count(rows));
}
