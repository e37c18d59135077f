//! Level-scheduled block triangular sweep over an ILU(0) factor

use bytemuck::{Pod, Zeroable};
use wgpu::Buffer;

use super::pipeline::{LayoutKey, PipelineCache, WORKGROUP_SIZE, workgroup_count};
use crate::sparse::block::MAX_BLOCK_SIZE;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct TrsvParams {
    level_start: u32,
    level_size: u32,
    block_size: u32,
    lower: u32,
}

fn block_trsv_shader() -> String {
    format!(
        r#"// One level of a block triangular sweep, one thread per block row.
// lower: x_i -= sum_(j<i) L_ij x_j
// upper: x_i  = Dinv_i (x_i - sum_(j>i) U_ij x_j)

const MAX_BS: u32 = {max_bs}u;

struct TrsvParams {{
    level_start: u32,
    level_size: u32,
    block_size: u32,
    lower: u32,
}}

@group(0) @binding(0) var<storage, read> level_rows: array<u32>;
@group(0) @binding(1) var<storage, read> row_ptrs: array<u32>;
@group(0) @binding(2) var<storage, read> col_indices: array<u32>;
@group(0) @binding(3) var<storage, read> diag_ptrs: array<u32>;
@group(0) @binding(4) var<storage, read> values: array<f32>;
@group(0) @binding(5) var<storage, read_write> x: array<f32>;
@group(0) @binding(6) var<uniform> params: TrsvParams;

@compute @workgroup_size({wg})
fn block_trsv_level(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let tid = gid.x;
    if (tid >= params.level_size) {{
        return;
    }}

    let bs = params.block_size;
    let bb = bs * bs;
    let row = level_rows[params.level_start + tid];
    let diag = diag_ptrs[row];

    var acc: array<f32, {max_bs}>;
    for (var r: u32 = 0u; r < bs; r = r + 1u) {{
        acc[r] = x[row * bs + r];
    }}

    var start = row_ptrs[row];
    var end = diag;
    if (params.lower == 0u) {{
        start = diag + 1u;
        end = row_ptrs[row + 1u];
    }}

    for (var k = start; k < end; k = k + 1u) {{
        let col = col_indices[k];
        for (var r: u32 = 0u; r < bs; r = r + 1u) {{
            var s: f32 = 0.0;
            for (var c: u32 = 0u; c < bs; c = c + 1u) {{
                s = s + values[k * bb + r * bs + c] * x[col * bs + c];
            }}
            acc[r] = acc[r] - s;
        }}
    }}

    if (params.lower != 0u) {{
        for (var r: u32 = 0u; r < bs; r = r + 1u) {{
            x[row * bs + r] = acc[r];
        }}
        return;
    }}

    for (var r: u32 = 0u; r < bs; r = r + 1u) {{
        var s: f32 = 0.0;
        for (var c: u32 = 0u; c < bs; c = c + 1u) {{
            s = s + values[diag * bb + r * bs + c] * acc[c];
        }}
        x[row * bs + r] = s;
    }}
}}
"#,
        wg = WORKGROUP_SIZE,
        max_bs = MAX_BLOCK_SIZE
    )
}

/// Launch one level of the sweep
///
/// `level_rows[level_start..level_start + level_size]` are the block rows of
/// the level.
#[allow(clippy::too_many_arguments)]
pub fn launch_block_trsv_level(
    cache: &PipelineCache,
    level_rows: &Buffer,
    row_ptrs: &Buffer,
    col_indices: &Buffer,
    diag_ptrs: &Buffer,
    values: &Buffer,
    x: &Buffer,
    level_start: usize,
    level_size: usize,
    block_size: usize,
    lower: bool,
) {
    if level_size == 0 {
        return;
    }
    let params = cache.uniform(
        "trsv_params",
        &TrsvParams {
            level_start: level_start as u32,
            level_size: level_size as u32,
            block_size: block_size as u32,
            lower: u32::from(lower),
        },
    );
    let module = cache.get_or_create_module("block_trsv", block_trsv_shader);
    let layout = cache.get_or_create_layout(LayoutKey {
        num_readonly_storage: 5,
        num_storage_buffers: 1,
        num_uniform_buffers: 1,
    });
    let pipeline =
        cache.get_or_create_pipeline("block_trsv", "block_trsv_level", &module, &layout);
    let bind_group = cache.create_bind_group(
        &layout,
        &[level_rows, row_ptrs, col_indices, diag_ptrs, values, x, &params],
    );
    cache.dispatch("block_trsv_level", &pipeline, &bind_group, workgroup_count(level_size));
}
