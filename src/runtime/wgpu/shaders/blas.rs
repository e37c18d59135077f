//! Vector kernels: dot product reduction, axpy and the BiCGSTAB direction
//! update.
//!
//! The dot product is a two-pass tree reduction. Pass one writes one partial
//! sum per workgroup, pass two folds the partials in a single workgroup. The
//! summation order depends only on the vector length, so repeated calls give
//! identical results.

use bytemuck::{Pod, Zeroable};
use wgpu::Buffer;

use super::pipeline::{LayoutKey, PipelineCache, WORKGROUP_SIZE, workgroup_count};

/// Upper bound on the number of partial sums of a dot product
pub const MAX_REDUCE_GROUPS: u32 = 256;

/// Uniform parameters shared by the vector kernels
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct VectorParams {
    /// Vector length
    pub n: u32,
    /// Workgroups of the first reduction pass
    pub num_groups: u32,
    /// `alpha` for axpy, `beta` for recombine
    pub alpha: f32,
    /// `omega` for recombine
    pub beta: f32,
}

fn dot_partial_shader() -> String {
    format!(
        r#"// Dot product, pass one: one partial sum per workgroup

const WORKGROUP_SIZE: u32 = {wg}u;

struct VectorParams {{
    n: u32,
    num_groups: u32,
    alpha: f32,
    beta: f32,
}}

var<workgroup> dot_shared: array<f32, {wg}>;

@group(0) @binding(0) var<storage, read> a: array<f32>;
@group(0) @binding(1) var<storage, read> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> partials: array<f32>;
@group(0) @binding(3) var<uniform> params: VectorParams;

@compute @workgroup_size({wg})
fn dot_partial(@builtin(local_invocation_id) local_id: vec3<u32>,
               @builtin(workgroup_id) group_id: vec3<u32>) {{
    let tid = local_id.x;
    let stride = params.num_groups * WORKGROUP_SIZE;

    var sum: f32 = 0.0;
    var i: u32 = group_id.x * WORKGROUP_SIZE + tid;
    while (i < params.n) {{
        sum = sum + a[i] * b[i];
        i = i + stride;
    }}

    dot_shared[tid] = sum;
    workgroupBarrier();

    for (var s: u32 = WORKGROUP_SIZE / 2u; s > 0u; s = s >> 1u) {{
        if (tid < s) {{
            dot_shared[tid] = dot_shared[tid] + dot_shared[tid + s];
        }}
        workgroupBarrier();
    }}

    if (tid == 0u) {{
        partials[group_id.x] = dot_shared[0];
    }}
}}
"#,
        wg = WORKGROUP_SIZE
    )
}

fn dot_finish_shader() -> String {
    format!(
        r#"// Dot product, pass two: fold the partials into partials[0]

const WORKGROUP_SIZE: u32 = {wg}u;

struct VectorParams {{
    n: u32,
    num_groups: u32,
    alpha: f32,
    beta: f32,
}}

var<workgroup> dot_shared: array<f32, {wg}>;

@group(0) @binding(0) var<storage, read_write> partials: array<f32>;
@group(0) @binding(1) var<uniform> params: VectorParams;

@compute @workgroup_size({wg})
fn dot_finish(@builtin(local_invocation_id) local_id: vec3<u32>) {{
    let tid = local_id.x;

    var sum: f32 = 0.0;
    var i: u32 = tid;
    while (i < params.num_groups) {{
        sum = sum + partials[i];
        i = i + WORKGROUP_SIZE;
    }}

    dot_shared[tid] = sum;
    workgroupBarrier();

    for (var s: u32 = WORKGROUP_SIZE / 2u; s > 0u; s = s >> 1u) {{
        if (tid < s) {{
            dot_shared[tid] = dot_shared[tid] + dot_shared[tid + s];
        }}
        workgroupBarrier();
    }}

    if (tid == 0u) {{
        partials[0] = dot_shared[0];
    }}
}}
"#,
        wg = WORKGROUP_SIZE
    )
}

fn axpy_shader() -> String {
    format!(
        r#"// y += alpha * x

struct VectorParams {{
    n: u32,
    num_groups: u32,
    alpha: f32,
    beta: f32,
}}

@group(0) @binding(0) var<storage, read> x: array<f32>;
@group(0) @binding(1) var<storage, read_write> y: array<f32>;
@group(0) @binding(2) var<uniform> params: VectorParams;

@compute @workgroup_size({wg})
fn axpy(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let i = gid.x;
    if (i >= params.n) {{
        return;
    }}
    y[i] = y[i] + params.alpha * x[i];
}}
"#,
        wg = WORKGROUP_SIZE
    )
}

fn recombine_shader() -> String {
    format!(
        r#"// p = r + beta * (p - omega * v)

struct VectorParams {{
    n: u32,
    num_groups: u32,
    beta: f32,
    omega: f32,
}}

@group(0) @binding(0) var<storage, read> r: array<f32>;
@group(0) @binding(1) var<storage, read> v: array<f32>;
@group(0) @binding(2) var<storage, read_write> p: array<f32>;
@group(0) @binding(3) var<uniform> params: VectorParams;

@compute @workgroup_size({wg})
fn recombine(@builtin(global_invocation_id) gid: vec3<u32>) {{
    let i = gid.x;
    if (i >= params.n) {{
        return;
    }}
    p[i] = r[i] + params.beta * (p[i] - params.omega * v[i]);
}}
"#,
        wg = WORKGROUP_SIZE
    )
}

/// Launch both reduction passes; the result lands in `partials[0]`.
///
/// `partials` must hold at least [`MAX_REDUCE_GROUPS`] elements.
pub fn launch_dot(cache: &PipelineCache, a: &Buffer, b: &Buffer, partials: &Buffer, n: usize) {
    let num_groups = workgroup_count(n).clamp(1, MAX_REDUCE_GROUPS);
    let params = cache.uniform(
        "dot_params",
        &VectorParams {
            n: n as u32,
            num_groups,
            alpha: 0.0,
            beta: 0.0,
        },
    );

    let module = cache.get_or_create_module("dot_partial", dot_partial_shader);
    let layout = cache.get_or_create_layout(LayoutKey {
        num_readonly_storage: 2,
        num_storage_buffers: 1,
        num_uniform_buffers: 1,
    });
    let pipeline = cache.get_or_create_pipeline("dot_partial", "dot_partial", &module, &layout);
    let bind_group = cache.create_bind_group(&layout, &[a, b, partials, &params]);
    cache.dispatch("dot_partial", &pipeline, &bind_group, num_groups);

    let module = cache.get_or_create_module("dot_finish", dot_finish_shader);
    let layout = cache.get_or_create_layout(LayoutKey {
        num_readonly_storage: 0,
        num_storage_buffers: 1,
        num_uniform_buffers: 1,
    });
    let pipeline = cache.get_or_create_pipeline("dot_finish", "dot_finish", &module, &layout);
    let bind_group = cache.create_bind_group(&layout, &[partials, &params]);
    cache.dispatch("dot_finish", &pipeline, &bind_group, 1);
}

/// Launch `y += alpha * x`
pub fn launch_axpy(cache: &PipelineCache, x: &Buffer, alpha: f32, y: &Buffer, n: usize) {
    if n == 0 {
        return;
    }
    let params = cache.uniform(
        "axpy_params",
        &VectorParams {
            n: n as u32,
            num_groups: 0,
            alpha,
            beta: 0.0,
        },
    );
    let module = cache.get_or_create_module("axpy", axpy_shader);
    let layout = cache.get_or_create_layout(LayoutKey {
        num_readonly_storage: 1,
        num_storage_buffers: 1,
        num_uniform_buffers: 1,
    });
    let pipeline = cache.get_or_create_pipeline("axpy", "axpy", &module, &layout);
    let bind_group = cache.create_bind_group(&layout, &[x, y, &params]);
    cache.dispatch("axpy", &pipeline, &bind_group, workgroup_count(n));
}

/// Launch `p = r + beta * (p - omega * v)`
pub fn launch_recombine(
    cache: &PipelineCache,
    p: &Buffer,
    r: &Buffer,
    v: &Buffer,
    beta: f32,
    omega: f32,
    n: usize,
) {
    if n == 0 {
        return;
    }
    let params = cache.uniform(
        "recombine_params",
        &VectorParams {
            n: n as u32,
            num_groups: 0,
            alpha: beta,
            beta: omega,
        },
    );
    let module = cache.get_or_create_module("recombine", recombine_shader);
    let layout = cache.get_or_create_layout(LayoutKey {
        num_readonly_storage: 2,
        num_storage_buffers: 1,
        num_uniform_buffers: 1,
    });
    let pipeline = cache.get_or_create_pipeline("recombine", "recombine", &module, &layout);
    let bind_group = cache.create_bind_group(&layout, &[r, v, p, &params]);
    cache.dispatch("recombine", &pipeline, &bind_group, workgroup_count(n));
}
