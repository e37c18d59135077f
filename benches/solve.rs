//! Solver benchmarks
//!
//! 1. Full first-call solve (initialize, analyze, build, iterate)
//! 2. Repeat-call solve with new values on a fixed pattern
//! 3. Preconditioner build alone
//!
//! Run with: cargo bench --bench solve

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use blocksolve::algorithm::precond::{
    PreconditionerKind, PreconditionerOptions, create_preconditioner,
};
use blocksolve::prelude::*;
use blocksolve::sparse::DeviceBlockMatrix;

// ---------------------------------------------------------------------------
// Data generators
// ---------------------------------------------------------------------------

/// 5-point 2D grid with `bs x bs` blocks, pressure-like first unknown
fn grid_system(nx: usize, ny: usize, bs: usize) -> BlockedMatrix {
    let bb = bs * bs;
    let mut blocks = Vec::new();
    for y in 0..ny {
        for x in 0..nx {
            let i = y * nx + x;
            let mut neighbours = Vec::new();
            if x > 0 {
                neighbours.push(i - 1);
            }
            if x + 1 < nx {
                neighbours.push(i + 1);
            }
            if y > 0 {
                neighbours.push(i - nx);
            }
            if y + 1 < ny {
                neighbours.push(i + nx);
            }
            let mut diag = vec![0.05; bb];
            for r in 0..bs {
                diag[r * bs + r] = if r == 0 { 4.5 } else { 2.5 };
            }
            blocks.push((i, i, diag));
            for j in neighbours {
                let mut off = vec![0.0; bb];
                off[0] = -1.0;
                for r in 1..bs {
                    off[r * bs + r] = -0.2;
                }
                blocks.push((i, j, off));
            }
        }
    }
    BlockedMatrix::from_blocks(nx * ny, bs, blocks).expect("grid system")
}

fn rhs(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1.0 + (i % 7) as f64 * 0.1).collect()
}

fn config(preconditioner: &str, reorder: &str) -> SolverConfig {
    SolverConfig {
        preconditioner: preconditioner.to_string(),
        reorder: reorder.to_string(),
        tolerance: 1e-6,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_first_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_call_solve");
    group.sample_size(20);
    let a = grid_system(40, 40, 3);
    let b = rhs(a.n());

    for preconditioner in ["ilu0", "isai", "cpr_quasiimpes"] {
        group.bench_with_input(
            BenchmarkId::from_parameter(preconditioner),
            &preconditioner,
            |bench, &p| {
                bench.iter(|| {
                    let mut solver =
                        BlockSolver::<CpuRuntime>::new(config(p, "graph_coloring")).unwrap();
                    black_box(solver.solve_system(&a, &b, &mut NoWells).unwrap())
                })
            },
        );
    }
    group.finish();
}

fn bench_repeat_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("repeat_call_solve");
    group.sample_size(20);

    for (nx, bs) in [(30, 2), (60, 3)] {
        let a = grid_system(nx, nx, bs);
        let b = rhs(a.n());
        let mut solver = BlockSolver::<CpuRuntime>::new(config("ilu0", "level_scheduling")).unwrap();
        solver.solve_system(&a, &b, &mut NoWells).unwrap();

        group.bench_with_input(
            BenchmarkId::new("ilu0", format!("{nx}x{nx}_bs{bs}")),
            &a,
            |bench, a| bench.iter(|| black_box(solver.solve_system(a, &b, &mut NoWells).unwrap())),
        );
    }
    group.finish();
}

fn bench_preconditioner_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("preconditioner_build");
    let a = grid_system(50, 50, 3);
    let device = CpuRuntime::select_device(0, 0).unwrap();
    let client = CpuRuntime::create_client(&device).unwrap();
    let dm = DeviceBlockMatrix::<CpuRuntime>::upload(&client, &a, "a").unwrap();

    for kind in [
        PreconditionerKind::Ilu0,
        PreconditionerKind::Isai,
        PreconditionerKind::CprQuasiImpes,
    ] {
        let mut m = create_preconditioner::<CpuRuntime>(kind, &PreconditionerOptions::default());
        m.analyze(&client, &a).unwrap();
        group.bench_function(BenchmarkId::from_parameter(kind), |bench| {
            bench.iter(|| m.build(&client, &a, &dm).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_first_call,
    bench_repeat_call,
    bench_preconditioner_build
);

criterion_main!(benches);
