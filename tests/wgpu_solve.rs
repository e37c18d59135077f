//! Full solves on a WebGPU device, checked against the CPU runtime
//!
//! Every test returns early when no adapter is present.

#![cfg(feature = "wgpu")]

mod common;

use blocksolve::prelude::*;
use blocksolve::runtime::wgpu::{is_wgpu_available, platform_device_counts};
use common::{assert_allclose_f64, grid_system, init_logging, reference_solution, rhs_for};

fn wgpu_solver(preconditioner: &str, reorder: &str) -> Option<BlockSolver<WgpuRuntime>> {
    if !is_wgpu_available() {
        eprintln!("no WebGPU adapter, skipping");
        return None;
    }
    let config = SolverConfig {
        preconditioner: preconditioner.to_string(),
        reorder: reorder.to_string(),
        tolerance: 1e-5,
        ..Default::default()
    };
    BlockSolver::<WgpuRuntime>::new(config).ok()
}

#[test]
fn test_wgpu_matches_cpu() {
    init_logging();
    let a = grid_system(6, 6, 3);
    let x_star = reference_solution(a.n());
    let b = rhs_for(&a, &x_star);

    for preconditioner in ["ilu0", "isai", "cpr_quasiimpes"] {
        for reorder in ["level_scheduling", "graph_coloring"] {
            let Some(mut solver) = wgpu_solver(preconditioner, reorder) else {
                return;
            };
            let result = solver.solve_system(&a, &b, &mut NoWells).unwrap();
            assert!(result.converged, "{preconditioner}/{reorder}: {:?}", result.outcome);

            let mut x = vec![0.0; a.n()];
            solver.get_result(&mut x).unwrap();
            assert_allclose_f64(&x, &x_star, 1e-3, 1e-3, &format!("{preconditioner}/{reorder}"));
        }
    }
}

#[test]
fn test_wgpu_well_contributions() {
    let Some(mut solver) = wgpu_solver("ilu0", "graph_coloring") else {
        return;
    };
    let a = grid_system(4, 4, 2);
    let b = vec![1.0; a.n()];

    let mut wells = StandardWellContributions::<WgpuRuntime>::new(a.nb(), 2);
    wells
        .add_well(StandardWell::new(2, vec![5], vec![3.0, 0.0, 0.0, 3.0]).unwrap())
        .unwrap();
    let result = solver.solve_system(&a, &b, &mut wells).unwrap();
    assert!(result.converged);
    let mut x_gpu = vec![0.0; a.n()];
    solver.get_result(&mut x_gpu).unwrap();

    let mut cpu = BlockSolver::<CpuRuntime>::new(SolverConfig {
        reorder: "graph_coloring".to_string(),
        tolerance: 1e-10,
        ..Default::default()
    })
    .unwrap();
    let mut cpu_wells = StandardWellContributions::<CpuRuntime>::new(a.nb(), 2);
    cpu_wells
        .add_well(StandardWell::new(2, vec![5], vec![3.0, 0.0, 0.0, 3.0]).unwrap())
        .unwrap();
    cpu.solve_system(&a, &b, &mut cpu_wells).unwrap();
    let mut x_cpu = vec![0.0; a.n()];
    cpu.get_result(&mut x_cpu).unwrap();

    assert_allclose_f64(&x_gpu, &x_cpu, 1e-3, 1e-4, "wells on wgpu");
}

#[test]
fn test_wgpu_invalid_device_index() {
    if !is_wgpu_available() {
        return;
    }
    let counts = platform_device_counts();
    let config = SolverConfig {
        platform_id: counts.len(),
        ..Default::default()
    };
    assert!(matches!(
        BlockSolver::<WgpuRuntime>::new(config),
        Err(Error::InvalidPlatform { .. })
    ));
}
