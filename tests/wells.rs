//! Well contributions inside the solve

mod common;

use blocksolve::prelude::*;
use blocksolve::wells::WellCoupling;
use common::{assert_allclose_f64, dense_solve, grid_system, init_logging, tridiagonal};

fn solve_with(
    a: &BlockedMatrix,
    b: &[f64],
    reorder: &str,
    wells: &mut dyn WellContributions<CpuRuntime>,
) -> (SolverResult, Vec<f64>) {
    let mut solver = BlockSolver::<CpuRuntime>::new(SolverConfig {
        reorder: reorder.to_string(),
        tolerance: 1e-12,
        ..Default::default()
    })
    .unwrap();
    let result = solver.solve_system(a, b, wells).unwrap();
    let mut x = vec![0.0; a.n()];
    solver.get_result(&mut x).unwrap();
    (result, x)
}

#[test]
fn test_single_completion_changes_result() {
    init_logging();
    let a = tridiagonal(6, 3.0);
    let b = vec![1.0; 6];

    let (plain, x_plain) = solve_with(&a, &b, "none", &mut NoWells);
    assert!(plain.converged);

    let mut wells = StandardWellContributions::<CpuRuntime>::new(6, 1);
    wells
        .add_well(StandardWell::new(1, vec![2], vec![5.0]).unwrap())
        .unwrap();
    let (with_well, x_well) = solve_with(&a, &b, "none", &mut wells);
    assert!(with_well.converged);
    assert!((x_plain[2] - x_well[2]).abs() > 1e-3);

    // the well adds its block to the diagonal of cell 2
    let mut dense = a.to_dense();
    dense[2 * 6 + 2] += 5.0;
    let expected = dense_solve(dense, b);
    assert_allclose_f64(&x_well, &expected, 1e-8, 1e-10, "completion");
}

#[test]
fn test_completion_under_reordering() {
    let a = grid_system(4, 3, 2);
    let nb = a.nb();
    let b: Vec<f64> = (0..a.n()).map(|i| 1.0 + (i % 3) as f64).collect();
    let block = vec![2.0, 0.5, 0.0, 1.0];

    let mut dense = a.to_dense();
    let n = a.n();
    for cell in [1, 7] {
        for i in 0..2 {
            for j in 0..2 {
                dense[(cell * 2 + i) * n + cell * 2 + j] += block[i * 2 + j];
            }
        }
    }
    let expected = dense_solve(dense, b.clone());

    for reorder in ["none", "level_scheduling", "graph_coloring"] {
        let mut wells = StandardWellContributions::<CpuRuntime>::new(nb, 2);
        let mut blocks = block.clone();
        blocks.extend_from_slice(&block);
        wells
            .add_well(StandardWell::new(2, vec![1, 7], blocks).unwrap())
            .unwrap();
        let (result, x) = solve_with(&a, &b, reorder, &mut wells);
        assert!(result.converged, "{reorder}");
        assert_allclose_f64(&x, &expected, 1e-8, 1e-10, reorder);
    }
}

#[test]
fn test_coupled_well_schur_complement() {
    let a = tridiagonal(5, 4.0);
    let b = vec![1.0, 0.0, 2.0, 0.0, 1.0];

    // one well equation coupled to cells 1 and 3
    let coupling = WellCoupling {
        num_equations: 1,
        b: vec![0.5, 0.25],
        c: vec![1.0, 2.0],
        d_inv: vec![0.8],
    };
    let well = StandardWell::new(1, vec![1, 3], vec![0.3, 0.6])
        .unwrap()
        .with_coupling(1, coupling)
        .unwrap();
    assert!(well.is_coupled());
    let mut wells = StandardWellContributions::<CpuRuntime>::new(5, 1);
    wells.add_well(well).unwrap();

    let (result, x) = solve_with(&a, &b, "graph_coloring", &mut wells);
    assert!(result.converged);

    // A + diag(completions) - C^T D^-1 B
    let mut dense = a.to_dense();
    dense[5 + 1] += 0.3;
    dense[3 * 5 + 3] += 0.6;
    let (cells, bw, cw) = ([1, 3], [0.5, 0.25], [1.0, 2.0]);
    for (i, &ci) in cells.iter().enumerate() {
        for (j, &cj) in cells.iter().enumerate() {
            dense[ci * 5 + cj] -= cw[i] * 0.8 * bw[j];
        }
    }
    let expected = dense_solve(dense, b);
    assert_allclose_f64(&x, &expected, 1e-8, 1e-10, "coupled well");
}
