//! Property-based tests using proptest
//!
//! Reordering must be a bijection that commutes with the matrix product, and
//! every preconditioner must apply a linear operator.

mod common;

use blocksolve::algorithm::precond::{
    PreconditionerKind, PreconditionerOptions, create_preconditioner,
};
use blocksolve::algorithm::reorder::{ReorderStrategy, compute_reordering};
use blocksolve::prelude::*;
use blocksolve::sparse::DeviceBlockMatrix;
use common::create_cpu_client;
use proptest::prelude::*;

// Strategy for (nb, block size, off-diagonal positions)
fn pattern_strategy() -> impl Strategy<Value = (usize, usize, Vec<(usize, usize)>)> {
    (2usize..24, 1usize..=3).prop_flat_map(|(nb, bs)| {
        (
            Just(nb),
            Just(bs),
            prop::collection::vec((0..nb, 0..nb), 0..3 * nb),
        )
    })
}

/// Strictly block diagonally dominant matrix on the given pattern
fn build_matrix(nb: usize, bs: usize, edges: &[(usize, usize)]) -> BlockedMatrix {
    let bb = bs * bs;
    let mut degree = vec![0usize; nb];
    let mut blocks = Vec::new();
    for &(i, j) in edges.iter().filter(|(i, j)| i != j) {
        degree[i] += 1;
        let v = -0.1 * (1 + (i + 2 * j) % 3) as f64;
        blocks.push((i, j, vec![v; bb]));
    }
    for (i, &d) in degree.iter().enumerate() {
        let mut diag = vec![0.05; bb];
        for r in 0..bs {
            diag[r * bs + r] = 1.0 + 0.3 * (bs * (d + 1)) as f64;
        }
        blocks.push((i, i, diag));
    }
    BlockedMatrix::from_blocks(nb, bs, blocks).unwrap()
}

fn test_vector(n: usize, seed: u64) -> Vec<f64> {
    (0..n)
        .map(|i| ((seed as f64) * 0.37 + i as f64 * 1.3).sin())
        .collect()
}

proptest! {
    // Property: un-permuting a permuted vector gives it back
    #[test]
    fn test_reorder_round_trip((nb, bs, edges) in pattern_strategy(), seed in 0u64..1000) {
        let a = build_matrix(nb, bs, &edges);
        let v = test_vector(a.n(), seed);
        for strategy in [ReorderStrategy::LevelScheduling, ReorderStrategy::GraphColoring] {
            let r = compute_reordering(&a, strategy).unwrap();
            let mut permuted = vec![0.0; a.n()];
            let mut back = vec![0.0; a.n()];
            r.permute_vector(&v, bs, &mut permuted).unwrap();
            r.unpermute_vector(&permuted, bs, &mut back).unwrap();
            prop_assert_eq!(&back, &v);
        }
    }

    // Property: (P A P^T)(P x) = P (A x)
    #[test]
    fn test_permuted_matrix_equivalence((nb, bs, edges) in pattern_strategy(), seed in 0u64..1000) {
        let a = build_matrix(nb, bs, &edges);
        let n = a.n();
        let x = test_vector(n, seed);
        let mut ax = vec![0.0; n];
        a.spmv(&x, &mut ax).unwrap();

        for strategy in [ReorderStrategy::LevelScheduling, ReorderStrategy::GraphColoring] {
            let r = compute_reordering(&a, strategy).unwrap();
            let pa = a.permuted(r.permutation()).unwrap();
            let mut px = vec![0.0; n];
            let mut pax = vec![0.0; n];
            let mut expected = vec![0.0; n];
            r.permute_vector(&x, bs, &mut px).unwrap();
            pa.spmv(&px, &mut pax).unwrap();
            r.permute_vector(&ax, bs, &mut expected).unwrap();
            for (l, e) in pax.iter().zip(&expected) {
                prop_assert!((l - e).abs() < 1e-12);
            }
        }
    }

    // Property: rows of one group never couple after reordering
    #[test]
    fn test_groups_are_independent((nb, bs, edges) in pattern_strategy()) {
        let a = build_matrix(nb, bs, &edges);
        for strategy in [ReorderStrategy::LevelScheduling, ReorderStrategy::GraphColoring] {
            let r = compute_reordering(&a, strategy).unwrap();
            let pa = a.permuted(r.permutation()).unwrap();
            let lp = r.level_pointers();
            for g in 0..r.num_levels() {
                let group = lp[g]..lp[g + 1];
                for row in group.clone() {
                    for &col in pa.row_cols(row) {
                        prop_assert!(col == row || !group.contains(&col));
                    }
                }
            }
        }
    }

    // Property: M^-1 (a u + b v) = a M^-1 u + b M^-1 v
    #[test]
    fn test_preconditioners_are_linear(
        (nb, bs, edges) in pattern_strategy(),
        seed in 0u64..1000,
        alpha in -2.0f64..2.0,
        beta in -2.0f64..2.0
    ) {
        let client = create_cpu_client();
        let a = build_matrix(nb, bs, &edges);
        let n = a.n();
        let dm = DeviceBlockMatrix::<CpuRuntime>::upload(&client, &a, "a").unwrap();
        let u = test_vector(n, seed);
        let v = test_vector(n, seed + 17);
        let combined: Vec<f64> = u.iter().zip(&v).map(|(x, y)| alpha * x + beta * y).collect();

        for kind in [
            PreconditionerKind::Ilu0,
            PreconditionerKind::Isai,
            PreconditionerKind::CprQuasiImpes,
        ] {
            let mut m = create_preconditioner::<CpuRuntime>(kind, &PreconditionerOptions::default());
            m.analyze(&client, &a).unwrap();
            m.build(&client, &a, &dm).unwrap();

            let (mut mu, mut mv, mut mc) = (vec![0.0; n], vec![0.0; n], vec![0.0; n]);
            m.apply(&client, &dm, &u, &mut mu).unwrap();
            m.apply(&client, &dm, &v, &mut mv).unwrap();
            m.apply(&client, &dm, &combined, &mut mc).unwrap();

            for i in 0..n {
                let expected = alpha * mu[i] + beta * mv[i];
                prop_assert!(
                    (mc[i] - expected).abs() <= 1e-9 * (1.0 + expected.abs()),
                    "{}: entry {} is {}, expected {}", kind, i, mc[i], expected
                );
            }
        }
    }
}
