//! AMG coarsening and transfer operators
//!
//! Classical Ruge-Stüben setup on host CSR matrices:
//! - Strength-of-connection based on threshold
//! - PMIS-style greedy independent set coarsening
//! - Direct interpolation normalized per row
//! - Galerkin triple product for the coarse operator

use crate::error::Result;
use crate::sparse::CsrMatrix;
use std::collections::{BinaryHeap, HashMap};

/// Coarse/fine splitting result
#[derive(Debug, Clone)]
pub struct CfSplitting {
    /// true = coarse point, false = fine point
    pub is_coarse: Vec<bool>,
    /// Fine index of each coarse point, ascending
    pub coarse_indices: Vec<usize>,
    /// Number of coarse points
    pub n_coarse: usize,
}

/// Compute strength-of-connection: strong connections where
/// |a_ij| >= theta * max_k(|a_ik|) for k != i
///
/// Returns: for each row, the set of strongly connected column indices
pub fn strength_of_connection(a: &CsrMatrix, theta: f64) -> Vec<Vec<usize>> {
    let n = a.nrows();
    let mut strong = vec![Vec::new(); n];

    for (i, strong_i) in strong.iter_mut().enumerate() {
        let max_off_diag = a
            .row(i)
            .filter(|&(j, _)| j != i)
            .fold(0.0_f64, |m, (_, v)| m.max(v.abs()));
        if max_off_diag == 0.0 {
            continue;
        }

        let threshold = theta * max_off_diag;
        strong_i.extend(
            a.row(i)
                .filter(|&(j, v)| j != i && v.abs() >= threshold)
                .map(|(j, _)| j),
        );
    }

    strong
}

/// PMIS coarsening: greedy independent set selection based on
/// connection weights (number of strong connections)
///
/// The undecided point with the highest weight becomes coarse (ties go to
/// the higher index) and its strong neighbours become fine.
pub fn pmis_coarsening(strong_connections: &[Vec<usize>], n: usize) -> CfSplitting {
    let mut weights: Vec<usize> = strong_connections.iter().map(|s| s.len()).collect();
    let mut is_coarse = vec![false; n];
    let mut is_decided = vec![false; n];

    // Lazy max-heap: stale entries are skipped when popped
    let mut heap: BinaryHeap<(usize, usize)> = (0..n).map(|i| (weights[i], i)).collect();

    while let Some((w, idx)) = heap.pop() {
        if is_decided[idx] || w != weights[idx] {
            continue;
        }

        is_coarse[idx] = true;
        is_decided[idx] = true;

        for &j in &strong_connections[idx] {
            if is_decided[j] {
                continue;
            }
            is_decided[j] = true;
            for &k in &strong_connections[j] {
                if !is_decided[k] && weights[k] > 0 {
                    weights[k] -= 1;
                    heap.push((weights[k], k));
                }
            }
        }
    }

    let coarse_indices: Vec<usize> = (0..n).filter(|&i| is_coarse[i]).collect();
    let n_coarse = coarse_indices.len();

    CfSplitting {
        is_coarse,
        coarse_indices,
        n_coarse,
    }
}

/// Build the direct interpolation operator P: coarse -> fine
///
/// For coarse points: P[i, coarse_map[i]] = 1.
/// For fine points: P[i, j] = -a_ij / a_ii over strongly connected coarse
/// `j` (any coarse neighbour when none is strong), normalized to sum to 1.
/// A fine point without coarse neighbours gets an empty row.
pub fn build_interpolation(
    a: &CsrMatrix,
    splitting: &CfSplitting,
    strong_connections: &[Vec<usize>],
) -> Result<CsrMatrix> {
    let n = a.nrows();
    let mut coarse_map = vec![usize::MAX; n];
    for (ci, &fine_idx) in splitting.coarse_indices.iter().enumerate() {
        coarse_map[fine_idx] = ci;
    }

    let mut rows: Vec<Vec<(usize, f64)>> = Vec::with_capacity(n);
    for i in 0..n {
        if splitting.is_coarse[i] {
            rows.push(vec![(coarse_map[i], 1.0)]);
            continue;
        }

        let diag = a
            .row(i)
            .find(|&(j, _)| j == i)
            .map(|(_, v)| v)
            .filter(|v| *v != 0.0)
            .unwrap_or(1.0);

        let mut interp: Vec<(usize, f64)> = a
            .row(i)
            .filter(|&(j, _)| splitting.is_coarse[j] && strong_connections[i].contains(&j))
            .map(|(j, v)| (coarse_map[j], -v / diag))
            .collect();
        if interp.is_empty() {
            interp = a
                .row(i)
                .filter(|&(j, v)| j != i && splitting.is_coarse[j] && v != 0.0)
                .map(|(j, v)| (coarse_map[j], -v / diag))
                .collect();
        }

        let sum_weights: f64 = interp.iter().map(|(_, w)| w).sum();
        if sum_weights.abs() > 1e-15 {
            for (_, w) in &mut interp {
                *w /= sum_weights;
            }
        }
        rows.push(interp);
    }

    CsrMatrix::from_rows(n, splitting.n_coarse, rows)
}

/// Build Galerkin coarse operator: A_c = R * A * P with R = P^T
///
/// Computed row by row of `R` with hash-map accumulation; entries below
/// 1e-15 in magnitude are dropped, diagonal entries are always kept.
pub fn galerkin_coarse_operator(a: &CsrMatrix, p: &CsrMatrix, r: &CsrMatrix) -> Result<CsrMatrix> {
    let n_coarse = p.ncols();
    let mut rows: Vec<Vec<(usize, f64)>> = Vec::with_capacity(n_coarse);

    for ci in 0..n_coarse {
        let mut row_map: HashMap<usize, f64> = HashMap::new();

        // each fine point k restricted onto coarse point ci
        for (k, r_val) in r.row(ci) {
            for (l, a_val) in a.row(k) {
                for (cj, p_val) in p.row(l) {
                    *row_map.entry(cj).or_insert(0.0) += r_val * a_val * p_val;
                }
            }
        }

        rows.push(
            row_map
                .into_iter()
                .filter(|&(j, v)| j == ci || v.abs() > 1e-15)
                .collect(),
        );
    }

    CsrMatrix::from_rows(n_coarse, n_coarse, rows)
}
