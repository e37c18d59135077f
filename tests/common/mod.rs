//! Common test utilities
#![allow(dead_code)]

use blocksolve::runtime::Runtime;
use blocksolve::runtime::cpu::{CpuClient, CpuRuntime};
use blocksolve::sparse::BlockedMatrix;
#[cfg(feature = "wgpu")]
use blocksolve::runtime::wgpu::{WgpuClient, WgpuRuntime};

/// Install env_logger once; `RUST_LOG=blocksolve=trace` shows iteration logs
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a CPU client for testing
pub fn create_cpu_client() -> CpuClient {
    let device = CpuRuntime::select_device(0, 0).expect("cpu device");
    CpuRuntime::create_client(&device).expect("cpu client")
}

/// Create a WebGPU client, returning None if WebGPU is unavailable
#[cfg(feature = "wgpu")]
pub fn create_wgpu_client() -> Option<WgpuClient> {
    if !blocksolve::runtime::wgpu::is_wgpu_available() {
        return None;
    }
    let device = WgpuRuntime::select_device(0, 0).ok()?;
    WgpuRuntime::create_client(&device).ok()
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Scalar tridiagonal matrix: diag, off-diagonals -1
pub fn tridiagonal(n: usize, diag: f64) -> BlockedMatrix {
    let mut blocks = Vec::new();
    for i in 0..n {
        if i > 0 {
            blocks.push((i, i - 1, vec![-1.0]));
        }
        blocks.push((i, i, vec![diag]));
        if i + 1 < n {
            blocks.push((i, i + 1, vec![-1.0]));
        }
    }
    BlockedMatrix::from_blocks(n, 1, blocks).expect("tridiagonal")
}

/// 5-point block system on an `nx x ny` grid.
///
/// Unknown 0 of each block behaves like pressure (strong coupling between
/// cells), the others are mostly local. Slightly upwinded, so the matrix is
/// not symmetric, but it stays block diagonally dominant.
pub fn grid_system(nx: usize, ny: usize, bs: usize) -> BlockedMatrix {
    let idx = |x: usize, y: usize| y * nx + x;
    let bb = bs * bs;
    let mut blocks = Vec::new();
    for y in 0..ny {
        for x in 0..nx {
            let i = idx(x, y);
            let mut neighbours = Vec::new();
            if x > 0 {
                neighbours.push((idx(x - 1, y), 1.2));
            }
            if x + 1 < nx {
                neighbours.push((idx(x + 1, y), 0.8));
            }
            if y > 0 {
                neighbours.push((idx(x, y - 1), 1.0));
            }
            if y + 1 < ny {
                neighbours.push((idx(x, y + 1), 1.0));
            }

            let mut diag = vec![0.0; bb];
            for r in 0..bs {
                diag[r * bs + r] = if r == 0 { 4.5 } else { 2.0 + 0.3 * r as f64 };
                for c in 0..bs {
                    if c != r {
                        diag[r * bs + c] = 0.1 * ((r + 2 * c + i) % 3) as f64;
                    }
                }
            }
            blocks.push((i, i, diag));

            for (j, weight) in neighbours {
                let mut off = vec![0.0; bb];
                off[0] = -weight;
                for r in 1..bs {
                    off[r * bs + r] = -0.2 * weight;
                    off[r * bs] = -0.05 * weight;
                }
                blocks.push((i, j, off));
            }
        }
    }
    BlockedMatrix::from_blocks(nx * ny, bs, blocks).expect("grid system")
}

/// Smooth, nonzero reference solution
pub fn reference_solution(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1.0 + 0.5 * (0.3 * i as f64).sin()).collect()
}

/// `b = A x`
pub fn rhs_for(a: &BlockedMatrix, x: &[f64]) -> Vec<f64> {
    let mut b = vec![0.0; a.n()];
    a.spmv(x, &mut b).expect("spmv");
    b
}

/// Dense Gaussian elimination with partial pivoting, row-major `a`
pub fn dense_solve(mut a: Vec<f64>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for k in 0..n {
        let pivot = (k..n)
            .max_by(|&i, &j| a[i * n + k].abs().total_cmp(&a[j * n + k].abs()))
            .unwrap();
        if pivot != k {
            for c in 0..n {
                a.swap(k * n + c, pivot * n + c);
            }
            b.swap(k, pivot);
        }
        for i in k + 1..n {
            let f = a[i * n + k] / a[k * n + k];
            for c in k..n {
                a[i * n + c] -= f * a[k * n + c];
            }
            b[i] -= f * b[k];
        }
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let s: f64 = (i + 1..n).map(|c| a[i * n + c] * x[c]).sum();
        x[i] = (b[i] - s) / a[i * n + i];
    }
    x
}
