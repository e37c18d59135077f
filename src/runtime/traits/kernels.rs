//! Trait for the Krylov kernel set

use super::Runtime;
use crate::error::Result;
use crate::sparse::{DeviceBlockMatrix, TriangularSweep};

/// Kernels the solver and the preconditioners dispatch through.
///
/// Reductions (`dot`, `norm`) accumulate pairwise, so the result is
/// deterministic for a given backend and input.
pub trait KernelOps<R: Runtime> {
    /// `<a, b>`
    fn dot(&self, a: &R::Vector, b: &R::Vector) -> Result<f64>;

    /// Euclidean norm. NaN entries propagate.
    fn norm(&self, a: &R::Vector) -> Result<f64> {
        Ok(self.dot(a, a)?.sqrt())
    }

    /// `y += alpha * x`
    fn axpy(&self, x: &R::Vector, alpha: f64, y: &mut R::Vector) -> Result<()>;

    /// `p = r + beta * (p - omega * v)`
    fn recombine(
        &self,
        p: &mut R::Vector,
        r: &R::Vector,
        v: &R::Vector,
        beta: f64,
        omega: f64,
    ) -> Result<()>;

    /// `y = A * x` for a block-CSR matrix
    fn spmv(&self, a: &DeviceBlockMatrix<R>, x: &R::Vector, y: &mut R::Vector) -> Result<()>;

    /// One level of a block triangular sweep over an ILU(0) factor, in place.
    ///
    /// Lower: `x[i] -= sum_{j<i} L_ij x[j]` (unit diagonal).
    /// Upper: `x[i] = D_i^-1 (x[i] - sum_{j>i} U_ij x[j])`, where the factor
    /// stores `D_i^-1` in its diagonal slots. Rows in one level are
    /// independent, so the whole level is a single launch.
    fn block_trsv_level(
        &self,
        lu: &DeviceBlockMatrix<R>,
        sweep: &TriangularSweep<R>,
        level: usize,
        lower: bool,
        x: &mut R::Vector,
    ) -> Result<()>;
}
