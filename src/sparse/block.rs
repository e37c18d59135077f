//! Dense kernels on small row-major blocks.
//!
//! Blocks are `bs x bs` slices in row-major order, with `bs` in 1..=6. The
//! functions here are the host-side building blocks of the block ILU(0),
//! ISAI and CPR setups.

/// Largest supported block size.
pub const MAX_BLOCK_SIZE: usize = 6;

/// `out = a * b`
pub fn block_mult(a: &[f64], b: &[f64], out: &mut [f64], bs: usize) {
    for i in 0..bs {
        for j in 0..bs {
            let mut sum = 0.0;
            for k in 0..bs {
                sum += a[i * bs + k] * b[k * bs + j];
            }
            out[i * bs + j] = sum;
        }
    }
}

/// `out -= a * b`
pub fn block_mult_sub(a: &[f64], b: &[f64], out: &mut [f64], bs: usize) {
    for i in 0..bs {
        for j in 0..bs {
            let mut sum = 0.0;
            for k in 0..bs {
                sum += a[i * bs + k] * b[k * bs + j];
            }
            out[i * bs + j] -= sum;
        }
    }
}

/// `y += a * x`
pub fn block_matvec_add(a: &[f64], x: &[f64], y: &mut [f64], bs: usize) {
    for i in 0..bs {
        let mut sum = 0.0;
        for k in 0..bs {
            sum += a[i * bs + k] * x[k];
        }
        y[i] += sum;
    }
}

/// `y -= a * x`
pub fn block_matvec_sub(a: &[f64], x: &[f64], y: &mut [f64], bs: usize) {
    for i in 0..bs {
        let mut sum = 0.0;
        for k in 0..bs {
            sum += a[i * bs + k] * x[k];
        }
        y[i] -= sum;
    }
}

/// Transpose of a block
pub fn block_transpose(a: &[f64], out: &mut [f64], bs: usize) {
    for i in 0..bs {
        for j in 0..bs {
            out[j * bs + i] = a[i * bs + j];
        }
    }
}

/// Identity block
pub fn identity_block(bs: usize) -> Vec<f64> {
    let mut id = vec![0.0; bs * bs];
    for i in 0..bs {
        id[i * bs + i] = 1.0;
    }
    id
}

/// Largest absolute entry of a slice
pub fn max_abs(a: &[f64]) -> f64 {
    a.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
}

/// Invert a block with Gauss-Jordan elimination and partial pivoting.
///
/// A pivot is rejected when `|pivot| <= threshold * max|a|` (or the block is
/// all zero). On rejection the offending pivot magnitude is returned.
pub fn invert_block(a: &[f64], out: &mut [f64], bs: usize, threshold: f64) -> Result<(), f64> {
    let mut work = a.to_vec();
    out.copy_from_slice(&identity_block(bs));
    let scale = max_abs(a);
    if scale == 0.0 {
        return Err(0.0);
    }

    for col in 0..bs {
        let mut piv_row = col;
        let mut piv_val = work[col * bs + col].abs();
        for row in col + 1..bs {
            let v = work[row * bs + col].abs();
            if v > piv_val {
                piv_val = v;
                piv_row = row;
            }
        }
        if piv_val == 0.0 || piv_val <= threshold * scale {
            return Err(piv_val);
        }
        if piv_row != col {
            for k in 0..bs {
                work.swap(col * bs + k, piv_row * bs + k);
                out.swap(col * bs + k, piv_row * bs + k);
            }
        }

        let inv_piv = 1.0 / work[col * bs + col];
        for k in 0..bs {
            work[col * bs + k] *= inv_piv;
            out[col * bs + k] *= inv_piv;
        }
        for row in 0..bs {
            if row == col {
                continue;
            }
            let factor = work[row * bs + col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..bs {
                work[row * bs + k] -= factor * work[col * bs + k];
                out[row * bs + k] -= factor * out[col * bs + k];
            }
        }
    }
    Ok(())
}

/// Solve `mat * X = rhs` in place for `nrhs` right-hand sides.
///
/// `mat` is `n x n` row-major and is destroyed; `rhs` is `n x nrhs`
/// row-major and holds the solution on return. Partial pivoting; returns the
/// failing pivot magnitude when the system is singular.
pub fn solve_dense(mat: &mut [f64], rhs: &mut [f64], n: usize, nrhs: usize) -> Result<(), f64> {
    let scale = max_abs(mat);
    if scale == 0.0 {
        return Err(0.0);
    }

    for col in 0..n {
        let mut piv_row = col;
        let mut piv_val = mat[col * n + col].abs();
        for row in col + 1..n {
            let v = mat[row * n + col].abs();
            if v > piv_val {
                piv_val = v;
                piv_row = row;
            }
        }
        if piv_val <= f64::EPSILON * scale * 1e-3 {
            return Err(piv_val);
        }
        if piv_row != col {
            for k in 0..n {
                mat.swap(col * n + k, piv_row * n + k);
            }
            for k in 0..nrhs {
                rhs.swap(col * nrhs + k, piv_row * nrhs + k);
            }
        }

        let piv = mat[col * n + col];
        for row in col + 1..n {
            let factor = mat[row * n + col] / piv;
            if factor == 0.0 {
                continue;
            }
            mat[row * n + col] = 0.0;
            for k in col + 1..n {
                mat[row * n + k] -= factor * mat[col * n + k];
            }
            for k in 0..nrhs {
                rhs[row * nrhs + k] -= factor * rhs[col * nrhs + k];
            }
        }
    }

    for col in (0..n).rev() {
        let piv = mat[col * n + col];
        for k in 0..nrhs {
            let mut v = rhs[col * nrhs + k];
            for j in col + 1..n {
                v -= mat[col * n + j] * rhs[j * nrhs + k];
            }
            rhs[col * nrhs + k] = v / piv;
        }
    }
    Ok(())
}
