//! Preconditioned BiCGSTAB with well injection
//!
//! Right-preconditioned BiCGSTAB counted in half steps: the first half ends
//! after the `alpha` update, the second after the `omega` update, and the
//! residual norm is checked after each.
//!
//! ```text
//! r = b, x = 0; rw = r; p = r; rho = alpha = omega = 1
//! for it = 0.5; it < maxit; it += 0.5:
//!     rho_prev = rho; rho = <rw, r>
//!     if it > 1: p = r + (rho/rho_prev)(alpha/omega) (p - omega v)
//!     pw = M^-1 p; v = A pw + wells(pw)
//!     alpha = rho / <rw, v>; r -= alpha v; x += alpha pw
//!     if ||r|| < tol ||r0||: stop
//!     it += 0.5
//!     s = M^-1 r; t = A s + wells(s)
//!     omega = <t, r> / <t, t>; x += omega s; r -= omega t
//!     if ||r|| < tol ||r0||: stop
//! ```
//!
//! When `<rw, r>` or `<rw, v>` vanishes the shadow space is restarted from
//! the current residual (`rw = p = r`). A second zero before any progress
//! is a breakdown. A non-finite residual norm is a breakdown too.

use std::time::{Duration, Instant};

use super::result::{SolveOutcome, SolverResult};
use crate::algorithm::precond::Preconditioner;
use crate::error::Result;
use crate::runtime::{KernelOps, Runtime, RuntimeClient};
use crate::sparse::DeviceBlockMatrix;
use crate::wells::WellContributions;

/// Device vectors of the iteration, allocated once per system size
pub(crate) struct KrylovVectors<R: Runtime> {
    pub(crate) x: R::Vector,
    pub(crate) b: R::Vector,
    r: R::Vector,
    rw: R::Vector,
    p: R::Vector,
    v: R::Vector,
    s: R::Vector,
    t: R::Vector,
    pw: R::Vector,
}

impl<R: Runtime> KrylovVectors<R> {
    pub(crate) fn allocate(client: &R::Client, n: usize) -> Result<Self> {
        Ok(Self {
            x: client.alloc_vector(n, "x")?,
            b: client.alloc_vector(n, "b")?,
            r: client.alloc_vector(n, "r")?,
            rw: client.alloc_vector(n, "rw")?,
            p: client.alloc_vector(n, "p")?,
            v: client.alloc_vector(n, "v")?,
            s: client.alloc_vector(n, "s")?,
            t: client.alloc_vector(n, "t")?,
            pw: client.alloc_vector(n, "pw")?,
        })
    }
}

/// Iteration limits and log gating
pub(crate) struct IterationControl {
    pub(crate) max_iterations: usize,
    pub(crate) tolerance: f64,
    pub(crate) verbosity: u32,
}

#[derive(Default)]
struct PhaseTimers {
    precond: Duration,
    spmv: Duration,
    wells: Duration,
    rest: Duration,
}

fn is_degenerate(value: f64) -> bool {
    value == 0.0 || !value.is_finite()
}

/// Reset the shadow residual and search direction to the current residual
fn restart_shadow<R: Runtime>(
    client: &R::Client,
    r: &R::Vector,
    rw: &mut R::Vector,
    p: &mut R::Vector,
    it: f64,
    control: &IterationControl,
) -> Result<()> {
    if control.verbosity > 1 {
        log::debug!("restarting shadow residual at it {it}");
    }
    client.copy(r, rw)?;
    client.copy(r, p)
}

/// `y = A x`, then the well terms when there are wells
fn apply_operator<R: Runtime>(
    client: &R::Client,
    a: &DeviceBlockMatrix<R>,
    wells: &mut dyn WellContributions<R>,
    x: &R::Vector,
    y: &mut R::Vector,
    timers: &mut PhaseTimers,
) -> Result<()> {
    let start = Instant::now();
    client.spmv(a, x, y)?;
    timers.spmv += start.elapsed();

    if wells.num_wells() > 0 {
        let start = Instant::now();
        wells.apply(client, x, y)?;
        timers.wells += start.elapsed();
    }
    Ok(())
}

/// Run the iteration. `vectors.b` holds the right-hand side in solver
/// order; on return `vectors.x` holds the solution.
pub(crate) fn pbicgstab<R: Runtime>(
    client: &R::Client,
    a: &DeviceBlockMatrix<R>,
    preconditioner: &mut dyn Preconditioner<R>,
    wells: &mut dyn WellContributions<R>,
    vectors: &mut KrylovVectors<R>,
    control: &IterationControl,
) -> Result<SolverResult> {
    let t_total = Instant::now();
    let mut timers = PhaseTimers::default();
    let KrylovVectors {
        x,
        b,
        r,
        rw,
        p,
        v,
        s,
        t,
        pw,
    } = vectors;

    client.fill_zero(x)?;
    client.fill_zero(v)?;
    client.copy(b, r)?;
    client.copy(r, rw)?;
    client.copy(r, p)?;

    let mut rho = 1.0;
    let mut alpha = 1.0;
    let mut omega = 1.0;

    let norm_0 = client.norm(r)?;
    let mut norm = norm_0;
    if control.verbosity > 1 {
        log::trace!("initial norm: {norm_0:e}");
    }

    if !norm_0.is_finite() {
        log::warn!("right-hand side is not finite (norm {norm_0})");
        return Ok(SolverResult {
            iterations: 0.0,
            reduction: f64::NAN,
            conv_rate: f64::NAN,
            elapsed: t_total.elapsed(),
            converged: false,
            outcome: SolveOutcome::Breakdown,
        });
    }
    if norm_0 == 0.0 {
        return Ok(SolverResult {
            iterations: 0.0,
            reduction: 0.0,
            conv_rate: 0.0,
            elapsed: t_total.elapsed(),
            converged: true,
            outcome: SolveOutcome::ZeroRhs,
        });
    }

    let maxit = control.max_iterations as f64;
    let threshold = control.tolerance * norm_0;
    let mut outcome = SolveOutcome::MaxIterationsReached;
    let mut it = 0.5;
    // rw == p == r and no half step taken since
    let mut fresh = true;

    while it < maxit {
        let rest = Instant::now();
        let rho_prev = rho;
        rho = client.dot(rw, r)?;
        if is_degenerate(rho) {
            if fresh {
                outcome = SolveOutcome::Breakdown;
                break;
            }
            restart_shadow::<R>(client, r, rw, p, it, control)?;
            (rho, alpha, omega) = (client.dot(rw, r)?, 1.0, 1.0);
            fresh = true;
            if is_degenerate(rho) {
                outcome = SolveOutcome::Breakdown;
                break;
            }
        }
        if it > 1.0 && !fresh {
            let beta = (rho / rho_prev) * (alpha / omega);
            client.recombine(p, r, v, beta, omega)?;
        }
        timers.rest += rest.elapsed();

        let start = Instant::now();
        preconditioner.apply(client, a, p, pw)?;
        timers.precond += start.elapsed();

        apply_operator(client, a, wells, pw, v, &mut timers)?;

        let rest = Instant::now();
        let rw_v = client.dot(rw, v)?;
        if is_degenerate(rw_v) {
            timers.rest += rest.elapsed();
            if fresh {
                outcome = SolveOutcome::Breakdown;
                break;
            }
            restart_shadow::<R>(client, r, rw, p, it, control)?;
            (rho, alpha, omega) = (1.0, 1.0, 1.0);
            fresh = true;
            continue;
        }
        fresh = false;
        alpha = rho / rw_v;
        client.axpy(v, -alpha, r)?;
        client.axpy(pw, alpha, x)?;
        norm = client.norm(r)?;
        timers.rest += rest.elapsed();

        if !norm.is_finite() {
            outcome = SolveOutcome::Breakdown;
            break;
        }
        if norm < threshold {
            outcome = SolveOutcome::Converged;
            break;
        }

        it += 0.5;

        let start = Instant::now();
        preconditioner.apply(client, a, r, s)?;
        timers.precond += start.elapsed();

        apply_operator(client, a, wells, s, t, &mut timers)?;

        let rest = Instant::now();
        let t_r = client.dot(t, r)?;
        let t_t = client.dot(t, t)?;
        if is_degenerate(t_t) {
            outcome = SolveOutcome::Breakdown;
            break;
        }
        omega = t_r / t_t;
        client.axpy(s, omega, x)?;
        client.axpy(t, -omega, r)?;
        norm = client.norm(r)?;
        timers.rest += rest.elapsed();

        if !norm.is_finite() {
            outcome = SolveOutcome::Breakdown;
            break;
        }
        if norm < threshold {
            outcome = SolveOutcome::Converged;
            break;
        }

        if control.verbosity > 1 {
            log::trace!("it: {it}, norm: {norm:e}");
        }
        it += 0.5;
    }

    client.synchronize()?;
    let elapsed = t_total.elapsed();
    let reduction = norm / norm_0;
    let result = SolverResult {
        iterations: it.min(maxit),
        reduction,
        conv_rate: reduction.powf(1.0 / it),
        elapsed,
        converged: outcome == SolveOutcome::Converged,
        outcome,
    };

    if control.verbosity > 0 {
        log::info!(
            "=== {}: conv_rate: {:.4}, time: {:.6} s, time per iteration: {:.6} s, iterations: {}",
            outcome,
            result.conv_rate,
            elapsed.as_secs_f64(),
            elapsed.as_secs_f64() / it,
            it
        );
    }
    if control.verbosity >= 4 {
        log::debug!(
            "prec_apply: {:.6} s, wells apply: {:.6} s, spmv: {:.6} s, rest: {:.6} s, total: {:.6} s",
            timers.precond.as_secs_f64(),
            timers.wells.as_secs_f64(),
            timers.spmv.as_secs_f64(),
            timers.rest.as_secs_f64(),
            elapsed.as_secs_f64()
        );
    }

    Ok(result)
}
