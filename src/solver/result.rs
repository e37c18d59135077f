//! Solve outcome and solver state

use std::fmt;
use std::time::Duration;

/// Why the iteration stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// `||r|| < tolerance * ||r0||`
    Converged,
    /// The right-hand side is zero, so `x = 0` is exact
    ZeroRhs,
    /// Iteration limit hit before the tolerance was met
    MaxIterationsReached,
    /// A zero or non-finite inner product stopped the recurrence
    Breakdown,
}

impl SolveOutcome {
    /// Returns true if this outcome counts as converged
    #[inline]
    pub fn is_converged(&self) -> bool {
        matches!(self, SolveOutcome::Converged | SolveOutcome::ZeroRhs)
    }

    /// Returns a human-readable hint for non-converged cases
    pub fn hint(&self) -> &'static str {
        match self {
            SolveOutcome::Converged | SolveOutcome::ZeroRhs => "Converged successfully",
            SolveOutcome::MaxIterationsReached => {
                "Increase max_iterations, loosen the tolerance or use a stronger preconditioner"
            }
            SolveOutcome::Breakdown => {
                "BiCGSTAB broke down; the system or preconditioner may be singular"
            }
        }
    }
}

impl fmt::Display for SolveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveOutcome::Converged => write!(f, "converged"),
            SolveOutcome::ZeroRhs => write!(f, "zero RHS"),
            SolveOutcome::MaxIterationsReached => write!(f, "max iterations reached"),
            SolveOutcome::Breakdown => write!(f, "breakdown"),
        }
    }
}

/// Result of one solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolverResult {
    /// Iterations performed, in half steps (`min(it, max_iterations)`)
    pub iterations: f64,
    /// `||r|| / ||r0||`
    pub reduction: f64,
    /// `reduction^(1 / iterations)`
    pub conv_rate: f64,
    /// Wall time of the iteration
    pub elapsed: Duration,
    /// Whether the tolerance was met
    pub converged: bool,
    /// Why the iteration stopped
    pub outcome: SolveOutcome,
}

/// Lifecycle of a [`BlockSolver`](super::BlockSolver)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    /// Constructed, no system yet
    Uninitialized,
    /// Matrix pattern known, device vectors allocated
    Initialized,
    /// Reordering and preconditioner analysis done
    PatternAnalyzed,
    /// Preconditioner built for the current values
    PreconditionerBuilt,
    /// Inside the iteration
    Solving,
    /// Last solve converged
    Converged,
    /// Last solve hit the iteration limit
    MaxIterationsReached,
    /// Last solve broke down or failed
    Failed,
}

impl SolverState {
    /// True once a preconditioner has been built and a solve may start
    pub fn can_solve(&self) -> bool {
        matches!(
            self,
            SolverState::PreconditionerBuilt
                | SolverState::Converged
                | SolverState::MaxIterationsReached
                | SolverState::Failed
        )
    }

    /// True once the pattern has been analyzed
    pub fn is_analyzed(&self) -> bool {
        !matches!(self, SolverState::Uninitialized | SolverState::Initialized)
    }
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
