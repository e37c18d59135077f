//! The solver orchestrator

use std::time::Instant;

use super::bicgstab::{IterationControl, KrylovVectors, pbicgstab};
use super::config::SolverConfig;
use super::result::{SolveOutcome, SolverResult, SolverState};
use crate::algorithm::precond::{Preconditioner, PreconditionerKind, create_preconditioner};
use crate::algorithm::reorder::{ReorderStrategy, Reordering, compute_reordering};
use crate::error::{Error, Result};
use crate::runtime::{Device, Runtime, RuntimeClient};
use crate::sparse::{BlockedMatrix, DeviceBlockMatrix};
use crate::wells::WellContributions;

/// Everything the solver holds for one matrix pattern
struct System<R: Runtime> {
    /// Last values in natural order
    natural: BlockedMatrix,
    /// The same values in solver order
    solver_matrix: BlockedMatrix,
    reordering: Option<Reordering>,
    /// rhs in solver order
    rb: Vec<f64>,
    device_matrix: Option<DeviceBlockMatrix<R>>,
    vectors: KrylovVectors<R>,
}

impl<R: Runtime> System<R> {
    fn same_pattern(&self, matrix: &BlockedMatrix) -> bool {
        let own = &self.natural;
        own.block_size() == matrix.block_size()
            && own.row_pointers() == matrix.row_pointers()
            && own.col_indices() == matrix.col_indices()
    }
}

/// Preconditioned block BiCGSTAB solver on runtime `R`.
///
/// The solver walks through the states of [`SolverState`]; every operation
/// checks that it is called in a state that allows it and returns
/// [`Error::InvalidState`] otherwise.
///
/// ```
/// use blocksolve::runtime::cpu::CpuRuntime;
/// use blocksolve::solver::{BlockSolver, SolverConfig};
/// use blocksolve::sparse::BlockedMatrix;
/// use blocksolve::wells::NoWells;
///
/// let a = BlockedMatrix::from_blocks(
///     2,
///     1,
///     vec![(0, 0, vec![4.0]), (0, 1, vec![-1.0]), (1, 0, vec![-1.0]), (1, 1, vec![4.0])],
/// )
/// .unwrap();
/// let config = SolverConfig { tolerance: 1e-10, ..Default::default() };
/// let mut solver = BlockSolver::<CpuRuntime>::new(config).unwrap();
/// let result = solver.solve_system(&a, &[3.0, 3.0], &mut NoWells).unwrap();
/// assert!(result.converged);
///
/// let mut x = vec![0.0; 2];
/// solver.get_result(&mut x).unwrap();
/// assert!((x[0] - 1.0).abs() < 1e-8);
/// ```
pub struct BlockSolver<R: Runtime> {
    config: SolverConfig,
    kind: PreconditionerKind,
    strategy: ReorderStrategy,
    client: R::Client,
    state: SolverState,
    preconditioner: Box<dyn Preconditioner<R>>,
    system: Option<System<R>>,
}

impl<R: Runtime> BlockSolver<R> {
    /// Create a solver.
    ///
    /// Selectors and numeric settings are validated before the device is
    /// touched, so a bad configuration never allocates device resources.
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        let kind = config.preconditioner_kind()?;
        let strategy = config.reorder_strategy()?;

        let device = R::select_device(config.platform_id, config.device_id)?;
        let client = R::create_client(&device)?;
        let preconditioner = create_preconditioner::<R>(kind, &config.preconditioner_options());

        if config.verbosity > 0 {
            log::info!(
                "BlockSolver on {} ({}): preconditioner {kind}, reorder {strategy}",
                R::name(),
                device.name()
            );
        }

        Ok(Self {
            config,
            kind,
            strategy,
            client,
            state: SolverState::Uninitialized,
            preconditioner,
            system: None,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Configuration the solver was created with
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Selected preconditioner
    pub fn preconditioner_kind(&self) -> PreconditionerKind {
        self.kind
    }

    /// Runtime client used for every device operation
    pub fn client(&self) -> &R::Client {
        &self.client
    }

    /// Active preconditioner
    pub fn preconditioner(&self) -> &dyn Preconditioner<R> {
        self.preconditioner.as_ref()
    }

    /// Reordering of the analyzed pattern
    pub fn reordering(&self) -> Option<&Reordering> {
        self.system.as_ref().and_then(|s| s.reordering.as_ref())
    }

    fn invalid_state(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn require_analyzed(&self, operation: &'static str) -> Result<()> {
        if self.state.is_analyzed() {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn log_phase(&self, phase: &str, start: Instant) {
        if self.config.verbosity > 2 {
            log::debug!("{phase} time: {:.6} s", start.elapsed().as_secs_f64());
        }
    }

    /// Take the matrix pattern and allocate the device vectors
    pub fn initialize(&mut self, matrix: &BlockedMatrix) -> Result<()> {
        let start = Instant::now();
        if matrix.nb() == 0 {
            return Err(Error::invalid_dimension("matrix", "no block rows"));
        }
        let vectors = KrylovVectors::allocate(&self.client, matrix.n())?;
        self.system = Some(System {
            natural: matrix.clone(),
            solver_matrix: matrix.clone(),
            reordering: None,
            rb: vec![0.0; matrix.n()],
            device_matrix: None,
            vectors,
        });
        self.state = SolverState::Initialized;

        if self.config.verbosity > 0 {
            log::info!(
                "initialized: nb {}, block size {}, nnzb {}",
                matrix.nb(),
                matrix.block_size(),
                matrix.nnzb()
            );
        }
        self.log_phase("initialize", start);
        Ok(())
    }

    /// Reorder the pattern and run the preconditioner analysis
    pub fn analyze_matrix(&mut self) -> Result<()> {
        let start = Instant::now();
        let strategy = self.strategy;
        let verbosity = self.config.verbosity;
        let client = &self.client;
        let system = self
            .system
            .as_mut()
            .ok_or_else(|| Error::InvalidState {
                operation: "analyze_matrix",
                state: SolverState::Uninitialized.to_string(),
            })?;
        let natural = &system.natural;
        if natural.nnzb() == 0 {
            return Err(Error::analysis("matrix has no blocks"));
        }
        for row in 0..natural.nb() {
            if natural.diagonal_index(row).is_none() {
                return Err(Error::analysis(format!(
                    "block row {row} has no diagonal block"
                )));
            }
        }

        let reordering = match compute_reordering(natural, strategy) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("{strategy} reordering failed ({e}), keeping natural order");
                Reordering::identity(natural.nb())
            }
        };
        let solver_matrix = if reordering.is_identity() {
            natural.clone()
        } else {
            natural.permuted(reordering.permutation())?
        };

        if verbosity > 0 && !reordering.is_identity() {
            log::info!(
                "{strategy}: {} groups for {} block rows",
                reordering.num_levels(),
                natural.nb()
            );
        }

        self.preconditioner.analyze(client, &solver_matrix)?;

        system.solver_matrix = solver_matrix;
        system.reordering = Some(reordering);
        system.device_matrix = None;
        self.state = SolverState::PatternAnalyzed;
        self.log_phase("analyze_matrix", start);
        Ok(())
    }

    /// Replace the matrix values and the right-hand side (natural order).
    ///
    /// The pattern must match the one given to [`BlockSolver::initialize`].
    pub fn update_system(
        &mut self,
        values: &[f64],
        rhs: &[f64],
        wells: &mut dyn WellContributions<R>,
    ) -> Result<()> {
        let start = Instant::now();
        self.require_analyzed("update_system")?;
        let client = &self.client;
        let system = self
            .system
            .as_mut()
            .ok_or_else(|| Error::InvalidState {
                operation: "update_system",
                state: SolverState::Uninitialized.to_string(),
            })?;
        let reordering = system.reordering.as_ref().ok_or_else(|| Error::InvalidState {
            operation: "update_system",
            state: SolverState::Initialized.to_string(),
        })?;
        let bs = system.natural.block_size();
        Error::check_len("rhs", system.natural.n(), rhs.len())?;

        system.natural.replace_values(values)?;
        if reordering.is_identity() {
            system.solver_matrix.replace_values(values)?;
            system.rb.copy_from_slice(rhs);
            wells.set_reordering(client, None)?;
        } else {
            system
                .solver_matrix
                .permute_values_from(&system.natural, reordering.permutation())?;
            reordering.permute_vector(rhs, bs, &mut system.rb)?;
            wells.set_reordering(client, Some(reordering.permutation()))?;
        }

        self.log_phase("update_system", start);
        Ok(())
    }

    /// Build the preconditioner from the current values.
    ///
    /// On failure the solver stays in [`SolverState::PatternAnalyzed`] and
    /// the cause is wrapped in [`Error::PreconditionerBuildFailed`].
    pub fn create_preconditioner(&mut self) -> Result<()> {
        let start = Instant::now();
        self.require_analyzed("create_preconditioner")?;
        let client = &self.client;
        let system = self
            .system
            .as_mut()
            .ok_or_else(|| Error::InvalidState {
                operation: "create_preconditioner",
                state: SolverState::Uninitialized.to_string(),
            })?;

        match system.device_matrix.as_mut() {
            Some(dm) => dm.update_values(client, system.solver_matrix.values())?,
            None => {
                system.device_matrix =
                    Some(DeviceBlockMatrix::upload(client, &system.solver_matrix, "matrix")?);
            }
        }
        let device_matrix = system
            .device_matrix
            .as_ref()
            .ok_or_else(|| Error::device("create_preconditioner", "matrix not on device"))?;

        if let Err(e) = self
            .preconditioner
            .build(client, &system.solver_matrix, device_matrix)
        {
            self.state = SolverState::PatternAnalyzed;
            return Err(Error::PreconditionerBuildFailed {
                source: Box::new(e),
            });
        }

        self.state = SolverState::PreconditionerBuilt;
        self.log_phase("create_preconditioner", start);
        Ok(())
    }

    /// Upload pattern, values and rhs; zero the solution
    pub fn copy_system_to_device(&mut self) -> Result<()> {
        let start = Instant::now();
        self.require_analyzed("copy_system_to_device")?;
        let client = &self.client;
        let system = self
            .system
            .as_mut()
            .ok_or_else(|| Error::InvalidState {
                operation: "copy_system_to_device",
                state: SolverState::Uninitialized.to_string(),
            })?;

        system.device_matrix = Some(DeviceBlockMatrix::upload(
            client,
            &system.solver_matrix,
            "matrix",
        )?);
        client.write_vector(&mut system.vectors.b, &system.rb)?;
        client.fill_zero(&mut system.vectors.x)?;

        self.log_phase("copy_system_to_device", start);
        Ok(())
    }

    /// Upload values and rhs, keeping the device pattern; zero the solution
    pub fn update_system_on_device(&mut self) -> Result<()> {
        let start = Instant::now();
        self.require_analyzed("update_system_on_device")?;
        let state = self.state;
        let client = &self.client;
        let system = self.system.as_mut().ok_or_else(|| Error::InvalidState {
            operation: "update_system_on_device",
            state: state.to_string(),
        })?;
        let device_matrix = system.device_matrix.as_mut().ok_or_else(|| Error::InvalidState {
            operation: "update_system_on_device",
            state: format!("{state}, matrix not on device"),
        })?;

        device_matrix.update_values(client, system.solver_matrix.values())?;
        client.write_vector(&mut system.vectors.b, &system.rb)?;
        client.fill_zero(&mut system.vectors.x)?;

        self.log_phase("update_system_on_device", start);
        Ok(())
    }

    /// Run BiCGSTAB on the device system
    pub fn solve(&mut self, wells: &mut dyn WellContributions<R>) -> Result<SolverResult> {
        if !self.state.can_solve() {
            return Err(self.invalid_state("solve"));
        }
        let state = self.state;
        let control = IterationControl {
            max_iterations: self.config.max_iterations,
            tolerance: self.config.tolerance,
            verbosity: self.config.verbosity,
        };
        let System {
            device_matrix,
            vectors,
            ..
        } = self.system.as_mut().ok_or_else(|| Error::InvalidState {
            operation: "solve",
            state: state.to_string(),
        })?;
        let device_matrix = device_matrix.as_ref().ok_or_else(|| Error::InvalidState {
            operation: "solve",
            state: format!("{state}, matrix not on device"),
        })?;

        self.state = SolverState::Solving;
        let outcome = pbicgstab(
            &self.client,
            device_matrix,
            self.preconditioner.as_mut(),
            wells,
            vectors,
            &control,
        );

        self.state = match &outcome {
            Ok(result) => match result.outcome {
                SolveOutcome::Converged | SolveOutcome::ZeroRhs => SolverState::Converged,
                SolveOutcome::MaxIterationsReached => SolverState::MaxIterationsReached,
                SolveOutcome::Breakdown => SolverState::Failed,
            },
            Err(_) => SolverState::Failed,
        };
        outcome
    }

    /// Download the solution into `x` in natural order
    pub fn get_result(&mut self, x: &mut [f64]) -> Result<()> {
        if !self.state.can_solve() {
            return Err(self.invalid_state("get_result"));
        }
        let client = &self.client;
        let system = self.system.as_ref().ok_or_else(|| Error::InvalidState {
            operation: "get_result",
            state: SolverState::Uninitialized.to_string(),
        })?;
        let n = system.natural.n();
        Error::check_len("solution", n, x.len())?;

        match system.reordering.as_ref().filter(|r| !r.is_identity()) {
            Some(reordering) => {
                let mut reordered = vec![0.0; n];
                client.download_vector(&system.vectors.x, &mut reordered)?;
                reordering.unpermute_vector(&reordered, system.natural.block_size(), x)
            }
            None => client.download_vector(&system.vectors.x, x),
        }
    }

    /// Full solve of `matrix x = rhs`.
    ///
    /// The first call, or a call with a new pattern, initializes and
    /// analyzes; later calls only refresh values, rebuild the
    /// preconditioner and upload. Fetch the solution with
    /// [`BlockSolver::get_result`].
    pub fn solve_system(
        &mut self,
        matrix: &BlockedMatrix,
        rhs: &[f64],
        wells: &mut dyn WellContributions<R>,
    ) -> Result<SolverResult> {
        let start = Instant::now();
        let repeat = self.state.is_analyzed()
            && self.system.as_ref().is_some_and(|s| s.same_pattern(matrix));

        if repeat {
            self.update_system(matrix.values(), rhs, wells)?;
            self.create_preconditioner()?;
            self.update_system_on_device()?;
        } else {
            self.initialize(matrix)?;
            self.analyze_matrix()?;
            self.update_system(matrix.values(), rhs, wells)?;
            self.create_preconditioner()?;
            self.copy_system_to_device()?;
        }

        let result = self.solve(wells)?;
        self.log_phase("solve_system", start);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cpu::CpuRuntime;
    use crate::wells::NoWells;

    fn tridiagonal(n: usize) -> BlockedMatrix {
        let mut blocks = Vec::new();
        for i in 0..n {
            blocks.push((i, i, vec![4.0]));
            if i > 0 {
                blocks.push((i, i - 1, vec![-1.0]));
            }
            if i + 1 < n {
                blocks.push((i, i + 1, vec![-1.0]));
            }
        }
        BlockedMatrix::from_blocks(n, 1, blocks).unwrap()
    }

    fn solver(config: SolverConfig) -> BlockSolver<CpuRuntime> {
        BlockSolver::<CpuRuntime>::new(config).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let mut s = solver(SolverConfig {
            tolerance: 1e-8,
            ..Default::default()
        });
        let a = tridiagonal(6);
        let b = vec![1.0; 6];
        assert_eq!(s.state(), SolverState::Uninitialized);

        s.initialize(&a).unwrap();
        assert_eq!(s.state(), SolverState::Initialized);
        s.analyze_matrix().unwrap();
        assert_eq!(s.state(), SolverState::PatternAnalyzed);
        s.update_system(a.values(), &b, &mut NoWells).unwrap();
        assert_eq!(s.state(), SolverState::PatternAnalyzed);
        s.create_preconditioner().unwrap();
        assert_eq!(s.state(), SolverState::PreconditionerBuilt);
        s.copy_system_to_device().unwrap();
        let result = s.solve(&mut NoWells).unwrap();
        assert!(result.converged);
        assert_eq!(s.state(), SolverState::Converged);
    }

    #[test]
    fn test_out_of_order_calls() {
        let mut s = solver(SolverConfig::default());
        assert!(matches!(
            s.analyze_matrix(),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(s.solve(&mut NoWells), Err(Error::InvalidState { .. })));

        let a = tridiagonal(4);
        s.initialize(&a).unwrap();
        assert!(matches!(
            s.update_system(a.values(), &[0.0; 4], &mut NoWells),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            s.create_preconditioner(),
            Err(Error::InvalidState { .. })
        ));
        let mut x = vec![0.0; 4];
        assert!(matches!(s.get_result(&mut x), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_update_on_device_requires_upload() {
        let mut s = solver(SolverConfig::default());
        let a = tridiagonal(4);
        s.initialize(&a).unwrap();
        s.analyze_matrix().unwrap();
        assert!(matches!(
            s.update_system_on_device(),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_zero_rhs() {
        let mut s = solver(SolverConfig::default());
        let a = tridiagonal(5);
        let result = s.solve_system(&a, &[0.0; 5], &mut NoWells).unwrap();
        assert_eq!(result.outcome, SolveOutcome::ZeroRhs);
        assert!(result.converged);
        assert_eq!(result.iterations, 0.0);
        let mut x = vec![1.0; 5];
        s.get_result(&mut x).unwrap();
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_non_finite_rhs_fails_and_recovers() {
        let mut s = solver(SolverConfig {
            tolerance: 1e-8,
            ..Default::default()
        });
        let blocks = vec![
            (0, 0, vec![4.0, 1.0, 0.5, 3.0]),
            (0, 1, vec![-1.0, 0.0, 0.0, -1.0]),
            (1, 0, vec![-1.0, 0.0, 0.0, -1.0]),
            (1, 1, vec![4.0, 0.5, 1.0, 3.0]),
        ];
        let a = BlockedMatrix::from_blocks(2, 2, blocks).unwrap();

        let result = s
            .solve_system(&a, &[1.0, f64::NAN, 0.0, 0.0], &mut NoWells)
            .unwrap();
        assert_eq!(result.outcome, SolveOutcome::Breakdown);
        assert!(!result.converged);
        assert_eq!(s.state(), SolverState::Failed);

        let result = s.solve_system(&a, &[1.0, 2.0, 0.0, 0.0], &mut NoWells).unwrap();
        assert!(result.converged);
        assert_eq!(s.state(), SolverState::Converged);
    }

    #[test]
    fn test_max_iterations_reached() {
        let mut s = solver(SolverConfig {
            max_iterations: 1,
            tolerance: 1e-14,
            preconditioner: "isai".to_string(),
            ..Default::default()
        });
        // non-symmetric and irregular enough not to converge in one step
        let n = 12;
        let mut blocks = Vec::new();
        for i in 0..n {
            blocks.push((i, i, vec![3.0 + (i % 3) as f64]));
            blocks.push((i, (i + 5) % n, vec![-1.3]));
            blocks.push((i, (i + 7) % n, vec![0.7]));
        }
        let a = BlockedMatrix::from_blocks(n, 1, blocks).unwrap();
        let b: Vec<f64> = (0..n).map(|i| (i as f64).sin() + 1.5).collect();
        let result = s.solve_system(&a, &b, &mut NoWells).unwrap();
        assert_eq!(result.outcome, SolveOutcome::MaxIterationsReached);
        assert!(!result.converged);
        assert_eq!(result.iterations, 1.0);
        assert_eq!(s.state(), SolverState::MaxIterationsReached);
    }

    #[test]
    fn test_repeat_call_keeps_pattern() {
        let mut s = solver(SolverConfig {
            tolerance: 1e-10,
            reorder: "graph_coloring".to_string(),
            ..Default::default()
        });
        let a = tridiagonal(8);
        let b = vec![1.0; 8];
        s.solve_system(&a, &b, &mut NoWells).unwrap();
        let first = s.reordering().unwrap().to_order().to_vec();

        let mut a2 = a.clone();
        a2.values_mut().iter_mut().for_each(|v| *v *= 2.0);
        let result = s.solve_system(&a2, &b, &mut NoWells).unwrap();
        assert!(result.converged);
        assert_eq!(s.reordering().unwrap().to_order(), first.as_slice());

        let mut x = vec![0.0; 8];
        s.get_result(&mut x).unwrap();
        let mut ax = vec![0.0; 8];
        a2.spmv(&x, &mut ax).unwrap();
        for (l, r) in ax.iter().zip(&b) {
            assert!((l - r).abs() < 1e-8);
        }
    }

    #[test]
    fn test_rejects_bad_config_before_device() {
        let config = SolverConfig {
            reorder: "random".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            BlockSolver::<CpuRuntime>::new(config),
            Err(Error::UnsupportedConfiguration { .. })
        ));
    }
}
