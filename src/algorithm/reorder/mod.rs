//! Block-row reordering for parallel triangular sweeps
//!
//! A reordering groups block rows so that rows in one group never couple.
//! Two strategies produce such groups:
//!
//! - **Level scheduling**: dependency levels of the symmetrized pattern
//! - **Graph coloring**: greedy first-fit colors of the symmetrized pattern
//!
//! In both cases rows are sorted stably by group, so the permutation is fully
//! determined by the pattern.

mod coloring;
mod levels;

pub use coloring::greedy_coloring;
pub use levels::{
    LevelSchedule, compute_levels_lower, compute_levels_symmetric, compute_levels_upper,
    flatten_levels,
};

use crate::error::{Error, Result};
use crate::sparse::{BlockedMatrix, Permutation};
use std::fmt;
use std::str::FromStr;

/// How block rows are renumbered before the solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReorderStrategy {
    /// Keep natural order
    #[default]
    None,
    /// Sort rows by dependency level
    LevelScheduling,
    /// Sort rows by greedy color
    GraphColoring,
}

impl FromStr for ReorderStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "level_scheduling" | "level" => Ok(Self::LevelScheduling),
            "graph_coloring" | "coloring" => Ok(Self::GraphColoring),
            other => Err(Error::unsupported(
                "reorder",
                other,
                "expected one of none, level_scheduling, graph_coloring",
            )),
        }
    }
}

impl fmt::Display for ReorderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::LevelScheduling => "level_scheduling",
            Self::GraphColoring => "graph_coloring",
        })
    }
}

/// Permutation plus the group boundaries it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reordering {
    strategy: ReorderStrategy,
    permutation: Permutation,
    level_ptrs: Vec<usize>,
}

impl Reordering {
    /// Identity reordering on `nb` rows (a single group)
    pub fn identity(nb: usize) -> Self {
        Self {
            strategy: ReorderStrategy::None,
            permutation: Permutation::identity(nb),
            level_ptrs: vec![0, nb],
        }
    }

    /// Strategy that produced this reordering
    pub fn strategy(&self) -> ReorderStrategy {
        self.strategy
    }

    /// The permutation
    pub fn permutation(&self) -> &Permutation {
        &self.permutation
    }

    /// `to_order[natural] = reordered`
    pub fn to_order(&self) -> &[usize] {
        self.permutation.to_order()
    }

    /// `from_order[reordered] = natural`
    pub fn from_order(&self) -> &[usize] {
        self.permutation.from_order()
    }

    /// Start of each group in reordered numbering, plus the end
    pub fn level_pointers(&self) -> &[usize] {
        &self.level_ptrs
    }

    /// Number of groups (levels or colors)
    pub fn num_levels(&self) -> usize {
        self.level_ptrs.len().saturating_sub(1)
    }

    /// True when no permutation step has to run
    pub fn is_identity(&self) -> bool {
        self.strategy == ReorderStrategy::None
    }

    /// Natural-order vector into solver order
    pub fn permute_vector(&self, natural: &[f64], bs: usize, out: &mut [f64]) -> Result<()> {
        self.permutation.permute_blocks(natural, bs, out)
    }

    /// Solver-order vector back into natural order
    pub fn unpermute_vector(&self, reordered: &[f64], bs: usize, out: &mut [f64]) -> Result<()> {
        self.permutation.unpermute_blocks(reordered, bs, out)
    }
}

/// Compute the reordering of a block pattern
pub fn compute_reordering(matrix: &BlockedMatrix, strategy: ReorderStrategy) -> Result<Reordering> {
    let nb = matrix.nb();
    if nb == 0 || matrix.nnzb() == 0 {
        return Err(Error::analysis("empty block pattern"));
    }
    let (rp, ci) = (matrix.row_pointers(), matrix.col_indices());

    let groups = match strategy {
        ReorderStrategy::None => return Ok(Reordering::identity(nb)),
        ReorderStrategy::LevelScheduling => compute_levels_symmetric(nb, rp, ci)?.level_of_row,
        ReorderStrategy::GraphColoring => greedy_coloring(nb, rp, ci)?.0,
    };

    let schedule = LevelSchedule::from_level_of_row(groups);
    let (level_ptrs, from_order) = flatten_levels(&schedule);
    Ok(Reordering {
        strategy,
        permutation: Permutation::from_from_order(from_order)?,
        level_ptrs,
    })
}

/// Neighbour lists of the structurally symmetrized pattern, without the
/// diagonal, each sorted ascending
pub(crate) fn symmetric_adjacency(
    n: usize,
    row_ptrs: &[usize],
    col_indices: &[usize],
) -> Result<Vec<Vec<usize>>> {
    if row_ptrs.len() != n + 1 {
        return Err(Error::analysis(format!(
            "{} row pointers for {n} rows",
            row_ptrs.len()
        )));
    }
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for &j in &col_indices[row_ptrs[i]..row_ptrs[i + 1]] {
            if j >= n {
                return Err(Error::analysis(format!(
                    "column {j} in row {i} out of range for {n} rows"
                )));
            }
            if j != i {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }
    for list in &mut adjacency {
        list.sort_unstable();
        list.dedup();
    }
    Ok(adjacency)
}
