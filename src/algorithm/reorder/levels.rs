//! Level scheduling for block triangular sweeps
//!
//! Sparse triangular operations have row-to-row dependencies: in a forward
//! sweep row `i` depends on every row `j < i` with `L[i,j] != 0`. Level
//! scheduling groups rows into levels such that
//! - all rows within a level are independent (one parallel launch)
//! - levels execute sequentially
//!
//! ```text
//! forward:  level[i] = max(level[j] + 1 for j < i, A[i,j] != 0), else 0
//! backward: level[i] = max(level[j] + 1 for j > i, A[i,j] != 0), else 0
//! ```
//!
//! The same recurrence on the symmetrized pattern gives the
//! level-scheduling reordering: sorting rows by level leaves no coupling
//! between two rows of one level.

use super::symmetric_adjacency;
use crate::error::{Error, Result};

/// Result of level analysis for a sparse pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelSchedule {
    /// Level assignment for each row: level_of_row[i] = level of row i
    pub level_of_row: Vec<usize>,

    /// Rows grouped by level: rows_per_level[l] = row indices at level l,
    /// ascending
    pub rows_per_level: Vec<Vec<usize>>,

    /// Total number of levels (depth of the dependency DAG)
    pub num_levels: usize,

    /// Maximum parallelism (largest level size)
    pub max_parallelism: usize,
}

impl LevelSchedule {
    /// Group rows by a precomputed level assignment
    pub fn from_level_of_row(level_of_row: Vec<usize>) -> Self {
        let num_levels = level_of_row.iter().max().map(|&x| x + 1).unwrap_or(0);
        let mut rows_per_level: Vec<Vec<usize>> = vec![Vec::new(); num_levels];
        for (row, &level) in level_of_row.iter().enumerate() {
            rows_per_level[level].push(row);
        }
        let max_parallelism = rows_per_level.iter().map(|v| v.len()).max().unwrap_or(0);

        Self {
            level_of_row,
            rows_per_level,
            num_levels,
            max_parallelism,
        }
    }
}

fn check_col(row: usize, col: usize, n: usize) -> Result<usize> {
    if col >= n {
        return Err(Error::analysis(format!(
            "column {col} in row {row} out of range for {n} rows"
        )));
    }
    Ok(col)
}

/// Compute the forward-sweep level schedule of a (block) CSR pattern.
///
/// Only entries with `j < i` create dependencies, so the full pattern of an
/// ILU(0) factor can be passed directly.
pub fn compute_levels_lower(
    n: usize,
    row_ptrs: &[usize],
    col_indices: &[usize],
) -> Result<LevelSchedule> {
    let mut level_of_row = vec![0usize; n];

    for i in 0..n {
        let mut max_dep_level = 0usize;
        for &j in &col_indices[row_ptrs[i]..row_ptrs[i + 1]] {
            let j = check_col(i, j, n)?;
            if j < i {
                max_dep_level = max_dep_level.max(level_of_row[j] + 1);
            }
        }
        level_of_row[i] = max_dep_level;
    }

    Ok(LevelSchedule::from_level_of_row(level_of_row))
}

/// Compute the backward-sweep level schedule of a (block) CSR pattern.
///
/// For backward substitution, dependencies flow from higher to lower indices.
pub fn compute_levels_upper(
    n: usize,
    row_ptrs: &[usize],
    col_indices: &[usize],
) -> Result<LevelSchedule> {
    let mut level_of_row = vec![0usize; n];

    for i in (0..n).rev() {
        let mut max_dep_level = 0usize;
        for &j in &col_indices[row_ptrs[i]..row_ptrs[i + 1]] {
            let j = check_col(i, j, n)?;
            if j > i {
                max_dep_level = max_dep_level.max(level_of_row[j] + 1);
            }
        }
        level_of_row[i] = max_dep_level;
    }

    Ok(LevelSchedule::from_level_of_row(level_of_row))
}

/// Level of every row on the structurally symmetrized pattern
pub fn compute_levels_symmetric(
    n: usize,
    row_ptrs: &[usize],
    col_indices: &[usize],
) -> Result<LevelSchedule> {
    let adjacency = symmetric_adjacency(n, row_ptrs, col_indices)?;
    let mut level_of_row = vec![0usize; n];
    for i in 0..n {
        level_of_row[i] = adjacency[i]
            .iter()
            .filter(|&&j| j < i)
            .map(|&j| level_of_row[j] + 1)
            .max()
            .unwrap_or(0);
    }
    Ok(LevelSchedule::from_level_of_row(level_of_row))
}

/// Flatten level schedule into arrays suitable for device execution.
///
/// Returns:
/// - `level_ptrs`: Start index of each level in `level_rows` [num_levels + 1]
/// - `level_rows`: Row indices sorted by level [n]
pub fn flatten_levels(schedule: &LevelSchedule) -> (Vec<usize>, Vec<usize>) {
    let n: usize = schedule.level_of_row.len();
    let mut level_ptrs = Vec::with_capacity(schedule.num_levels + 1);
    let mut level_rows = Vec::with_capacity(n);

    level_ptrs.push(0);
    for level_row_list in &schedule.rows_per_level {
        level_rows.extend_from_slice(level_row_list);
        level_ptrs.push(level_rows.len());
    }

    (level_ptrs, level_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_lower_diagonal() {
        // Diagonal pattern: no dependencies, all rows at level 0
        let schedule = compute_levels_lower(3, &[0, 1, 2, 3], &[0, 1, 2]).unwrap();

        assert_eq!(schedule.num_levels, 1);
        assert_eq!(schedule.level_of_row, vec![0, 0, 0]);
        assert_eq!(schedule.max_parallelism, 3);
    }

    #[test]
    fn test_levels_tridiagonal_full_pattern() {
        // [x x .]
        // [x x x]
        // [. x x]
        let row_ptrs = [0, 2, 5, 7];
        let cols = [0, 1, 0, 1, 2, 1, 2];

        let lower = compute_levels_lower(3, &row_ptrs, &cols).unwrap();
        assert_eq!(lower.level_of_row, vec![0, 1, 2]);
        assert_eq!(lower.max_parallelism, 1);

        let upper = compute_levels_upper(3, &row_ptrs, &cols).unwrap();
        assert_eq!(upper.level_of_row, vec![2, 1, 0]);
    }

    #[test]
    fn test_levels_lower_with_parallelism() {
        // [x . . .]
        // [. x . .]
        // [x . x .]
        // [. x . x]
        let schedule = compute_levels_lower(4, &[0, 1, 2, 4, 6], &[0, 1, 0, 2, 1, 3]).unwrap();

        assert_eq!(schedule.num_levels, 2);
        assert_eq!(schedule.rows_per_level[0], vec![0, 1]);
        assert_eq!(schedule.rows_per_level[1], vec![2, 3]);
    }

    #[test]
    fn test_symmetric_levels_see_upper_entries() {
        // Row 0 couples to row 2 only through an upper entry
        // [x . x]
        // [. x .]
        // [. . x]
        let schedule = compute_levels_symmetric(3, &[0, 2, 3, 4], &[0, 2, 1, 2]).unwrap();
        assert_eq!(schedule.level_of_row, vec![0, 0, 1]);
    }

    #[test]
    fn test_out_of_range_column() {
        let err = compute_levels_lower(2, &[0, 1, 2], &[0, 7]).unwrap_err();
        assert!(matches!(err, Error::AnalysisFailed { .. }));
    }

    #[test]
    fn test_flatten_levels() {
        let schedule = LevelSchedule::from_level_of_row(vec![0, 1, 0, 1]);
        let (level_ptrs, level_rows) = flatten_levels(&schedule);

        assert_eq!(level_ptrs, vec![0, 2, 4]);
        assert_eq!(level_rows, vec![0, 2, 1, 3]);
    }
}
