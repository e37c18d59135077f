//! Greedy graph coloring of the symmetrized block pattern

use super::symmetric_adjacency;
use crate::error::Result;

/// Color of every block row, first-fit in natural order.
///
/// Two rows coupled in either direction never share a color. Returns the
/// colors and the number of colors used.
pub fn greedy_coloring(
    n: usize,
    row_ptrs: &[usize],
    col_indices: &[usize],
) -> Result<(Vec<usize>, usize)> {
    let adjacency = symmetric_adjacency(n, row_ptrs, col_indices)?;
    let mut color = vec![usize::MAX; n];
    // forbidden[c] == i marks color c as taken by a neighbour of row i
    let mut forbidden: Vec<usize> = Vec::new();
    let mut num_colors = 0;

    for i in 0..n {
        for &j in &adjacency[i] {
            let c = color[j];
            if c != usize::MAX {
                forbidden[c] = i;
            }
        }
        let c = (0..num_colors).find(|&c| forbidden[c] != i).unwrap_or(num_colors);
        if c == num_colors {
            num_colors += 1;
            forbidden.push(usize::MAX);
        }
        color[i] = c;
    }

    Ok((color, num_colors))
}
