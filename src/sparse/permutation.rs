//! Symmetric block-row permutation

use crate::error::{Error, Result};

/// Bijection between natural and solver (reordered) block-row indices.
///
/// `to_order[natural] = reordered` and `from_order[reordered] = natural`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    to_order: Vec<usize>,
    from_order: Vec<usize>,
}

impl Permutation {
    /// Identity on `n` block rows
    pub fn identity(n: usize) -> Self {
        let ids: Vec<usize> = (0..n).collect();
        Self {
            to_order: ids.clone(),
            from_order: ids,
        }
    }

    /// Build from the reordered position of every natural row
    pub fn from_to_order(to_order: Vec<usize>) -> Result<Self> {
        let n = to_order.len();
        let mut from_order = vec![usize::MAX; n];
        for (natural, &reordered) in to_order.iter().enumerate() {
            if reordered >= n {
                return Err(Error::invalid_dimension(
                    "to_order",
                    format!("entry {reordered} out of range for {n} rows"),
                ));
            }
            if from_order[reordered] != usize::MAX {
                return Err(Error::invalid_dimension(
                    "to_order",
                    format!("row {reordered} assigned twice"),
                ));
            }
            from_order[reordered] = natural;
        }
        Ok(Self {
            to_order,
            from_order,
        })
    }

    /// Build from the natural row found at every reordered position
    pub fn from_from_order(from_order: Vec<usize>) -> Result<Self> {
        let inverse = Self::from_to_order(from_order)?;
        Ok(Self {
            to_order: inverse.from_order,
            from_order: inverse.to_order,
        })
    }

    /// Number of block rows
    pub fn len(&self) -> usize {
        self.to_order.len()
    }

    /// True for the permutation of zero rows
    pub fn is_empty(&self) -> bool {
        self.to_order.is_empty()
    }

    /// `to_order[natural] = reordered`
    pub fn to_order(&self) -> &[usize] {
        &self.to_order
    }

    /// `from_order[reordered] = natural`
    pub fn from_order(&self) -> &[usize] {
        &self.from_order
    }

    /// True when no row moves
    pub fn is_identity(&self) -> bool {
        self.to_order.iter().enumerate().all(|(i, &t)| i == t)
    }

    /// `out[i] = natural[from_order[i]]`, per block of `bs` entries
    pub fn permute_blocks(&self, natural: &[f64], bs: usize, out: &mut [f64]) -> Result<()> {
        self.check_vector_len(natural.len(), bs)?;
        self.check_vector_len(out.len(), bs)?;
        for (new, &old) in self.from_order.iter().enumerate() {
            out[new * bs..(new + 1) * bs].copy_from_slice(&natural[old * bs..(old + 1) * bs]);
        }
        Ok(())
    }

    /// `out[i] = reordered[to_order[i]]`, per block of `bs` entries
    pub fn unpermute_blocks(&self, reordered: &[f64], bs: usize, out: &mut [f64]) -> Result<()> {
        self.check_vector_len(reordered.len(), bs)?;
        self.check_vector_len(out.len(), bs)?;
        for (old, &new) in self.to_order.iter().enumerate() {
            out[old * bs..(old + 1) * bs].copy_from_slice(&reordered[new * bs..(new + 1) * bs]);
        }
        Ok(())
    }

    fn check_vector_len(&self, len: usize, bs: usize) -> Result<()> {
        Error::check_len("permuted vector", self.len() * bs, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_to_order_inverse() {
        let p = Permutation::from_to_order(vec![2, 0, 1]).unwrap();
        assert_eq!(p.from_order(), &[1, 2, 0]);
        assert!(!p.is_identity());
        assert!(Permutation::identity(4).is_identity());
    }

    #[test]
    fn test_rejects_non_bijection() {
        assert!(Permutation::from_to_order(vec![0, 0]).is_err());
        assert!(Permutation::from_to_order(vec![0, 5]).is_err());
    }

    #[test]
    fn test_permute_blocks_bs2() {
        let p = Permutation::from_to_order(vec![1, 0]).unwrap();
        let natural = [1.0, 2.0, 3.0, 4.0];
        let mut reordered = [0.0; 4];
        p.permute_blocks(&natural, 2, &mut reordered).unwrap();
        assert_eq!(reordered, [3.0, 4.0, 1.0, 2.0]);

        let mut back = [0.0; 4];
        p.unpermute_blocks(&reordered, 2, &mut back).unwrap();
        assert_eq!(back, natural);
    }
}
