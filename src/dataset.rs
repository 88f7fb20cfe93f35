//! Training patterns.
//!
//! The objective only needs indexed access to input and target rows, so the
//! [`Dataset`] trait is deliberately small. [`MemoryDataset`] stores rows
//! back to back in two flat vectors; [`Subset`] is a borrowed view over a
//! chosen set of rows.

use crate::error::{NetfitError, NetfitResult};

/// Indexed input/target pairs.
pub trait Dataset {
    /// Number of patterns.
    fn len(&self) -> usize;

    /// Input row length.
    fn x_size(&self) -> usize;

    /// Target row length.
    fn y_size(&self) -> usize;

    /// Input row `i`.
    fn x(&self, i: usize) -> &[f64];

    /// Target row `i`.
    fn y(&self, i: usize) -> &[f64];

    /// True when there are no patterns.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row-major in-memory dataset.
///
/// # Example
///
/// ```rust
/// use netfit::{Dataset, MemoryDataset};
///
/// let data = MemoryDataset::xor();
/// assert_eq!(data.len(), 4);
/// assert_eq!(data.x(3), &[1.0, 1.0]);
/// assert_eq!(data.y(3), &[0.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDataset {
    x_size: usize,
    y_size: usize,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl MemoryDataset {
    /// Creates an empty dataset with fixed row lengths.
    pub fn new(x_size: usize, y_size: usize) -> Self {
        Self {
            x_size,
            y_size,
            xs: Vec::new(),
            ys: Vec::new(),
        }
    }

    /// Builds a dataset from equally long input and target rows.
    pub fn from_rows(inputs: &[Vec<f64>], targets: &[Vec<f64>]) -> NetfitResult<Self> {
        if inputs.len() != targets.len() {
            return Err(NetfitError::shape_mismatch(&[inputs.len()], &[targets.len()]));
        }
        let x_size = inputs.first().map_or(0, Vec::len);
        let y_size = targets.first().map_or(0, Vec::len);
        let mut data = Self::new(x_size, y_size);
        for (x, y) in inputs.iter().zip(targets) {
            data.push(x, y)?;
        }
        Ok(data)
    }

    /// The four XOR patterns with 0/1 targets.
    pub fn xor() -> Self {
        Self {
            x_size: 2,
            y_size: 1,
            xs: vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0],
            ys: vec![0.0, 1.0, 1.0, 0.0],
        }
    }

    /// Appends one pattern.
    pub fn push(&mut self, x: &[f64], y: &[f64]) -> NetfitResult<()> {
        if x.len() != self.x_size || y.len() != self.y_size {
            return Err(NetfitError::shape_mismatch(
                &[self.x_size, self.y_size],
                &[x.len(), y.len()],
            ));
        }
        self.xs.extend_from_slice(x);
        self.ys.extend_from_slice(y);
        Ok(())
    }
}

impl Dataset for MemoryDataset {
    fn len(&self) -> usize {
        if self.x_size > 0 {
            self.xs.len() / self.x_size
        } else {
            self.ys.len() / self.y_size.max(1)
        }
    }

    fn x_size(&self) -> usize {
        self.x_size
    }

    fn y_size(&self) -> usize {
        self.y_size
    }

    fn x(&self, i: usize) -> &[f64] {
        &self.xs[i * self.x_size..(i + 1) * self.x_size]
    }

    fn y(&self, i: usize) -> &[f64] {
        &self.ys[i * self.y_size..(i + 1) * self.y_size]
    }
}

/// Borrowed view over selected rows of another dataset.
#[derive(Debug, Clone)]
pub struct Subset<'a, D: Dataset + ?Sized> {
    data: &'a D,
    indices: Vec<usize>,
}

impl<'a, D: Dataset + ?Sized> Subset<'a, D> {
    /// Creates a view; indices out of range are rejected.
    pub fn new(data: &'a D, indices: Vec<usize>) -> NetfitResult<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= data.len()) {
            return Err(NetfitError::shape_mismatch(&[data.len()], &[bad]));
        }
        Ok(Self { data, indices })
    }

    /// Row indices into the parent dataset.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl<D: Dataset + ?Sized> Dataset for Subset<'_, D> {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn x_size(&self) -> usize {
        self.data.x_size()
    }

    fn y_size(&self) -> usize {
        self.data.y_size()
    }

    fn x(&self, i: usize) -> &[f64] {
        self.data.x(self.indices[i])
    }

    fn y(&self, i: usize) -> &[f64] {
        self.data.y(self.indices[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let data = MemoryDataset::from_rows(
            &[vec![1.0, 2.0], vec![3.0, 4.0]],
            &[vec![0.5], vec![-0.5]],
        )
        .unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.x(1), &[3.0, 4.0]);
        assert_eq!(data.y(0), &[0.5]);
    }

    #[test]
    fn test_push_checks_shape() {
        let mut data = MemoryDataset::new(2, 1);
        assert!(data.push(&[1.0], &[0.0]).is_err());
        assert!(data.push(&[1.0, 2.0], &[0.0]).is_ok());
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_mismatched_rows() {
        assert!(MemoryDataset::from_rows(&[vec![1.0]], &[]).is_err());
    }

    #[test]
    fn test_subset_view() {
        let data = MemoryDataset::xor();
        let sub = Subset::new(&data, vec![3, 1]).unwrap();
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.x(0), &[1.0, 1.0]);
        assert_eq!(sub.y(1), &[1.0]);
        assert!(Subset::new(&data, vec![4]).is_err());
    }
}
