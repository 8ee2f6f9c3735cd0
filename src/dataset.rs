//! Read-only dataset views.
//!
//! A [`Dataset`] is a borrowed, row-major N x D matrix of `f32` values.
//! Indices never copy the vectors they are built over; they store row
//! indices and read the data through the view on every distance
//! computation, so the backing buffer must outlive every index built
//! over it.

use crate::error::BuildError;

/// A non-owning view of N vectors of dimensionality D, stored row-major.
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    rows: usize,
    cols: usize,
    data: &'a [f32],
}

impl<'a> Dataset<'a> {
    /// Create a view over `data`, which must hold exactly `rows * cols` values.
    pub fn new(rows: usize, cols: usize, data: &'a [f32]) -> Result<Self, BuildError> {
        if rows * cols != data.len() {
            return Err(BuildError::ShapeMismatch {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Number of vectors.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Vector dimensionality.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// The `i`-th vector. The returned slice borrows the backing buffer,
    /// not the view, so it may outlive this `Dataset` value.
    #[inline]
    pub fn row(&self, i: usize) -> &'a [f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// The raw backing buffer.
    #[inline]
    pub fn data(&self) -> &'a [f32] {
        self.data
    }

    /// Size of the backing buffer in bytes.
    #[inline]
    pub fn mem_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_view() {
        let buf = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let ds = Dataset::new(3, 2, &buf).unwrap();

        assert_eq!(ds.rows(), 3);
        assert_eq!(ds.cols(), 2);
        assert_eq!(ds.row(0), &[1.0, 2.0]);
        assert_eq!(ds.row(2), &[5.0, 6.0]);
        assert_eq!(ds.mem_bytes(), 24);
    }

    #[test]
    fn test_dataset_shape_mismatch() {
        let buf = [1.0, 2.0, 3.0];
        assert!(matches!(
            Dataset::new(2, 2, &buf),
            Err(BuildError::ShapeMismatch { len: 3, .. })
        ));
    }

    #[test]
    fn test_row_outlives_view() {
        let buf = vec![0.5f32; 8];
        let first;
        {
            let ds = Dataset::new(2, 4, &buf).unwrap();
            first = ds.row(0);
        }
        assert_eq!(first.len(), 4);
    }
}
