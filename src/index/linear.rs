//! Linear scan index.
//!
//! Scans every vector on each query. O(1) build, O(N) query; exact by
//! construction, which makes it the correctness oracle for the tree
//! indices and the cost baseline for the autotuner.

use crate::dataset::Dataset;
use crate::distance::Distance;
use crate::error::{BuildError, SearchError};
use crate::index::traits::{Algorithm, NnIndex};
use crate::params::SearchParams;
use crate::results::ResultSet;

pub struct LinearIndex<'a> {
    data: Dataset<'a>,
    dist: Distance,
}

impl<'a> LinearIndex<'a> {
    pub fn build(data: Dataset<'a>) -> Result<Self, BuildError> {
        if data.is_empty() {
            return Err(BuildError::EmptyDataset);
        }
        Ok(Self {
            data,
            dist: Distance::from_global(),
        })
    }
}

impl NnIndex for LinearIndex<'_> {
    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet,
        query: &[f32],
        _params: &SearchParams,
    ) -> Result<(), SearchError> {
        if query.len() != self.data.cols() {
            return Err(SearchError::DimensionMismatch {
                expected: self.data.cols(),
                got: query.len(),
            });
        }
        for i in 0..self.data.rows() {
            let worst = result.worst_dist();
            let d = self.dist.distance(self.data.row(i), query, worst);
            result.add_point(d, i);
        }
        Ok(())
    }

    fn veclen(&self) -> usize {
        self.data.cols()
    }

    fn size(&self) -> usize {
        self.data.rows()
    }

    fn used_memory(&self) -> usize {
        std::mem::size_of::<Self>()
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Linear
    }

    fn distance(&self) -> Distance {
        self.dist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corner_data() -> Vec<f32> {
        vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 3.0, 3.0]
    }

    #[test]
    fn test_linear_knn() {
        let buf = corner_data();
        let data = Dataset::new(5, 2, &buf).unwrap();
        let index = LinearIndex::build(data).unwrap();

        let found = index
            .knn(&[0.1, 0.1], 2, &SearchParams::default())
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].index, 0);
        assert!((found[0].distance - 0.02).abs() < 1e-6);
        assert!((found[1].distance - 0.82).abs() < 1e-6);
    }

    #[test]
    fn test_linear_radius() {
        let buf = corner_data();
        let data = Dataset::new(5, 2, &buf).unwrap();
        let index = LinearIndex::build(data).unwrap();

        // Euclidean radius 1.5 captures squared distances <= 2.25: all
        // four unit-square corners but not (3, 3).
        let found = index
            .radius_search(&[0.0, 0.0], 1.5, &SearchParams::default())
            .unwrap();
        let mut indices: Vec<_> = found.iter().map(|n| n.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_linear_dimension_mismatch() {
        let buf = corner_data();
        let data = Dataset::new(5, 2, &buf).unwrap();
        let index = LinearIndex::build(data).unwrap();
        assert!(index.knn(&[0.0], 1, &SearchParams::default()).is_err());
    }

    #[test]
    fn test_linear_rejects_empty_dataset() {
        let buf: Vec<f32> = Vec::new();
        let data = Dataset::new(0, 2, &buf).unwrap();
        assert!(matches!(
            LinearIndex::build(data),
            Err(BuildError::EmptyDataset)
        ));
    }
}
