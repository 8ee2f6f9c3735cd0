//! The shared index surface.

use crate::distance::Distance;
use crate::error::{BuildError, SearchError};
use crate::results::{KnnResultSet, Neighbor, RadiusResultSet, ResultSet};
use crate::params::SearchParams;

/// The five index families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Linear,
    KdTree,
    KMeans,
    Composite,
    VpTree,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Linear => "linear",
            Algorithm::KdTree => "kdtree",
            Algorithm::KMeans => "kmeans",
            Algorithm::Composite => "composite",
            Algorithm::VpTree => "vptree",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Algorithm::Linear),
            "kdtree" => Ok(Algorithm::KdTree),
            "kmeans" => Ok(Algorithm::KMeans),
            "composite" => Ok(Algorithm::Composite),
            "vptree" => Ok(Algorithm::VpTree),
            other => Err(BuildError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Behavior shared by every index: answer neighbor queries against the
/// dataset it was built over, and report its shape and footprint.
pub trait NnIndex {
    /// Populate `result` with neighbors of `query`.
    ///
    /// The result set decides what to keep (k nearest or everything
    /// within a radius); `params.checks` bounds the number of full
    /// distance computations for the approximate indices.
    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<(), SearchError>;

    /// Dimensionality of the indexed vectors.
    fn veclen(&self) -> usize;

    /// Number of indexed vectors.
    fn size(&self) -> usize;

    /// Approximate memory used by the index structure, in bytes
    /// (excluding the dataset, which the index does not own).
    fn used_memory(&self) -> usize;

    fn algorithm(&self) -> Algorithm;

    /// The distance function captured when the index was built.
    fn distance(&self) -> Distance;

    /// The `k` nearest neighbors of `query`, ascending by distance.
    fn knn(
        &self,
        query: &[f32],
        k: usize,
        params: &SearchParams,
    ) -> Result<Vec<Neighbor>, SearchError> {
        let mut result = KnnResultSet::new(k);
        self.find_neighbors(&mut result, query, params)?;
        Ok(result.into_neighbors())
    }

    /// Every point within `radius` of `query`, in discovery order.
    ///
    /// The radius is caller-facing (Euclidean units under the default
    /// metric); it is converted into the metric's accumulated space, so
    /// the reported distances compare against e.g. `radius * radius`.
    fn radius_search(
        &self,
        query: &[f32],
        radius: f32,
        params: &SearchParams,
    ) -> Result<Vec<Neighbor>, SearchError> {
        let mut result = RadiusResultSet::new(self.distance().metric_radius(radius));
        self.find_neighbors(&mut result, query, params)?;
        Ok(result.into_neighbors())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_round_trip() {
        for algo in [
            Algorithm::Linear,
            Algorithm::KdTree,
            Algorithm::KMeans,
            Algorithm::Composite,
            Algorithm::VpTree,
        ] {
            assert_eq!(algo.name().parse::<Algorithm>().unwrap(), algo);
        }
    }

    #[test]
    fn test_unknown_algorithm() {
        assert!(matches!(
            "ballpark".parse::<Algorithm>(),
            Err(BuildError::UnknownAlgorithm(_))
        ));
    }
}
