//! Index implementations.
//!
//! Five families share the [`NnIndex`] surface:
//! - `linear`: exhaustive scan, exact, the correctness oracle
//! - `kdforest`: randomized k-d forest
//! - `kmeans`: hierarchical k-means tree
//! - `vptree`: vantage-point tree
//! - `composite`: k-d forest and k-means tree sharing one query budget

pub mod composite;
pub mod kdforest;
pub mod kmeans;
pub mod linear;
pub mod traits;
pub mod vptree;

pub use composite::CompositeIndex;
pub use kdforest::{KdForest, KdTreeParams};
pub use kmeans::{CentersInit, KMeansParams, KMeansTree};
pub use linear::LinearIndex;
pub use traits::{Algorithm, NnIndex};
pub use vptree::VpTree;

use crate::dataset::Dataset;
use crate::distance::Distance;
use crate::error::{BuildError, SearchError};
use crate::params::{Params, SearchParams};
use crate::results::ResultSet;

/// Any of the five index families, built and ready to query.
///
/// The factory returns this sum type so callers can hold indices of
/// different families uniformly without boxing.
pub enum AnyIndex<'a> {
    Linear(LinearIndex<'a>),
    KdForest(KdForest<'a>),
    KMeans(KMeansTree<'a>),
    Composite(CompositeIndex<'a>),
    VpTree(VpTree<'a>),
}

macro_rules! dispatch {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            AnyIndex::Linear($inner) => $body,
            AnyIndex::KdForest($inner) => $body,
            AnyIndex::KMeans($inner) => $body,
            AnyIndex::Composite($inner) => $body,
            AnyIndex::VpTree($inner) => $body,
        }
    };
}

impl NnIndex for AnyIndex<'_> {
    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<(), SearchError> {
        dispatch!(self, index => index.find_neighbors(result, query, params))
    }

    fn veclen(&self) -> usize {
        dispatch!(self, index => index.veclen())
    }

    fn size(&self) -> usize {
        dispatch!(self, index => index.size())
    }

    fn used_memory(&self) -> usize {
        dispatch!(self, index => index.used_memory())
    }

    fn algorithm(&self) -> Algorithm {
        dispatch!(self, index => index.algorithm())
    }

    fn distance(&self) -> Distance {
        dispatch!(self, index => index.distance())
    }
}

/// Build an index of the named family over `dataset`.
///
/// `algorithm` is one of `"linear"`, `"kdtree"`, `"kmeans"`,
/// `"composite"`, `"vptree"`; anything else fails with
/// [`BuildError::UnknownAlgorithm`]. Build-time options are read from
/// `params` with the documented defaults.
pub fn create_index<'a>(
    algorithm: &str,
    dataset: Dataset<'a>,
    params: &Params,
) -> Result<AnyIndex<'a>, BuildError> {
    let index = match algorithm.parse::<Algorithm>()? {
        Algorithm::Linear => AnyIndex::Linear(LinearIndex::build(dataset)?),
        Algorithm::KdTree => AnyIndex::KdForest(KdForest::build(dataset, params)?),
        Algorithm::KMeans => AnyIndex::KMeans(KMeansTree::build(dataset, params)?),
        Algorithm::Composite => AnyIndex::Composite(CompositeIndex::build(dataset, params)?),
        Algorithm::VpTree => AnyIndex::VpTree(VpTree::build(dataset, params)?),
    };
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_data(n: usize, d: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * d).map(|_| rng.gen::<f32>()).collect()
    }

    #[test]
    fn test_factory_builds_every_family() {
        let buf = random_data(120, 4, 55);
        let data = Dataset::new(120, 4, &buf).unwrap();
        let params = Params::new().with("seed", 1);

        for (name, algorithm) in [
            ("linear", Algorithm::Linear),
            ("kdtree", Algorithm::KdTree),
            ("kmeans", Algorithm::KMeans),
            ("composite", Algorithm::Composite),
            ("vptree", Algorithm::VpTree),
        ] {
            let index = create_index(name, data, &params).unwrap();
            assert_eq!(index.algorithm(), algorithm);
            assert_eq!(index.size(), 120);
            assert_eq!(index.veclen(), 4);

            let got = index.knn(&[0.5; 4], 3, &SearchParams::exact()).unwrap();
            assert_eq!(got.len(), 3, "{name}");
        }
    }

    #[test]
    fn test_factory_rejects_unknown_algorithm() {
        let buf = random_data(10, 2, 1);
        let data = Dataset::new(10, 2, &buf).unwrap();
        assert!(matches!(
            create_index("ballpark", data, &Params::new()),
            Err(BuildError::UnknownAlgorithm(_))
        ));
    }
}
