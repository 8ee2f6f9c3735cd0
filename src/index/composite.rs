//! Composite index: k-d forest plus k-means tree.
//!
//! Both sub-indices are built over the same dataset from their own
//! parameter blocks. A query runs the forest descent and then the
//! k-means descent into one result set, sharing a single checks budget
//! and visited set so the second descent spends its budget on points the
//! first one missed.

use crate::dataset::Dataset;
use crate::distance::Distance;
use crate::error::{BuildError, SearchError};
use crate::index::kdforest::KdForest;
use crate::index::kmeans::KMeansTree;
use crate::index::traits::{Algorithm, NnIndex};
use crate::params::{Params, SearchParams};
use crate::results::ResultSet;
use crate::search::ScratchPool;

pub struct CompositeIndex<'a> {
    forest: KdForest<'a>,
    kmeans: KMeansTree<'a>,
    pool: ScratchPool,
}

impl<'a> CompositeIndex<'a> {
    pub fn build(data: Dataset<'a>, params: &Params) -> Result<Self, BuildError> {
        let forest = KdForest::build(data, params)?;
        let kmeans = KMeansTree::build(data, params)?;
        Ok(Self {
            forest,
            kmeans,
            pool: ScratchPool::new(data.rows()),
        })
    }
}

impl NnIndex for CompositeIndex<'_> {
    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<(), SearchError> {
        if query.len() != self.veclen() {
            return Err(SearchError::DimensionMismatch {
                expected: self.veclen(),
                got: query.len(),
            });
        }
        let max_checks = params.max_checks();
        let mut scratch = self.pool.get();
        self.forest.search_with(&mut scratch, result, query, max_checks);
        self.kmeans.search_with(&mut scratch, result, query, max_checks);
        Ok(())
    }

    fn veclen(&self) -> usize {
        self.forest.veclen()
    }

    fn size(&self) -> usize {
        self.forest.size()
    }

    fn used_memory(&self) -> usize {
        self.forest.used_memory() + self.kmeans.used_memory()
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Composite
    }

    fn distance(&self) -> Distance {
        self.forest.distance()
    }
}
