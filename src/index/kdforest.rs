//! Randomized k-d forest.
//!
//! An ensemble of T randomized k-d trees built over the same dataset.
//! Each split picks its dimension at random among the highest-variance
//! dimensions of a bounded sample, so the trees decorrelate and a query
//! can pool candidate leaves from all of them. The query runs a
//! best-bin-first descent: unexplored subtrees wait in a priority queue
//! keyed by a lower bound on their distance to the query, and a shared
//! visited set keeps the trees from re-scoring the same point.

use crate::dataset::Dataset;
use crate::distance::Distance;
use crate::error::{BuildError, SearchError};
use crate::index::traits::{Algorithm, NnIndex};
use crate::params::{build_rng, Params, SearchParams};
use crate::results::ResultSet;
use crate::search::{ScratchPool, SearchScratch};
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use std::cmp::Ordering;

/// Points sampled per split to estimate dimension means and variances.
const MEAN_SAMPLE: usize = 100;
/// The split dimension is drawn among this many top-variance dimensions.
const TOP_VARIANCE_DIMS: usize = 5;

/// Build-time configuration for the forest.
#[derive(Debug, Clone, Copy)]
pub struct KdTreeParams {
    /// Number of randomized trees.
    pub trees: usize,
}

impl Default for KdTreeParams {
    fn default() -> Self {
        Self { trees: 4 }
    }
}

impl KdTreeParams {
    pub fn from_params(params: &Params) -> Result<Self, BuildError> {
        let trees = params.get_int("trees", 4)?;
        if trees < 1 {
            return Err(BuildError::InvalidParameter(format!(
                "trees must be at least 1, got {trees}"
            )));
        }
        Ok(Self {
            trees: trees as usize,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum KdNode {
    Leaf {
        point: u32,
    },
    Split {
        div_feat: u32,
        div_val: f32,
        low: u32,
        high: u32,
    },
}

pub struct KdForest<'a> {
    data: Dataset<'a>,
    dist: Distance,
    /// All trees share one node arena; `roots` holds one entry per tree.
    nodes: Vec<KdNode>,
    roots: Vec<u32>,
    pool: ScratchPool,
}

impl<'a> KdForest<'a> {
    pub fn build(data: Dataset<'a>, params: &Params) -> Result<Self, BuildError> {
        let config = KdTreeParams::from_params(params)?;
        if data.is_empty() {
            return Err(BuildError::EmptyDataset);
        }
        let mut rng = build_rng(params)?;

        let n = data.rows();
        let mut nodes = Vec::new();
        let mut roots = Vec::with_capacity(config.trees);
        let mut vind: Vec<u32> = Vec::with_capacity(n);
        for _ in 0..config.trees {
            vind.clear();
            vind.extend(0..n as u32);
            roots.push(build_tree(data, &mut nodes, &mut vind, &mut rng));
        }
        debug!(
            "kd-forest built: {} trees, {} nodes over {} points",
            config.trees,
            nodes.len(),
            n
        );

        Ok(Self {
            data,
            dist: Distance::from_global(),
            nodes,
            roots,
            pool: ScratchPool::new(n),
        })
    }

    /// Descend from `node` to a leaf, scoring the leaf point and queueing
    /// the far side of every split passed on the way down.
    fn descend(
        &self,
        mut node: u32,
        scratch: &mut SearchScratch,
        result: &mut dyn ResultSet,
        query: &[f32],
    ) {
        loop {
            match self.nodes[node as usize] {
                KdNode::Leaf { point } => {
                    if !scratch.visited.visit(point as usize) {
                        let worst = result.worst_dist();
                        let d = self.dist.distance(self.data.row(point as usize), query, worst);
                        result.add_point(d, point as usize);
                        scratch.checks += 1;
                    }
                    return;
                }
                KdNode::Split {
                    div_feat,
                    div_val,
                    low,
                    high,
                } => {
                    let q = query[div_feat as usize];
                    let (near, far) = if q < div_val { (low, high) } else { (high, low) };
                    scratch.queue.push(self.dist.ground(q, div_val), far);
                    node = near;
                }
            }
        }
    }

    /// Best-bin-first search driving `result` from an externally owned
    /// scratch; the composite index shares one scratch (and thus one
    /// checks budget and visited set) between its two sub-indices.
    pub(crate) fn search_with(
        &self,
        scratch: &mut SearchScratch,
        result: &mut dyn ResultSet,
        query: &[f32],
        max_checks: usize,
    ) {
        scratch.queue.clear();
        for &root in &self.roots {
            self.descend(root, scratch, result, query);
        }
        while scratch.checks < max_checks {
            let Some(branch) = scratch.queue.pop() else {
                break;
            };
            // Strictly greater: a branch whose bound equals the current
            // worst can still hold a point exactly on a radius boundary.
            if branch.key > result.worst_dist() {
                break;
            }
            self.descend(branch.node, scratch, result, query);
        }
    }
}

impl NnIndex for KdForest<'_> {
    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet,
        query: &[f32],
        params: &SearchParams,
    ) -> Result<(), SearchError> {
        if query.len() != self.data.cols() {
            return Err(SearchError::DimensionMismatch {
                expected: self.data.cols(),
                got: query.len(),
            });
        }
        let mut scratch = self.pool.get();
        self.search_with(&mut scratch, result, query, params.max_checks());
        Ok(())
    }

    fn veclen(&self) -> usize {
        self.data.cols()
    }

    fn size(&self) -> usize {
        self.data.rows()
    }

    fn used_memory(&self) -> usize {
        self.nodes.len() * std::mem::size_of::<KdNode>()
            + self.roots.len() * std::mem::size_of::<u32>()
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::KdTree
    }

    fn distance(&self) -> Distance {
        self.dist
    }
}

/// Build one tree over `vind`, partitioning it in place. Uses an
/// explicit work stack so pathological datasets cannot overflow the
/// control stack.
fn build_tree(
    data: Dataset<'_>,
    nodes: &mut Vec<KdNode>,
    vind: &mut [u32],
    rng: &mut StdRng,
) -> u32 {
    let root = nodes.len() as u32;
    nodes.push(KdNode::Leaf { point: 0 });

    let mut stack: Vec<(u32, usize, usize)> = vec![(root, 0, vind.len())];
    while let Some((slot, start, end)) = stack.pop() {
        if end - start <= 1 {
            nodes[slot as usize] = KdNode::Leaf { point: vind[start] };
            continue;
        }
        let (div_feat, div_val, split) = plane_split(data, &mut vind[start..end], rng);
        let mid = start + split;

        let low = nodes.len() as u32;
        nodes.push(KdNode::Leaf { point: 0 });
        let high = nodes.len() as u32;
        nodes.push(KdNode::Leaf { point: 0 });
        nodes[slot as usize] = KdNode::Split {
            div_feat,
            div_val,
            low,
            high,
        };
        stack.push((low, start, mid));
        stack.push((high, mid, end));
    }
    root
}

/// Choose a split for `subset` and partition it in place.
///
/// Returns the split dimension, the threshold, and the number of points
/// on the low side. Both sides are guaranteed non-empty: an empty side
/// falls back to the median value of the dimension, and a constant
/// dimension falls back to a positional split.
fn plane_split(data: Dataset<'_>, subset: &mut [u32], rng: &mut StdRng) -> (u32, f32, usize) {
    let size = subset.len();
    let cols = data.cols();
    let sample_n = size.min(MEAN_SAMPLE);
    let sample = rand::seq::index::sample(rng, size, sample_n).into_vec();

    let mut mean = vec![0.0f32; cols];
    for &s in &sample {
        for (m, &v) in mean.iter_mut().zip(data.row(subset[s] as usize)) {
            *m += v;
        }
    }
    for m in &mut mean {
        *m /= sample_n as f32;
    }

    let mut var = vec![0.0f32; cols];
    for &s in &sample {
        for (j, &v) in data.row(subset[s] as usize).iter().enumerate() {
            let d = v - mean[j];
            var[j] += d * d;
        }
    }

    // Rank dimensions by variance, ties by index for determinism.
    let mut dims: Vec<usize> = (0..cols).collect();
    dims.sort_unstable_by(|&a, &b| {
        var[b]
            .partial_cmp(&var[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    let top = TOP_VARIANCE_DIMS.min(cols);
    let div_feat = dims[rng.gen_range(0..top)];
    let mut div_val = mean[div_feat];

    let mut split = partition_below(data, subset, div_feat, div_val);
    if split == 0 || split == size {
        let mut vals: Vec<f32> = subset
            .iter()
            .map(|&i| data.row(i as usize)[div_feat])
            .collect();
        vals.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        div_val = vals[size / 2];
        split = partition_below(data, subset, div_feat, div_val);
        if split == 0 || split == size {
            split = size / 2;
        }
    }
    (div_feat as u32, div_val, split)
}

/// Move points with `value < val` on `feat` to the front; returns how many.
fn partition_below(data: Dataset<'_>, subset: &mut [u32], feat: usize, val: f32) -> usize {
    let mut left = 0;
    for i in 0..subset.len() {
        if data.row(subset[i] as usize)[feat] < val {
            subset.swap(i, left);
            left += 1;
        }
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::linear::LinearIndex;
    use rand::SeedableRng;

    fn random_data(n: usize, d: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * d).map(|_| rng.gen::<f32>()).collect()
    }

    #[test]
    fn test_exact_search_matches_linear() {
        let buf = random_data(200, 6, 11);
        let data = Dataset::new(200, 6, &buf).unwrap();
        let params = Params::new().with("trees", 4).with("seed", 1);
        let forest = KdForest::build(data, &params).unwrap();
        let oracle = LinearIndex::build(data).unwrap();

        let query: Vec<f32> = random_data(1, 6, 99);
        let exact = SearchParams::exact();
        let got = forest.knn(&query, 5, &exact).unwrap();
        let want = oracle.knn(&query, 5, &exact).unwrap();

        for (g, w) in got.iter().zip(&want) {
            assert!((g.distance - w.distance).abs() < 1e-6);
        }
    }

    #[test]
    fn test_budget_caps_work() {
        let buf = random_data(500, 4, 3);
        let data = Dataset::new(500, 4, &buf).unwrap();
        let params = Params::new().with("trees", 2).with("seed", 1);
        let forest = KdForest::build(data, &params).unwrap();

        let got = forest.knn(&[0.5; 4], 3, &SearchParams::new(8)).unwrap();
        assert_eq!(got.len(), 3);
        let dists: Vec<f32> = got.iter().map(|n| n.distance).collect();
        assert!(dists.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_seeded_build_is_deterministic() {
        let buf = random_data(128, 5, 7);
        let data = Dataset::new(128, 5, &buf).unwrap();
        let params = Params::new().with("trees", 4).with("seed", 9);

        let a = KdForest::build(data, &params).unwrap();
        let b = KdForest::build(data, &params).unwrap();
        let query = [0.3, 0.8, 0.1, 0.5, 0.9];
        let search = SearchParams::new(16);
        assert_eq!(a.knn(&query, 4, &search).unwrap(), b.knn(&query, 4, &search).unwrap());
    }

    #[test]
    fn test_single_point_dataset() {
        let buf = vec![1.0, 2.0];
        let data = Dataset::new(1, 2, &buf).unwrap();
        let forest = KdForest::build(data, &Params::new()).unwrap();
        let got = forest.knn(&[0.0, 0.0], 1, &SearchParams::exact()).unwrap();
        assert_eq!(got[0].index, 0);
        assert!((got[0].distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_dataset_builds() {
        let buf = vec![2.0f32; 64 * 3];
        let data = Dataset::new(64, 3, &buf).unwrap();
        let forest = KdForest::build(data, &Params::new().with("seed", 4)).unwrap();
        let got = forest.knn(&[2.0, 2.0, 2.0], 4, &SearchParams::exact()).unwrap();
        assert_eq!(got.len(), 4);
        assert!(got.iter().all(|n| n.distance == 0.0));
    }

    #[test]
    fn test_rejects_zero_trees() {
        let buf = vec![0.0; 4];
        let data = Dataset::new(2, 2, &buf).unwrap();
        assert!(KdForest::build(data, &Params::new().with("trees", 0)).is_err());
    }
}
