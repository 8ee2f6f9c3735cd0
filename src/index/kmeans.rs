//! Hierarchical k-means tree.
//!
//! The dataset is partitioned recursively by B-way k-means. Interior
//! nodes carry their cluster centroid, the radius of the cluster (the
//! farthest descendant), its variance, and its size; leaves reference a
//! contiguous range of reordered point ids. Queries descend toward the
//! closest centroid and queue sibling clusters with a boundary lower
//! bound, optionally biased toward large or noisy clusters through the
//! `cb_index` weight.

use crate::dataset::Dataset;
use crate::distance::Distance;
use crate::error::{BuildError, SearchError};
use crate::index::traits::{Algorithm, NnIndex};
use crate::params::{build_rng, Params, SearchParams};
use crate::results::ResultSet;
use crate::search::{ScratchPool, SearchScratch};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::Rng;
use std::cmp::Ordering;

/// Strategy for choosing the initial cluster centers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentersInit {
    /// Uniform sample without replacement.
    Random,
    /// Farthest-point traversal from a random start.
    Gonzales,
    /// D^2-weighted sampling (k-means++).
    KmeansPp,
}

impl std::str::FromStr for CentersInit {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(CentersInit::Random),
            "gonzales" => Ok(CentersInit::Gonzales),
            "kmeanspp" => Ok(CentersInit::KmeansPp),
            other => Err(BuildError::InvalidParameter(format!(
                "unknown centers-init: {other}"
            ))),
        }
    }
}

/// Build-time configuration for the k-means tree.
#[derive(Debug, Clone, Copy)]
pub struct KMeansParams {
    /// Fan-out of each interior node.
    pub branching: usize,
    /// Lloyd iteration cap; negative means iterate until stable.
    pub max_iterations: i32,
    pub centers_init: CentersInit,
    /// Cluster-boundary weight used by the approximate search.
    pub cb_index: f32,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            branching: 32,
            max_iterations: 11,
            centers_init: CentersInit::Random,
            cb_index: 0.4,
        }
    }
}

impl KMeansParams {
    pub fn from_params(params: &Params) -> Result<Self, BuildError> {
        let branching = params.get_int("branching", 32)?;
        if branching < 2 {
            return Err(BuildError::InvalidParameter(format!(
                "branching must be at least 2, got {branching}"
            )));
        }
        let max_iterations = params.get_int("max-iterations", 11)? as i32;
        let centers_init = params.get_str("centers-init", "random")?.parse()?;
        let mut cb_index = params.get_float("cb_index", 0.4)? as f32;
        if !(0.0..=1.0).contains(&cb_index) {
            warn!("cb_index {cb_index} outside [0, 1], clamping");
            cb_index = cb_index.clamp(0.0, 1.0);
        }
        Ok(Self {
            branching: branching as usize,
            max_iterations,
            centers_init,
            cb_index,
        })
    }
}

#[derive(Debug)]
struct KMeansNode {
    /// Cluster centroid.
    pivot: Vec<f32>,
    /// Distance from the pivot to the farthest descendant.
    radius: f32,
    /// Mean distance from the pivot to the descendants.
    variance: f32,
    size: u32,
    /// Child node slots; empty marks a leaf.
    children: Vec<u32>,
    /// Range of descendant point ids in `vind`.
    start: u32,
    end: u32,
}

impl KMeansNode {
    fn with_pivot(pivot: Vec<f32>) -> Self {
        Self {
            pivot,
            radius: 0.0,
            variance: 0.0,
            size: 0,
            children: Vec::new(),
            start: 0,
            end: 0,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

pub struct KMeansTree<'a> {
    data: Dataset<'a>,
    dist: Distance,
    nodes: Vec<KMeansNode>,
    /// Point ids reordered so every node's descendants are contiguous.
    vind: Vec<u32>,
    root: u32,
    cb_index: f32,
    pool: ScratchPool,
}

impl<'a> KMeansTree<'a> {
    pub fn build(data: Dataset<'a>, params: &Params) -> Result<Self, BuildError> {
        let config = KMeansParams::from_params(params)?;
        if data.is_empty() {
            return Err(BuildError::EmptyDataset);
        }
        let mut rng = build_rng(params)?;
        let dist = Distance::from_global();

        let n = data.rows();
        let mut vind: Vec<u32> = (0..n as u32).collect();
        let mut nodes = Vec::new();
        nodes.push(KMeansNode::with_pivot(mean_vector(data, &vind)));

        let mut stack: Vec<(u32, usize, usize)> = vec![(0, 0, n)];
        while let Some((slot, start, end)) = stack.pop() {
            build_node(
                data, &dist, &config, &mut rng, &mut nodes, &mut vind, &mut stack, slot, start,
                end,
            );
        }
        debug!(
            "k-means tree built: branching {}, {} nodes over {} points",
            config.branching,
            nodes.len(),
            n
        );

        Ok(Self {
            data,
            dist,
            nodes,
            vind,
            root: 0,
            cb_index: config.cb_index,
            pool: ScratchPool::new(n),
        })
    }

    /// Extract up to `count` cluster centers by greedily expanding the
    /// highest-variance interior node until the budget is reached.
    ///
    /// Returns fewer centers when the tree bottoms out first.
    pub fn cluster_centers(&self, count: usize) -> Vec<Vec<f32>> {
        let mut frontier: Vec<u32> = vec![self.root];
        while frontier.len() < count {
            let mut best: Option<(usize, f32)> = None;
            for (pos, &id) in frontier.iter().enumerate() {
                let node = &self.nodes[id as usize];
                if node.is_leaf() || frontier.len() - 1 + node.children.len() > count {
                    continue;
                }
                if best.map_or(true, |(_, v)| node.variance > v) {
                    best = Some((pos, node.variance));
                }
            }
            let Some((pos, _)) = best else { break };
            let id = frontier.remove(pos);
            frontier.extend_from_slice(&self.nodes[id as usize].children);
        }
        frontier
            .iter()
            .map(|&id| self.nodes[id as usize].pivot.clone())
            .collect()
    }

    fn score_leaf(
        &self,
        node: &KMeansNode,
        scratch: &mut SearchScratch,
        result: &mut dyn ResultSet,
        query: &[f32],
    ) {
        for &p in &self.vind[node.start as usize..node.end as usize] {
            if !scratch.visited.visit(p as usize) {
                let worst = result.worst_dist();
                let d = self.dist.distance(self.data.row(p as usize), query, worst);
                result.add_point(d, p as usize);
                scratch.checks += 1;
            }
        }
    }

    /// Lower bound for an unexplored sibling cluster at domain distance `d`.
    fn branch_key(&self, d: f32, child: u32) -> f32 {
        let node = &self.nodes[child as usize];
        let mut key = (d - node.radius).max(0.0);
        if self.cb_index > 0.0 {
            let dim = self.data.cols() as f32;
            key -= self.cb_index * node.variance * (node.size as f32).powf(2.0 / dim);
        }
        key
    }

    /// Descend toward the closest centroid, queueing the siblings.
    fn descend(
        &self,
        mut node: u32,
        scratch: &mut SearchScratch,
        result: &mut dyn ResultSet,
        query: &[f32],
    ) {
        loop {
            let current = &self.nodes[node as usize];
            if current.is_leaf() {
                self.score_leaf(current, scratch, result, query);
                return;
            }
            let mut dists = Vec::with_capacity(current.children.len());
            for &c in &current.children {
                dists.push(
                    self.dist
                        .distance(query, &self.nodes[c as usize].pivot, f32::INFINITY),
                );
            }
            let best = dists
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0);
            for (i, &c) in current.children.iter().enumerate() {
                if i != best {
                    scratch.queue.push(self.branch_key(dists[i], c), c);
                }
            }
            node = current.children[best];
        }
    }

    /// Exact descent used for unlimited-checks queries: children visited
    /// in order of centroid distance, subtrees pruned with the
    /// triangle-inequality test in the accumulated (squared) domain.
    fn find_exact(
        &self,
        node: u32,
        scratch: &mut SearchScratch,
        result: &mut dyn ResultSet,
        query: &[f32],
    ) {
        let current = &self.nodes[node as usize];
        let d = self
            .dist
            .distance(query, &current.pivot, f32::INFINITY);
        let worst = result.worst_dist();
        if worst.is_finite() {
            let val = d - current.radius - worst;
            if val > 0.0 && val * val > 4.0 * current.radius * worst {
                return;
            }
        }
        if current.is_leaf() {
            self.score_leaf(current, scratch, result, query);
            return;
        }
        let mut order: Vec<(f32, u32)> = current
            .children
            .iter()
            .map(|&c| {
                (
                    self.dist
                        .distance(query, &self.nodes[c as usize].pivot, f32::INFINITY),
                    c,
                )
            })
            .collect();
        order.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        for (_, c) in order {
            self.find_exact(c, scratch, result, query);
        }
    }

    /// Search driving `result` from an externally owned scratch; shared
    /// with the composite index so budget and visited set can span both
    /// of its sub-indices.
    pub(crate) fn search_with(
        &self,
        scratch: &mut SearchScratch,
        result: &mut dyn ResultSet,
        query: &[f32],
        max_checks: usize,
    ) {
        if max_checks == usize::MAX {
            self.find_exact(self.root, scratch, result, query);
            return;
        }
        scratch.queue.clear();
        self.descend(self.root, scratch, result, query);
        while scratch.checks < max_checks {
            let Some(branch) = scratch.queue.pop() else {
                break;
            };
            // Strictly greater, matching the k-d forest loop: an equal
            // bound can still hold a boundary point.
            if branch.key > result.worst_dist() {
                break;
            }
            self.descend(branch.node, scratch, result, query);
        }
    }
}

impl NnIndex for KMeansTree<'_> {
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
        let per_node = std::mem::size_of::<KMeansNode>()
            + self.data.cols() * std::mem::size_of::<f32>();
        self.nodes.len() * per_node
            + self.nodes.iter().map(|n| n.children.len() * 4).sum::<usize>()
            + self.vind.len() * std::mem::size_of::<u32>()
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::KMeans
    }

    fn distance(&self) -> Distance {
        self.dist
    }
}

fn mean_vector(data: Dataset<'_>, subset: &[u32]) -> Vec<f32> {
    let mut mean = vec![0.0f32; data.cols()];
    for &p in subset {
        for (m, &v) in mean.iter_mut().zip(data.row(p as usize)) {
            *m += v;
        }
    }
    for m in &mut mean {
        *m /= subset.len() as f32;
    }
    mean
}

/// Radius (max distance to pivot) and variance (mean distance to pivot).
fn node_stats(data: Dataset<'_>, dist: &Distance, pivot: &[f32], subset: &[u32]) -> (f32, f32) {
    let mut radius = 0.0f32;
    let mut sum = 0.0f32;
    for &p in subset {
        let d = dist.distance(pivot, data.row(p as usize), f32::INFINITY);
        radius = radius.max(d);
        sum += d;
    }
    (radius, sum / subset.len() as f32)
}

/// Process one node: record its stats, then either finish it as a leaf
/// or cluster its range and push the children onto the work stack.
#[allow(clippy::too_many_arguments)]
fn build_node(
    data: Dataset<'_>,
    dist: &Distance,
    config: &KMeansParams,
    rng: &mut StdRng,
    nodes: &mut Vec<KMeansNode>,
    vind: &mut [u32],
    stack: &mut Vec<(u32, usize, usize)>,
    slot: u32,
    start: usize,
    end: usize,
) {
    let size = end - start;
    let pivot = std::mem::take(&mut nodes[slot as usize].pivot);
    let (radius, variance) = node_stats(data, dist, &pivot, &vind[start..end]);
    {
        let node = &mut nodes[slot as usize];
        node.pivot = pivot;
        node.radius = radius;
        node.variance = variance;
        node.size = size as u32;
        node.start = start as u32;
        node.end = end as u32;
    }
    if size <= config.branching {
        return;
    }

    let subset: Vec<u32> = vind[start..end].to_vec();
    let seeds = initial_centers(config.centers_init, data, dist, &subset, config.branching, rng);
    if seeds.len() < 2 {
        return;
    }

    let mut centers: Vec<Vec<f32>> = seeds
        .iter()
        .map(|&p| data.row(p as usize).to_vec())
        .collect();
    let assign = lloyd(data, dist, &subset, &mut centers, config.max_iterations);

    let mut counts = vec![0usize; centers.len()];
    for &a in &assign {
        counts[a] += 1;
    }
    let live: Vec<usize> = (0..centers.len()).filter(|&c| counts[c] > 0).collect();
    if live.len() < 2 {
        return;
    }

    // Reorder the range so each cluster's points are contiguous.
    let mut reordered = Vec::with_capacity(size);
    let mut ranges = Vec::with_capacity(live.len());
    for &c in &live {
        let cstart = start + reordered.len();
        for (i, &p) in subset.iter().enumerate() {
            if assign[i] == c {
                reordered.push(p);
            }
        }
        ranges.push((cstart, start + reordered.len()));
    }
    vind[start..end].copy_from_slice(&reordered);

    let mut children = Vec::with_capacity(live.len());
    for (pos, &c) in live.iter().enumerate() {
        let child = nodes.len() as u32;
        nodes.push(KMeansNode::with_pivot(std::mem::take(&mut centers[c])));
        children.push(child);
        let (cstart, cend) = ranges[pos];
        stack.push((child, cstart, cend));
    }
    nodes[slot as usize].children = children;
}

/// Lloyd iterations over `subset`; returns the final assignment.
///
/// Iterates until assignments are stable or the cap is hit; a negative
/// cap means until stable. Centers of clusters that lose all points are
/// left in place for the next round; permanently empty clusters are
/// dropped by the caller.
fn lloyd(
    data: Dataset<'_>,
    dist: &Distance,
    subset: &[u32],
    centers: &mut [Vec<f32>],
    max_iterations: i32,
) -> Vec<usize> {
    let k = centers.len();
    let mut assign = vec![usize::MAX; subset.len()];
    let mut sums = vec![vec![0.0f32; data.cols()]; k];
    let mut counts = vec![0usize; k];
    let mut iteration = 0;

    loop {
        let mut changed = false;
        for (i, &p) in subset.iter().enumerate() {
            let row = data.row(p as usize);
            let mut best = 0;
            let mut best_d = f32::INFINITY;
            for (c, center) in centers.iter().enumerate() {
                let d = dist.distance(row, center, best_d);
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            if assign[i] != best {
                assign[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        if max_iterations >= 0 && iteration >= max_iterations {
            break;
        }

        for s in &mut sums {
            s.fill(0.0);
        }
        counts.fill(0);
        for (i, &p) in subset.iter().enumerate() {
            counts[assign[i]] += 1;
            for (s, &v) in sums[assign[i]].iter_mut().zip(data.row(p as usize)) {
                *s += v;
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                for (dst, &s) in centers[c].iter_mut().zip(&sums[c]) {
                    *dst = s / counts[c] as f32;
                }
            }
        }
        iteration += 1;
    }
    assign
}

/// Choose up to `k` distinct seed points from `subset`.
fn initial_centers(
    init: CentersInit,
    data: Dataset<'_>,
    dist: &Distance,
    subset: &[u32],
    k: usize,
    rng: &mut StdRng,
) -> Vec<u32> {
    let k = k.min(subset.len());
    match init {
        CentersInit::Random => rand::seq::index::sample(rng, subset.len(), k)
            .into_vec()
            .into_iter()
            .map(|i| subset[i])
            .collect(),
        CentersInit::Gonzales => farthest_point_centers(data, dist, subset, k, rng),
        CentersInit::KmeansPp => dsq_weighted_centers(data, dist, subset, k, rng),
    }
}

fn farthest_point_centers(
    data: Dataset<'_>,
    dist: &Distance,
    subset: &[u32],
    k: usize,
    rng: &mut StdRng,
) -> Vec<u32> {
    let first = subset[rng.gen_range(0..subset.len())];
    let mut chosen = vec![first];
    let mut closest: Vec<f32> = subset
        .iter()
        .map(|&p| dist.distance(data.row(first as usize), data.row(p as usize), f32::INFINITY))
        .collect();

    while chosen.len() < k {
        let (next, &far) = closest
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
            .expect("non-empty subset");
        if far <= 0.0 {
            break; // every remaining point duplicates a chosen center
        }
        let point = subset[next];
        chosen.push(point);
        for (c, &p) in closest.iter_mut().zip(subset) {
            let d = dist.distance(data.row(point as usize), data.row(p as usize), *c);
            if d < *c {
                *c = d;
            }
        }
    }
    chosen
}

fn dsq_weighted_centers(
    data: Dataset<'_>,
    dist: &Distance,
    subset: &[u32],
    k: usize,
    rng: &mut StdRng,
) -> Vec<u32> {
    let first = subset[rng.gen_range(0..subset.len())];
    let mut chosen = vec![first];
    let mut closest: Vec<f32> = subset
        .iter()
        .map(|&p| dist.distance(data.row(first as usize), data.row(p as usize), f32::INFINITY))
        .collect();

    while chosen.len() < k {
        let total: f32 = closest.iter().sum();
        if total <= 0.0 {
            break;
        }
        let mut target = rng.gen::<f32>() * total;
        // Fall back to the farthest point if rounding walks off the end.
        let mut next = closest
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        for (i, &c) in closest.iter().enumerate() {
            if target < c {
                next = i;
                break;
            }
            target -= c;
        }
        let point = subset[next];
        chosen.push(point);
        for (c, &p) in closest.iter_mut().zip(subset) {
            let d = dist.distance(data.row(point as usize), data.row(p as usize), *c);
            if d < *c {
                *c = d;
            }
        }
    }
    chosen
}
