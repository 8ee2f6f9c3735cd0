//! Vantage-point tree.
//!
//! A binary metric tree: each node picks a vantage point at random and
//! splits the remaining points at the median distance from it. Queries
//! prune whole subtrees with the metric-ball test against the current
//! worst result distance, which tightens as the result set fills. There
//! is no checks budget; every branch that survives the pruning test is
//! explored.

use crate::dataset::Dataset;
use crate::distance::Distance;
use crate::error::{BuildError, SearchError};
use crate::index::traits::{Algorithm, NnIndex};
use crate::params::{build_rng, Params, SearchParams};
use crate::results::ResultSet;
use log::debug;
use rand::Rng;
use std::cmp::Ordering;

/// Subsets at or below this size become leaves.
const LEAF_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy)]
enum VpNode {
    Leaf {
        start: u32,
        end: u32,
    },
    Split {
        vantage: u32,
        /// Median distance from the vantage to the rest of the subset.
        mu: f32,
        inner: u32,
        outer: u32,
    },
}

pub struct VpTree<'a> {
    data: Dataset<'a>,
    dist: Distance,
    nodes: Vec<VpNode>,
    vind: Vec<u32>,
    root: u32,
}

/// Work items of the iterative descent. A `Deferred` entry is the far
/// side of a split; its pruning test is re-evaluated when popped, by
/// which time the result set may have tightened.
enum Step {
    Visit(u32),
    Deferred {
        node: u32,
        dist_to_vantage: f32,
        mu: f32,
        outer_side: bool,
    },
}

impl<'a> VpTree<'a> {
    pub fn build(data: Dataset<'a>, params: &Params) -> Result<Self, BuildError> {
        if data.is_empty() {
            return Err(BuildError::EmptyDataset);
        }
        let mut rng = build_rng(params)?;
        let dist = Distance::from_global();

        let n = data.rows();
        let mut vind: Vec<u32> = (0..n as u32).collect();
        let mut nodes = Vec::new();
        nodes.push(VpNode::Leaf { start: 0, end: 0 });

        let mut stack: Vec<(u32, usize, usize)> = vec![(0, 0, n)];
        let mut by_dist: Vec<(f32, u32)> = Vec::new();
        while let Some((slot, start, end)) = stack.pop() {
            let size = end - start;
            if size <= LEAF_CAPACITY {
                nodes[slot as usize] = VpNode::Leaf {
                    start: start as u32,
                    end: end as u32,
                };
                continue;
            }

            let vantage = vind[start + rng.gen_range(0..size)];
            by_dist.clear();
            for &p in &vind[start..end] {
                if p != vantage {
                    by_dist.push((
                        dist.distance(data.row(vantage as usize), data.row(p as usize), f32::INFINITY),
                        p,
                    ));
                }
            }
            by_dist.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            let mu = by_dist[by_dist.len() / 2].0;

            // Rewrite the range: vantage first, then inner (< mu), then
            // outer (>= mu).
            let inner_count = by_dist.partition_point(|&(d, _)| d < mu);
            vind[start] = vantage;
            for (offset, &(_, p)) in by_dist.iter().enumerate() {
                vind[start + 1 + offset] = p;
            }
            let inner_start = start + 1;
            let inner_end = inner_start + inner_count;

            let inner = nodes.len() as u32;
            nodes.push(VpNode::Leaf { start: 0, end: 0 });
            let outer = nodes.len() as u32;
            nodes.push(VpNode::Leaf { start: 0, end: 0 });
            nodes[slot as usize] = VpNode::Split {
                vantage,
                mu,
                inner,
                outer,
            };
            stack.push((inner, inner_start, inner_end));
            stack.push((outer, inner_end, end));
        }
        debug!("vp-tree built: {} nodes over {} points", nodes.len(), n);

        Ok(Self {
            data,
            dist,
            nodes,
            vind,
            root: 0,
        })
    }
}

impl NnIndex for VpTree<'_> {
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

        let mut stack = vec![Step::Visit(self.root)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(id) => match self.nodes[id as usize] {
                    VpNode::Leaf { start, end } => {
                        for &p in &self.vind[start as usize..end as usize] {
                            let worst = result.worst_dist();
                            let d = self.dist.distance(self.data.row(p as usize), query, worst);
                            result.add_point(d, p as usize);
                        }
                    }
                    VpNode::Split {
                        vantage,
                        mu,
                        inner,
                        outer,
                    } => {
                        let d = self.dist.distance(
                            self.data.row(vantage as usize),
                            query,
                            f32::INFINITY,
                        );
                        result.add_point(d, vantage as usize);
                        if d < mu {
                            stack.push(Step::Deferred {
                                node: outer,
                                dist_to_vantage: d,
                                mu,
                                outer_side: true,
                            });
                            stack.push(Step::Visit(inner));
                        } else {
                            stack.push(Step::Deferred {
                                node: inner,
                                dist_to_vantage: d,
                                mu,
                                outer_side: false,
                            });
                            stack.push(Step::Visit(outer));
                        }
                    }
                },
                Step::Deferred {
                    node,
                    dist_to_vantage,
                    mu,
                    outer_side,
                } => {
                    // The ball test only holds where the triangle
                    // inequality does, so compare in root space.
                    let d = self.dist.to_metric(dist_to_vantage);
                    let tau = self.dist.to_metric(result.worst_dist());
                    let split = self.dist.to_metric(mu);
                    let survives = if outer_side {
                        d + tau >= split
                    } else {
                        d - tau <= split
                    };
                    if survives {
                        stack.push(Step::Visit(node));
                    }
                }
            }
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
        self.nodes.len() * std::mem::size_of::<VpNode>()
            + self.vind.len() * std::mem::size_of::<u32>()
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::VpTree
    }

    fn distance(&self) -> Distance {
        self.dist
    }
}
