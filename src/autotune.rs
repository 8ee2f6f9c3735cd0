//! Index autotuning.
//!
//! Given a target recall and a weighting of build time, query time, and
//! memory, the autotuner picks an index family and its parameters by
//! cross-validating a fixed candidate grid on a sample of the dataset.
//! Every candidate is built on the sample, tuned to the smallest checks
//! budget that reaches the target, and scored by
//! `search_cost + build_weight * build_cost + memory_weight * memory_cost`
//! with the time costs normalized against the linear baseline.

use crate::dataset::Dataset;
use crate::error::BuildError;
use crate::eval::{compute_ground_truth, search_with_ground_truth, test_index_precision};
use crate::index::{create_index, LinearIndex, NnIndex};
use crate::params::{next_global_seed, Params, CHECKS_UNLIMITED};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::time::Instant;

/// Number of nearest neighbors used for recall measurement while tuning.
const TUNING_NN: usize = 10;
/// Below this sample size tuning is pointless; fall back to linear.
const MIN_SAMPLE: usize = 100;

/// Recorded when the target recall was not reachable; a warning, not an
/// error, per the autotuner contract.
#[derive(Debug, Clone, Copy)]
pub struct Shortfall {
    pub achieved: f32,
    pub target: f32,
}

/// Outcome of [`Autotuner::estimate_build_params`].
#[derive(Debug)]
pub struct Tuning {
    /// Winning algorithm and parameters, including the tuned `"checks"`.
    pub params: Params,
    /// Estimated linear-scan time divided by tuned query time.
    pub speedup: f32,
    pub shortfall: Option<Shortfall>,
}

/// Outcome of [`Autotuner::estimate_search_params`].
#[derive(Debug, Clone, Copy)]
pub struct SearchEstimate {
    pub checks: i32,
    pub precision: f32,
    pub speedup: f32,
}

pub struct Autotuner {
    build_weight: f32,
    memory_weight: f32,
    sample_fraction: f32,
    test_samples: usize,
}

impl Autotuner {
    pub fn new(
        build_weight: f32,
        memory_weight: f32,
        sample_fraction: f32,
    ) -> Result<Self, BuildError> {
        if build_weight < 0.0 {
            return Err(BuildError::InvalidParameter(format!(
                "build_weight must be non-negative, got {build_weight}"
            )));
        }
        if memory_weight < 0.0 {
            return Err(BuildError::InvalidParameter(format!(
                "memory_weight must be non-negative, got {memory_weight}"
            )));
        }
        if !(sample_fraction > 0.0 && sample_fraction <= 1.0) {
            return Err(BuildError::InvalidParameter(format!(
                "sample_fraction must be in (0, 1], got {sample_fraction}"
            )));
        }
        Ok(Self {
            build_weight,
            memory_weight,
            sample_fraction,
            test_samples: 1000,
        })
    }

    /// Override the size of the evaluation query set (default 1000).
    pub fn with_test_samples(mut self, n: usize) -> Self {
        self.test_samples = n.max(1);
        self
    }

    /// Pick an algorithm and build parameters for `dataset` that reach
    /// `target_precision` at the lowest weighted cost.
    ///
    /// The returned parameters carry `"algorithm"` and the tuned
    /// `"checks"`; feed them to [`create_index`] on the full dataset and
    /// refine the budget with [`Autotuner::estimate_search_params`].
    pub fn estimate_build_params(
        &self,
        dataset: Dataset<'_>,
        target_precision: f32,
    ) -> Result<Tuning, BuildError> {
        validate_target(target_precision)?;
        if dataset.is_empty() {
            return Err(BuildError::EmptyDataset);
        }

        let n = dataset.rows();
        let sample_n = (self.sample_fraction as f64 * n as f64) as usize;
        if sample_n < MIN_SAMPLE {
            info!("sample of {sample_n} rows is too small to tune; using linear search");
            let params = Params::new()
                .with("algorithm", "linear")
                .with("checks", CHECKS_UNLIMITED);
            return Ok(Tuning {
                params,
                speedup: 1.0,
                shortfall: None,
            });
        }

        let mut rng = StdRng::seed_from_u64(next_global_seed());

        // Tuning rows sampled without replacement; evaluation queries
        // sampled with replacement from the full dataset.
        let mut sample_ids = rand::seq::index::sample(&mut rng, n, sample_n).into_vec();
        sample_ids.sort_unstable();
        let mut sample_buf = Vec::with_capacity(sample_n * dataset.cols());
        for &i in &sample_ids {
            sample_buf.extend_from_slice(dataset.row(i));
        }
        let sample = Dataset::new(sample_n, dataset.cols(), &sample_buf)?;

        let test_n = self.test_samples.min(n);
        let mut test_buf = Vec::with_capacity(test_n * dataset.cols());
        for _ in 0..test_n {
            test_buf.extend_from_slice(dataset.row(rng.gen_range(0..n)));
        }
        let testset = Dataset::new(test_n, dataset.cols(), &test_buf)?;

        let nn = TUNING_NN.min(sample_n);
        let matches = compute_ground_truth(sample, testset, nn, 0)?;
        let oracle = LinearIndex::build(sample)?;
        let (_, linear_time) =
            search_with_ground_truth(&oracle, testset, &matches, nn, CHECKS_UNLIMITED, 0)?;
        let linear_time = linear_time.max(1e-9);

        struct Candidate {
            params: Params,
            checks: i32,
            precision: f32,
            search_time: f64,
            cost: f64,
        }
        let mut best: Option<Candidate> = None;
        let mut best_effort: Option<Candidate> = None;

        for mut candidate in candidate_grid() {
            candidate.set("seed", (rng.next_u64() >> 1) as i64);
            let algorithm = candidate.get_str("algorithm", "")?;

            let build_start = Instant::now();
            let index = create_index(&algorithm, sample, &candidate)?;
            let build_time = build_start.elapsed().as_secs_f64();

            let (checks, precision, search_time) =
                test_index_precision(&index, testset, &matches, nn, target_precision, 0)?;
            let memory_cost =
                (index.used_memory() + sample.mem_bytes()) as f64 / sample.mem_bytes() as f64;
            let cost = (search_time + self.build_weight as f64 * build_time) / linear_time
                + self.memory_weight as f64 * memory_cost;
            debug!(
                "candidate {algorithm} {candidate:?}: checks {checks}, precision {precision:.3}, cost {cost:.3}"
            );

            let entry = Candidate {
                params: candidate,
                checks,
                precision,
                search_time,
                cost,
            };
            if precision >= target_precision {
                if best.as_ref().map_or(true, |b| cost < b.cost) {
                    best = Some(entry);
                }
            } else if best_effort
                .as_ref()
                .map_or(true, |b| precision > b.precision)
            {
                best_effort = Some(entry);
            }
        }

        let (winner, shortfall) = match (best, best_effort) {
            (Some(b), _) => (b, None),
            (None, Some(b)) => {
                let shortfall = Shortfall {
                    achieved: b.precision,
                    target: target_precision,
                };
                warn!(
                    "no candidate reached precision {target_precision}; best effort {:.4}",
                    b.precision
                );
                (b, Some(shortfall))
            }
            (None, None) => {
                return Err(BuildError::InvalidParameter(
                    "candidate grid produced no evaluations".to_string(),
                ))
            }
        };

        let mut params = winner.params;
        params.set("checks", winner.checks);
        let speedup = (linear_time / winner.search_time.max(1e-9)) as f32;
        info!(
            "autotune winner: {} (checks {}, precision {:.4}, speedup {speedup:.1})",
            params.get_str("algorithm", "?")?,
            winner.checks,
            winner.precision
        );

        Ok(Tuning {
            params,
            speedup,
            shortfall,
        })
    }

    /// Tune the checks budget of a built index to `target_precision` on
    /// queries drawn from `dataset`, writing `"checks"` and `"speedup"`
    /// into `params`.
    ///
    /// Sweeps the budget geometrically until the target recall is
    /// bracketed, then interpolates between the bracketing pair.
    pub fn estimate_search_params(
        &self,
        index: &dyn NnIndex,
        dataset: Dataset<'_>,
        target_precision: f32,
        params: &mut Params,
    ) -> Result<SearchEstimate, BuildError> {
        validate_target(target_precision)?;
        if dataset.is_empty() {
            return Err(BuildError::EmptyDataset);
        }
        if index.algorithm() == crate::index::Algorithm::Linear {
            params.set("checks", CHECKS_UNLIMITED);
            params.set("speedup", 1.0f32);
            return Ok(SearchEstimate {
                checks: CHECKS_UNLIMITED,
                precision: 1.0,
                speedup: 1.0,
            });
        }

        let n = dataset.rows();
        let mut rng = StdRng::seed_from_u64(next_global_seed());
        let test_n = self.test_samples.min(n);
        let mut test_buf = Vec::with_capacity(test_n * dataset.cols());
        for _ in 0..test_n {
            test_buf.extend_from_slice(dataset.row(rng.gen_range(0..n)));
        }
        let testset = Dataset::new(test_n, dataset.cols(), &test_buf)?;

        // Queries are dataset rows, so the trivial self-match is skipped.
        let nn = TUNING_NN.min(n.saturating_sub(1)).max(1);
        let matches = compute_ground_truth(dataset, testset, nn, 1)?;
        let oracle = LinearIndex::build(dataset)?;
        let (_, linear_time) =
            search_with_ground_truth(&oracle, testset, &matches, nn, CHECKS_UNLIMITED, 1)?;

        let cap = n as i32;
        let mut below: Option<(i32, f32)> = None;
        let mut checks = 1i32;
        let (mut hi_precision, mut hi_time);
        loop {
            let (p, t) = search_with_ground_truth(index, testset, &matches, nn, checks, 1)?;
            if p >= target_precision {
                hi_precision = p;
                hi_time = t;
                break;
            }
            if checks >= cap {
                warn!(
                    "target precision {target_precision} unreachable; {p:.4} at checks {checks}"
                );
                let speedup = (linear_time / t.max(1e-9)) as f32;
                params.set("checks", checks);
                params.set("speedup", speedup);
                return Ok(SearchEstimate {
                    checks,
                    precision: p,
                    speedup,
                });
            }
            below = Some((checks, p));
            checks = (checks * 2).min(cap);
        }

        // Interpolate inside the bracketing pair and re-measure there.
        if let Some((lo_checks, lo_precision)) = below {
            let span = (checks - lo_checks) as f32;
            let frac = (target_precision - lo_precision) / (hi_precision - lo_precision).max(1e-6);
            let mid = lo_checks + (frac * span).ceil() as i32;
            let mid = mid.clamp(lo_checks + 1, checks);
            if mid < checks {
                let (p, t) = search_with_ground_truth(index, testset, &matches, nn, mid, 1)?;
                if p >= target_precision {
                    checks = mid;
                    hi_precision = p;
                    hi_time = t;
                }
            }
        }

        let speedup = (linear_time / hi_time.max(1e-9)) as f32;
        params.set("checks", checks);
        params.set("speedup", speedup);
        info!(
            "search params tuned: checks {checks}, precision {hi_precision:.4}, speedup {speedup:.1}"
        );
        Ok(SearchEstimate {
            checks,
            precision: hi_precision,
            speedup,
        })
    }
}

fn validate_target(target: f32) -> Result<(), BuildError> {
    if target > 0.0 && target <= 1.0 {
        Ok(())
    } else {
        Err(BuildError::InvalidParameter(format!(
            "target precision must be in (0, 1], got {target}"
        )))
    }
}

/// The fixed candidate grid: five forest sizes and every combination of
/// k-means branching, iteration cap, and center initialization.
fn candidate_grid() -> Vec<Params> {
    let mut grid = Vec::new();
    for &trees in &[1i64, 4, 8, 16, 32] {
        grid.push(
            Params::new()
                .with("algorithm", "kdtree")
                .with("trees", trees),
        );
    }
    for &branching in &[16i64, 32, 64, 128, 256] {
        for &iterations in &[1i64, 5, 10, 15] {
            for init in ["random", "gonzales", "kmeanspp"] {
                grid.push(
                    Params::new()
                        .with("algorithm", "kmeans")
                        .with("branching", branching)
                        .with("max-iterations", iterations)
                        .with("centers-init", init),
                );
            }
        }
    }
    grid
}
