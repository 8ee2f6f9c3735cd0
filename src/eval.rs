//! Recall measurement utilities.
//!
//! Shared by the autotuner and by tests: compute exact ground truth with
//! the linear oracle, measure the precision of an index at a given
//! checks budget, and search for the smallest budget that reaches a
//! target precision.

use crate::dataset::Dataset;
use crate::error::BuildError;
use crate::index::{LinearIndex, NnIndex};
use crate::params::SearchParams;
use log::{info, warn};
use std::time::Instant;

/// Exact `nn` nearest matches for every row of `testset` against
/// `dataset`, computed with the linear oracle.
///
/// `skip` drops that many leading neighbors per query; use `skip = 1`
/// when the test rows are drawn from the indexed data and the nearest
/// match would be the query itself.
pub fn compute_ground_truth(
    dataset: Dataset<'_>,
    testset: Dataset<'_>,
    nn: usize,
    skip: usize,
) -> Result<Vec<Vec<u32>>, BuildError> {
    if testset.cols() != dataset.cols() {
        return Err(BuildError::InvalidParameter(format!(
            "testset dimension {} does not match dataset dimension {}",
            testset.cols(),
            dataset.cols()
        )));
    }
    let oracle = LinearIndex::build(dataset)?;
    let exact = SearchParams::exact();
    let mut matches = Vec::with_capacity(testset.rows());
    for i in 0..testset.rows() {
        let found = oracle.knn(testset.row(i), nn + skip, &exact)?;
        matches.push(
            found
                .into_iter()
                .skip(skip)
                .map(|n| n.index as u32)
                .collect(),
        );
    }
    Ok(matches)
}

/// Run `index` over `testset` at the given checks budget and score the
/// results against `matches`.
///
/// Returns the measured precision (fraction of true neighbors returned)
/// and the mean wall-clock seconds per query. `skip` mirrors the value
/// used for the ground truth.
pub fn search_with_ground_truth(
    index: &dyn NnIndex,
    testset: Dataset<'_>,
    matches: &[Vec<u32>],
    nn: usize,
    checks: i32,
    skip: usize,
) -> Result<(f32, f64), BuildError> {
    let params = SearchParams::new(checks);
    let mut correct = 0usize;
    let mut total = 0usize;
    let start = Instant::now();
    for i in 0..testset.rows() {
        let found = index.knn(testset.row(i), nn + skip, &params)?;
        let returned = &found[skip.min(found.len())..];
        for m in matches[i].iter().take(nn) {
            if returned.iter().any(|n| n.index as u32 == *m) {
                correct += 1;
            }
        }
        total += matches[i].len().min(nn);
    }
    let elapsed = start.elapsed().as_secs_f64();
    let precision = if total == 0 {
        1.0
    } else {
        correct as f32 / total as f32
    };
    Ok((precision, elapsed / testset.rows().max(1) as f64))
}

/// Precision and mean query time of `index` at a fixed checks budget.
pub fn test_index_checks(
    index: &dyn NnIndex,
    testset: Dataset<'_>,
    matches: &[Vec<u32>],
    nn: usize,
    checks: i32,
) -> Result<(f32, f64), BuildError> {
    let (precision, time) = search_with_ground_truth(index, testset, matches, nn, checks, 0)?;
    info!("checks {checks}: precision {precision:.4}, {time:.2e}s/query");
    Ok((precision, time))
}

/// Smallest checks budget at which `index` reaches `target` precision.
///
/// Doubles the budget until the target is reached, then binary-searches
/// the bracket. Returns the budget, the precision measured there, and
/// the mean query seconds. If the target is unreachable even with a
/// budget covering the whole dataset, returns that cap with the
/// precision actually achieved; callers detect the shortfall by
/// comparing against the target.
pub fn test_index_precision(
    index: &dyn NnIndex,
    testset: Dataset<'_>,
    matches: &[Vec<u32>],
    nn: usize,
    target: f32,
    skip: usize,
) -> Result<(i32, f32, f64), BuildError> {
    let cap = index.size() as i32;
    let mut lo = 0i32;
    let mut checks = 1i32;
    let (mut hi_precision, mut hi_time);
    loop {
        let (p, t) = search_with_ground_truth(index, testset, matches, nn, checks, skip)?;
        if p >= target {
            hi_precision = p;
            hi_time = t;
            break;
        }
        if checks >= cap {
            warn!("target precision {target} unreachable: {p:.4} at checks {checks}");
            return Ok((checks, p, t));
        }
        lo = checks;
        checks = (checks * 2).min(cap);
    }

    while checks - lo > 1 {
        let mid = lo + (checks - lo) / 2;
        let (p, t) = search_with_ground_truth(index, testset, matches, nn, mid, skip)?;
        if p >= target {
            checks = mid;
            hi_precision = p;
            hi_time = t;
        } else {
            lo = mid;
        }
    }
    Ok((checks, hi_precision, hi_time))
}
