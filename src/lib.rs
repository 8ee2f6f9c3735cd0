//! canopy - in-memory approximate nearest-neighbor search.
//!
//! Build an index over a borrowed N x D matrix of `f32` vectors, then
//! answer k-nearest-neighbor and radius queries against it. Exact search
//! is linear in N; the tree indices trade a little recall for sub-linear
//! query cost, bounded by a per-query `checks` budget, and the autotuner
//! picks an index family and parameters for a target recall.
//!
//! # Index families
//!
//! - **linear**: exhaustive scan. Exact; the baseline and oracle.
//! - **kdtree**: randomized k-d forest with best-bin-first search.
//! - **kmeans**: hierarchical k-means tree with cluster-boundary pruning.
//! - **vptree**: vantage-point tree with metric-ball pruning.
//! - **composite**: k-d forest and k-means tree sharing one query budget.
//!
//! # Examples
//!
//! ## Building and querying
//!
//! ```rust
//! use canopy::prelude::*;
//!
//! let points: Vec<f32> = vec![
//!     0.0, 0.0,
//!     1.0, 0.0,
//!     0.0, 1.0,
//!     1.0, 1.0,
//! ];
//! let data = Dataset::new(4, 2, &points)?;
//!
//! let params = Params::new().with("trees", 2).with("seed", 1);
//! let index = create_index("kdtree", data, &params)?;
//!
//! let found = index.knn(&[0.2, 0.1], 2, &SearchParams::exact())?;
//! assert_eq!(found[0].index, 0);
//! # Ok::<(), canopy::BuildError>(())
//! ```
//!
//! ## Radius search
//!
//! ```rust
//! use canopy::prelude::*;
//!
//! let points: Vec<f32> = vec![0.0, 0.0, 0.5, 0.0, 3.0, 3.0];
//! let data = Dataset::new(3, 2, &points)?;
//! let index = create_index("linear", data, &Params::new())?;
//!
//! // The radius is Euclidean; reported distances are squared.
//! let close = index.radius_search(&[0.0, 0.0], 1.0, &SearchParams::exact())?;
//! assert_eq!(close.len(), 2);
//! # Ok::<(), canopy::BuildError>(())
//! ```
//!
//! The distance metric is process-wide state, configured once with
//! [`set_distance_type`] before the first build; every index captures
//! the active metric when built. [`seed_random`] makes subsequent builds
//! reproducible.

pub mod autotune;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod eval;
pub mod index;
pub mod params;
pub mod results;

mod search;

pub use error::{BuildError, SearchError};

/// Commonly used types, in one import.
pub mod prelude {
    pub use crate::autotune::{Autotuner, SearchEstimate, Shortfall, Tuning};
    pub use crate::dataset::Dataset;
    pub use crate::distance::{set_distance_type, Distance, Metric};
    pub use crate::error::{BuildError, SearchError};
    pub use crate::eval::{
        compute_ground_truth, search_with_ground_truth, test_index_checks, test_index_precision,
    };
    pub use crate::index::{
        create_index, Algorithm, AnyIndex, CentersInit, CompositeIndex, KMeansParams, KMeansTree,
        KdForest, KdTreeParams, LinearIndex, NnIndex, VpTree,
    };
    pub use crate::params::{seed_random, Params, ParamValue, SearchParams, CHECKS_UNLIMITED};
    pub use crate::results::{KnnResultSet, Neighbor, RadiusResultSet, ResultSet};
    pub use crate::build_index;
}

use crate::autotune::{Autotuner, SearchEstimate};
use crate::dataset::Dataset;
use crate::index::{create_index, AnyIndex};
use crate::params::Params;
use log::info;
use std::time::Instant;

/// Build an index over `dataset`, optionally autotuned.
///
/// When `params` carries a non-negative `"target-precision"`, the
/// autotuner selects the algorithm and parameters on a sample, the index
/// is built on the full dataset, and the checks budget is re-tuned
/// against it; the tuned values (including `"checks"` and `"speedup"`)
/// are merged back into `params` and the estimate is returned. Otherwise
/// the index named by `"algorithm"` (default `"kdtree"`) is built
/// directly.
pub fn build_index<'a>(
    dataset: Dataset<'a>,
    params: &mut Params,
) -> Result<(AnyIndex<'a>, Option<SearchEstimate>), BuildError> {
    let target = params.get_float("target-precision", -1.0)? as f32;
    if target < 0.0 {
        let algorithm = params.get_str("algorithm", "kdtree")?;
        let start = Instant::now();
        let index = create_index(&algorithm, dataset, params)?;
        info!(
            "building {algorithm} index took {:.3}s",
            start.elapsed().as_secs_f64()
        );
        return Ok((index, None));
    }

    let build_weight = params.get_float("build_weight", 0.01)? as f32;
    let memory_weight = params.get_float("memory_weight", 0.0)? as f32;
    let sample_fraction = params.get_float("sample_fraction", 0.1)? as f32;
    let tuner = Autotuner::new(build_weight, memory_weight, sample_fraction)?;

    let tuning = tuner.estimate_build_params(dataset, target)?;
    params.merge(&tuning.params);
    let algorithm = params.get_str("algorithm", "kdtree")?;
    let start = Instant::now();
    let index = create_index(&algorithm, dataset, params)?;
    info!(
        "building tuned {algorithm} index took {:.3}s",
        start.elapsed().as_secs_f64()
    );
    let estimate = tuner.estimate_search_params(&index, dataset, target, params)?;
    Ok((index, Some(estimate)))
}
