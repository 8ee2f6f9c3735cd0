//! End-to-end scenarios across the index families.
//!
//! Every build in this file pins its own `"seed"` so the tests are
//! reproducible and do not touch the global generator, except the
//! autotune scenario which owns it via `seed_random`.

use canopy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Four unit-square corners plus an outlier.
fn corner_dataset() -> Vec<f32> {
    vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 3.0, 3.0]
}

fn uniform(n: usize, d: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * d).map(|_| rng.gen::<f32>()).collect()
}

fn standard_normal(rng: &mut StdRng) -> f32 {
    let u1 = rng.gen::<f32>().max(1e-7);
    let u2 = rng.gen::<f32>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

/// Two Gaussian clusters (sigma 0.5) centered at the origin and at
/// (10, ..., 10).
fn gaussian_pair(per_cluster: usize, d: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = Vec::with_capacity(2 * per_cluster * d);
    for cluster in 0..2 {
        let center = if cluster == 0 { 0.0 } else { 10.0 };
        for _ in 0..per_cluster {
            for _ in 0..d {
                buf.push(center + 0.5 * standard_normal(&mut rng));
            }
        }
    }
    buf
}

#[test]
fn s1_linear_exact_on_small_dataset() {
    let buf = corner_dataset();
    let data = Dataset::new(5, 2, &buf).unwrap();
    let index = create_index("linear", data, &Params::new()).unwrap();

    let found = index.knn(&[0.1, 0.1], 2, &SearchParams::default()).unwrap();
    assert_eq!(found[0].index, 0);
    assert!((found[0].distance - 0.02).abs() < 1e-6);
    // (1, 0) and (0, 1) tie at 0.82; either is a valid second neighbor.
    assert!(found[1].index == 1 || found[1].index == 2);
    assert!((found[1].distance - 0.82).abs() < 1e-6);
}

#[test]
fn s2_kd_forest_exact_matches_oracle() {
    let buf = corner_dataset();
    let data = Dataset::new(5, 2, &buf).unwrap();
    let params = Params::new().with("trees", 4).with("seed", 1);
    let forest = create_index("kdtree", data, &params).unwrap();
    let oracle = create_index("linear", data, &Params::new()).unwrap();

    let query = [0.1, 0.1];
    let exact = SearchParams::exact();
    let got = forest.knn(&query, 5, &exact).unwrap();
    let want = oracle.knn(&query, 5, &exact).unwrap();

    assert_eq!(got.len(), 5);
    for (g, w) in got.iter().zip(&want) {
        assert!((g.distance - w.distance).abs() < 1e-6);
    }
    // Distances ascend and agree with a recomputation from the dataset.
    let dist = forest.distance();
    for pair in got.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
    for n in &got {
        let recomputed = dist.distance(data.row(n.index), &query, f32::INFINITY);
        assert!((recomputed - n.distance).abs() < 1e-6);
    }
}

#[test]
fn s3_kmeans_cluster_centers_on_gaussian_pair() {
    let buf = gaussian_pair(512, 8, 9001);
    let data = Dataset::new(1024, 8, &buf).unwrap();
    let params = Params::new()
        .with("branching", 2)
        .with("max-iterations", -1)
        .with("centers-init", "kmeanspp")
        .with("seed", 1);
    let tree = KMeansTree::build(data, &params).unwrap();

    let centers = tree.cluster_centers(2);
    assert_eq!(centers.len(), 2);

    let mut near_origin = 0;
    let mut near_far = 0;
    for center in &centers {
        let to_origin: f32 = center.iter().map(|&v| v * v).sum::<f32>().sqrt();
        let to_far: f32 = center
            .iter()
            .map(|&v| (v - 10.0) * (v - 10.0))
            .sum::<f32>()
            .sqrt();
        if to_origin < 0.5 {
            near_origin += 1;
        }
        if to_far < 0.5 {
            near_far += 1;
        }
    }
    assert_eq!(near_origin, 1, "one center within 0.5 of the origin mean");
    assert_eq!(near_far, 1, "one center within 0.5 of the far mean");
}

#[test]
fn s4_radius_search_on_grid() {
    let mut buf = Vec::with_capacity(200);
    for y in 0..10 {
        for x in 0..10 {
            buf.push(x as f32);
            buf.push(y as f32);
        }
    }
    let data = Dataset::new(100, 2, &buf).unwrap();
    let params = Params::new().with("trees", 4).with("seed", 1);
    let forest = create_index("kdtree", data, &params).unwrap();

    let found = forest
        .radius_search(&[5.0, 5.0], 2.0, &SearchParams::exact())
        .unwrap();
    // The center plus 12 grid points within squared distance 4.
    assert_eq!(found.len(), 13);
    assert!(found.iter().all(|n| n.distance <= 4.0));
    let center = found.iter().find(|n| n.distance == 0.0).unwrap();
    assert_eq!(center.index, 55);

    // Completeness: identical membership to the linear oracle.
    let oracle = create_index("linear", data, &Params::new()).unwrap();
    let mut got: Vec<_> = found.iter().map(|n| n.index).collect();
    let mut want: Vec<_> = oracle
        .radius_search(&[5.0, 5.0], 2.0, &SearchParams::exact())
        .unwrap()
        .iter()
        .map(|n| n.index)
        .collect();
    got.sort_unstable();
    want.sort_unstable();
    assert_eq!(got, want);
}

#[test]
fn s5_s6_autotune_reaches_target_and_recall_is_monotone() {
    seed_random(1);
    let n = 10_000;
    let d = 16;
    let buf = uniform(n, d, 1234);
    let data = Dataset::new(n, d, &buf).unwrap();

    let tuner = Autotuner::new(0.01, 0.0, 0.1)
        .unwrap()
        .with_test_samples(100);
    let tuning = tuner.estimate_build_params(data, 0.9).unwrap();
    assert!(tuning.shortfall.is_none(), "tuner fell short of 0.9");

    let mut params = tuning.params.clone();
    let algorithm = params.get_str("algorithm", "kdtree").unwrap();
    let index = create_index(&algorithm, data, &params).unwrap();
    let estimate = tuner
        .estimate_search_params(&index, data, 0.9, &mut params)
        .unwrap();
    assert!(estimate.precision >= 0.9);

    // S5: recall at 10 on a held-out query set, statistical tolerance.
    let qbuf = uniform(500, d, 7777);
    let queries = Dataset::new(500, d, &qbuf).unwrap();
    let matches = compute_ground_truth(data, queries, 10, 0).unwrap();
    let (recall, _) =
        search_with_ground_truth(&index, queries, &matches, 10, estimate.checks, 0).unwrap();
    assert!(recall >= 0.88, "held-out recall {recall}");

    // S6: recall never decreases as the budget grows.
    let mut last = 0.0f32;
    for checks in [1, 8, 64, 512, 4096] {
        let (r, _) = search_with_ground_truth(&index, queries, &matches, 10, checks, 0).unwrap();
        assert!(
            r >= last - 1e-6,
            "recall regressed at checks {checks}: {r} < {last}"
        );
        last = r;
    }
}

#[test]
fn vp_tree_matches_oracle() {
    let buf = uniform(500, 6, 333);
    let data = Dataset::new(500, 6, &buf).unwrap();
    let tree = create_index("vptree", data, &Params::new().with("seed", 2)).unwrap();
    let oracle = create_index("linear", data, &Params::new()).unwrap();

    let search = SearchParams::default();
    for qseed in 0..8u64 {
        let query = uniform(1, 6, 5000 + qseed);
        let got = tree.knn(&query, 5, &search).unwrap();
        let want = oracle.knn(&query, 5, &search).unwrap();
        for (g, w) in got.iter().zip(&want) {
            assert!((g.distance - w.distance).abs() < 1e-6);
        }
    }

    // Radius completeness.
    let query = uniform(1, 6, 6001);
    let mut got: Vec<_> = tree
        .radius_search(&query, 0.6, &search)
        .unwrap()
        .iter()
        .map(|n| n.index)
        .collect();
    let mut want: Vec<_> = oracle
        .radius_search(&query, 0.6, &search)
        .unwrap()
        .iter()
        .map(|n| n.index)
        .collect();
    got.sort_unstable();
    want.sort_unstable();
    assert_eq!(got, want);
}

#[test]
fn composite_recall_tracks_its_parts() {
    let buf = uniform(2000, 8, 4242);
    let data = Dataset::new(2000, 8, &buf).unwrap();
    let params = Params::new()
        .with("trees", 4)
        .with("branching", 16)
        .with("seed", 3);
    let kd = create_index("kdtree", data, &params).unwrap();
    let km = create_index("kmeans", data, &params).unwrap();
    let both = create_index("composite", data, &params).unwrap();

    let qbuf = uniform(50, 8, 4243);
    let queries = Dataset::new(50, 8, &qbuf).unwrap();
    let matches = compute_ground_truth(data, queries, 10, 0).unwrap();

    let checks = 512;
    let (kd_recall, _) = search_with_ground_truth(&kd, queries, &matches, 10, checks, 0).unwrap();
    let (km_recall, _) = search_with_ground_truth(&km, queries, &matches, 10, checks, 0).unwrap();
    let (both_recall, _) =
        search_with_ground_truth(&both, queries, &matches, 10, checks, 0).unwrap();

    // The forest pass of the composite is identical to the standalone
    // forest, so its recall can only improve on it; the k-means side
    // shares the budget, so allow it a tolerance.
    assert!(both_recall >= kd_recall - 1e-6);
    assert!(both_recall >= km_recall - 0.2);
}

#[test]
fn knn_with_budget_returns_sorted_consistent_distances() {
    let buf = uniform(800, 5, 88);
    let data = Dataset::new(800, 5, &buf).unwrap();

    for name in ["kdtree", "kmeans", "composite", "vptree"] {
        let index = create_index(name, data, &Params::new().with("seed", 5)).unwrap();
        let query = [0.3, 0.6, 0.2, 0.9, 0.4];
        let found = index.knn(&query, 10, &SearchParams::new(64)).unwrap();
        assert_eq!(found.len(), 10, "{name}");

        let dist = index.distance();
        for pair in found.windows(2) {
            assert!(pair[0].distance <= pair[1].distance, "{name}");
        }
        for n in &found {
            let recomputed = dist.distance(data.row(n.index), &query, f32::INFINITY);
            assert!((recomputed - n.distance).abs() < 1e-5, "{name}");
        }
    }
}
