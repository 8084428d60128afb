use glam::Vec2;
use nalgebra as na;
use pano_stitch::matching::{Correspondence, PairMatch};
use pano_stitch::optimization::{
    build_homographies, count_inliers, estimate_homography, mean_error, reprojection_error,
    solve_four_point, solve_least_squares, RansacConfig,
};
use pano_stitch::types::Homography;
use pano_stitch::StitchError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn true_homography() -> na::Matrix3<f64> {
    na::Matrix3::new(0.95, 0.05, -120.0, -0.03, 1.02, 8.0, 1e-5, -2e-5, 1.0)
}

fn project(h: &na::Matrix3<f64>, p: Vec2) -> Vec2 {
    let v = h * na::Vector3::new(p.x as f64, p.y as f64, 1.0);
    Vec2::new((v[0] / v[2]) as f32, (v[1] / v[2]) as f32)
}

/// `n` exact pairs plus `outliers` random ones, shuffled by the seed.
fn synthetic_pairs(n: usize, outliers: usize, seed: u64) -> Vec<(Vec2, Vec2)> {
    let h = true_homography();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut pairs: Vec<(Vec2, Vec2)> = (0..n)
        .map(|_| {
            let p = Vec2::new(rng.random_range(0.0..400.0), rng.random_range(0.0..300.0));
            (p, project(&h, p))
        })
        .collect();
    for _ in 0..outliers {
        let p = Vec2::new(rng.random_range(0.0..400.0), rng.random_range(0.0..300.0));
        let q = Vec2::new(rng.random_range(-200.0..400.0), rng.random_range(0.0..300.0));
        pairs.push((p, q));
    }
    pairs
}

fn max_entry_diff(a: &na::Matrix3<f64>, b: &na::Matrix3<f64>) -> f64 {
    (a - b).abs().max()
}

#[test]
fn test_four_point_solution_is_exact() {
    let h = true_homography();
    let src = [
        Vec2::new(0.0, 0.0),
        Vec2::new(399.0, 0.0),
        Vec2::new(399.0, 299.0),
        Vec2::new(0.0, 299.0),
    ];
    let pairs = src.map(|p| (p, project(&h, p)));
    let solved = solve_four_point(&pairs).unwrap();
    for (s, t) in pairs {
        assert!(reprojection_error(&solved, s, t) < 1e-3);
    }
}

#[test]
fn test_four_point_rejects_collinear() {
    let pairs = [0.0f32, 1.0, 2.0, 3.0].map(|i| {
        let p = Vec2::new(i * 10.0, i * 5.0);
        (p, p + Vec2::new(3.0, 1.0))
    });
    assert!(solve_four_point(&pairs).is_none());
}

#[test]
fn test_least_squares_recovers_translation() {
    let pairs: Vec<(Vec2, Vec2)> = (0..20)
        .map(|i| {
            let p = Vec2::new((i * 37 % 400) as f32, (i * 53 % 300) as f32);
            (p, p + Vec2::new(-250.0, 4.0))
        })
        .collect();
    let h = solve_least_squares(&pairs).unwrap();
    let expected = na::Matrix3::new(1.0, 0.0, -250.0, 0.0, 1.0, 4.0, 0.0, 0.0, 1.0);
    assert!(max_entry_diff(&h, &expected) < 1e-4);
}

#[test]
fn test_ransac_with_outliers() {
    let pairs = synthetic_pairs(80, 40, 5);
    let config = RansacConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let estimate = estimate_homography(&pairs, &config, &mut rng).unwrap();

    assert!(estimate.inliers.len() >= 80);
    assert!(estimate.inliers.len() < 90);
    for &i in &estimate.inliers {
        let (s, t) = pairs[i];
        let e = reprojection_error(estimate.homography.matrix(), s, t);
        assert!(e <= config.inlier_threshold, "inlier {} has error {}", i, e);
    }
    for (i, (s, t)) in pairs.iter().take(80).enumerate() {
        assert!(estimate.inliers.contains(&i));
        assert!(reprojection_error(estimate.homography.matrix(), *s, *t) < 0.05);
    }
    // invertible: H * H^-1 = I
    let product = estimate.homography.matrix() * estimate.homography.inverse().matrix();
    let product = product / product[(2, 2)];
    assert!(max_entry_diff(&product, &na::Matrix3::identity()) < 1e-6);
}

#[test]
fn test_ransac_keeps_exact_model_over_noisy_refit() {
    // matches confined to a 150 px wide overlap: 70 exact, 30 jittered by up
    // to 1.5 px and 20 far off
    let shift = Vec2::new(-250.0, 0.0);
    let mut rng = ChaCha8Rng::seed_from_u64(17);
    let mut pairs = Vec::new();
    for i in 0..120 {
        let p = Vec2::new(rng.random_range(250.0..400.0), rng.random_range(0.0..300.0));
        let q = match i {
            0..70 => p + shift,
            70..100 => {
                let jitter = Vec2::new(rng.random_range(-1.5..1.5), rng.random_range(-1.5..1.5));
                p + shift + jitter
            }
            _ => p + Vec2::new(rng.random_range(50.0..150.0), rng.random_range(50.0..150.0)),
        };
        pairs.push((p, q));
    }

    let config = RansacConfig::default();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let estimate = estimate_homography(&pairs, &config, &mut rng).unwrap();
    assert_eq!(estimate.inliers.len(), 100);
    assert!(mean_error(estimate.homography.matrix(), &pairs, &(0..70).collect::<Vec<_>>()) < 0.01);

    // far side of the warped image, 250 px outside the overlap
    for corner in [Vec2::new(0.0, 0.0), Vec2::new(0.0, 299.0)] {
        let (x, y) = estimate
            .homography
            .project(corner.x as f64, corner.y as f64)
            .unwrap();
        assert!((x + 250.0).abs() < 0.1, "x = {}", x);
        assert!((y - corner.y as f64).abs() < 0.1, "y = {}", y);
    }
}

#[test]
fn test_mean_error_of_empty_subset() {
    let pairs = synthetic_pairs(4, 0, 1);
    assert_eq!(mean_error(&true_homography(), &pairs, &[]), f64::INFINITY);
    assert!(mean_error(&true_homography(), &pairs, &[0, 1, 2, 3]) < 1e-3);
}

#[test]
fn test_ransac_is_reproducible() {
    let pairs = synthetic_pairs(30, 30, 9);
    let config = RansacConfig {
        iterations: 200,
        ..RansacConfig::default()
    };
    let a = estimate_homography(&pairs, &config, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
    let b = estimate_homography(&pairs, &config, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
    assert_eq!(a.homography.to_rows(), b.homography.to_rows());
    assert_eq!(a.inliers, b.inliers);
}

#[test]
fn test_ransac_needs_four_pairs() {
    let pairs = synthetic_pairs(3, 0, 1);
    let err = estimate_homography(&pairs, &RansacConfig::default(), &mut rand::rng()).unwrap_err();
    assert!(matches!(
        err,
        StitchError::InsufficientCorrespondences { found: 3, needed: 4 }
    ));
}

#[test]
fn test_ransac_degenerate_points() {
    // every sample is collinear
    let pairs: Vec<(Vec2, Vec2)> = (0..10)
        .map(|i| {
            let p = Vec2::new(i as f32 * 7.0, i as f32 * 3.0);
            (p, p)
        })
        .collect();
    let config = RansacConfig {
        iterations: 50,
        ..RansacConfig::default()
    };
    let err = estimate_homography(&pairs, &config, &mut ChaCha8Rng::seed_from_u64(0)).unwrap_err();
    assert!(matches!(err, StitchError::DegenerateGeometry(_)));
}

#[test]
fn test_count_inliers_uses_threshold() {
    let h = na::Matrix3::identity();
    let pairs = vec![
        (Vec2::ZERO, Vec2::new(3.0, 0.0)),
        (Vec2::ZERO, Vec2::new(3.1, 0.0)),
        (Vec2::ONE, Vec2::ONE),
    ];
    assert_eq!(count_inliers(&h, &pairs, 3.0), vec![0, 2]);
}

#[test]
fn test_build_homographies_fills_pairs() {
    use pano_stitch::features::{Descriptors, FeatureMethod, FeatureSet};
    use pano_stitch::types::Keypoint;

    let pairs = synthetic_pairs(40, 0, 3);
    let set = |pts: Vec<Vec2>| FeatureSet {
        method: FeatureMethod::Orb,
        keypoints: pts.iter().map(|p| Keypoint::new(p.x, p.y)).collect(),
        descriptors: Descriptors::Binary {
            bytes: 32,
            data: vec![0; 32 * pts.len()],
        },
    };
    let features = vec![
        set(pairs.iter().map(|p| p.0).collect()),
        set(pairs.iter().map(|p| p.1).collect()),
    ];
    let correspondences = (0..40)
        .map(|i| Correspondence {
            query_idx: i,
            train_idx: i,
            distance: 0.0,
        })
        .collect();
    let mut pair_matches = vec![
        PairMatch {
            reference: 1,
            warped: 0,
            correspondences,
            homography: None,
            inliers: Vec::new(),
        },
        PairMatch {
            reference: 1,
            warped: 0,
            correspondences: Vec::new(),
            homography: None,
            inliers: Vec::new(),
        },
    ];
    let results = build_homographies(&mut pair_matches, &features, &RansacConfig::default());
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(StitchError::InsufficientCorrespondences { found: 0, .. })
    ));
    assert_eq!(pair_matches[0].inliers.len(), 40);
    let h = pair_matches[0].homography.unwrap();
    for (s, t) in &pairs {
        assert!(reprojection_error(h.matrix(), *s, *t) < 0.05);
    }
    assert!(pair_matches[1].homography.is_none());
}

#[test]
fn test_homography_rejects_singular() {
    let singular = na::Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
    assert!(Homography::new(singular).is_none());
    let h = Homography::new(true_homography() * 2.0).unwrap();
    assert!((h.matrix()[(2, 2)] - 1.0).abs() < 1e-12);
    let (x, y) = h.project(10.0, 20.0).unwrap();
    let (bx, by) = h.project_inverse(x, y).unwrap();
    assert!((bx - 10.0).abs() < 1e-9 && (by - 20.0).abs() < 1e-9);
}
