use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::homography::{reprojection_error, solve_four_point, solve_least_squares};
use crate::error::{Result, StitchError};
use crate::features::FeatureSet;
use crate::matching::{PairMatch, MIN_CORRESPONDENCES};
use crate::types::Homography;

const MAX_REFITS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub iterations: usize,
    /// max forward reprojection error of an inlier, in pixels
    pub inlier_threshold: f64,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            iterations: 2000,
            inlier_threshold: 3.0,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HomographyEstimate {
    pub homography: Homography,
    /// indices into the input pairs
    pub inliers: Vec<usize>,
}

pub fn count_inliers(
    h: &nalgebra::Matrix3<f64>,
    pairs: &[(Vec2, Vec2)],
    threshold: f64,
) -> Vec<usize> {
    pairs
        .iter()
        .enumerate()
        .filter(|(_, (s, t))| reprojection_error(h, *s, *t) <= threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Mean forward reprojection error over a subset of the pairs.
pub fn mean_error(h: &nalgebra::Matrix3<f64>, pairs: &[(Vec2, Vec2)], subset: &[usize]) -> f64 {
    if subset.is_empty() {
        return f64::INFINITY;
    }
    let total: f64 = subset
        .iter()
        .map(|&i| reprojection_error(h, pairs[i].0, pairs[i].1))
        .sum();
    total / subset.len() as f64
}

/// Robust homography of `(warped, reference)` point pairs.
///
/// Sampled models are ranked by inlier count, ties going to the lower mean
/// error. The winner is refit by least squares over its inliers, repeatedly,
/// while the refit keeps at least as many inliers at no higher mean error.
pub fn estimate_homography<R: Rng + ?Sized>(
    pairs: &[(Vec2, Vec2)],
    config: &RansacConfig,
    rng: &mut R,
) -> Result<HomographyEstimate> {
    if pairs.len() < MIN_CORRESPONDENCES {
        return Err(StitchError::InsufficientCorrespondences {
            found: pairs.len(),
            needed: MIN_CORRESPONDENCES,
        });
    }

    let mut best: Option<(nalgebra::Matrix3<f64>, Vec<usize>, f64)> = None;
    let mut rejected = 0usize;
    for _ in 0..config.iterations {
        let sample = rand::seq::index::sample(rng, pairs.len(), MIN_CORRESPONDENCES);
        let four = [
            pairs[sample.index(0)],
            pairs[sample.index(1)],
            pairs[sample.index(2)],
            pairs[sample.index(3)],
        ];
        let Some(h) = solve_four_point(&four) else {
            rejected += 1;
            continue;
        };
        let inliers = count_inliers(&h, pairs, config.inlier_threshold);
        let better = match &best {
            None => true,
            Some((_, b, _)) if inliers.len() != b.len() => inliers.len() > b.len(),
            Some((_, _, e)) => mean_error(&h, pairs, &inliers) < *e,
        };
        if better {
            log::trace!("ransac: new best model with {} inliers", inliers.len());
            let error = mean_error(&h, pairs, &inliers);
            best = Some((h, inliers, error));
        }
    }
    log::debug!(
        "ransac: {} iterations, {} degenerate samples",
        config.iterations,
        rejected
    );

    let Some((mut model, mut inliers, mut error)) = best else {
        return Err(StitchError::DegenerateGeometry(
            "no non-degenerate 4-point sample".to_string(),
        ));
    };
    if inliers.len() < MIN_CORRESPONDENCES {
        return Err(StitchError::DegenerateGeometry(format!(
            "best model has only {} inliers",
            inliers.len()
        )));
    }

    for _ in 0..MAX_REFITS {
        let inlier_pairs: Vec<(Vec2, Vec2)> = inliers.iter().map(|&i| pairs[i]).collect();
        let Some(refit) = solve_least_squares(&inlier_pairs) else {
            break;
        };
        let refit_inliers = count_inliers(&refit, pairs, config.inlier_threshold);
        let refit_error = mean_error(&refit, pairs, &refit_inliers);
        if refit_inliers.len() < inliers.len() || refit_error > error {
            break;
        }
        let unchanged = refit_inliers == inliers;
        model = refit;
        inliers = refit_inliers;
        error = refit_error;
        if unchanged {
            break;
        }
    }

    let homography = Homography::new(model).ok_or_else(|| {
        StitchError::DegenerateGeometry("estimated homography is not invertible".to_string())
    })?;
    log::debug!(
        "ransac: {} / {} inliers, mean error {:.3} px",
        inliers.len(),
        pairs.len(),
        error
    );
    Ok(HomographyEstimate {
        homography,
        inliers,
    })
}

/// Estimates the homography of every pair match in place, one result per pair.
///
/// Each pair draws from its own generator seeded with `seed + pair index`.
pub fn build_homographies(
    pair_matches: &mut [PairMatch],
    features: &[FeatureSet],
    config: &RansacConfig,
) -> Vec<Result<()>> {
    pair_matches
        .iter_mut()
        .enumerate()
        .map(|(idx, pm)| {
            if !pm.is_usable() {
                return Err(StitchError::InsufficientCorrespondences {
                    found: pm.correspondences.len(),
                    needed: MIN_CORRESPONDENCES,
                });
            }
            let pairs = pm.point_pairs(features);
            let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(idx as u64));
            let estimate = estimate_homography(&pairs, config, &mut rng)?;
            pm.homography = Some(estimate.homography);
            pm.inliers = estimate.inliers;
            Ok(())
        })
        .collect()
}
