use glam::Vec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::features::descriptor::{euclidean_distance, hamming_distance};
use crate::features::{Descriptors, FeatureSet};
use crate::types::Homography;

/// Minimal sample size of a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// keypoint index in the warped image
    pub query_idx: usize,
    /// keypoint index in the reference image
    pub train_idx: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub ratio: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self { ratio: 0.75 }
    }
}

/// Lowe's ratio test: keep the best match only when clearly better than the runner-up.
pub fn ratio_test(best: f32, second: f32, ratio: f32) -> bool {
    best < ratio * second
}

/// Correspondences between two image features, `warped` mapped into `reference`.
#[derive(Debug, Clone)]
pub struct PairMatch {
    pub reference: usize,
    pub warped: usize,
    pub correspondences: Vec<Correspondence>,
    pub homography: Option<Homography>,
    /// indices into `correspondences` consistent with `homography`
    pub inliers: Vec<usize>,
}

impl PairMatch {
    pub fn is_usable(&self) -> bool {
        self.correspondences.len() >= MIN_CORRESPONDENCES
    }

    /// `(warped point, reference point)` for every correspondence.
    pub fn point_pairs(&self, features: &[FeatureSet]) -> Vec<(Vec2, Vec2)> {
        let (Some(warped), Some(reference)) =
            (features.get(self.warped), features.get(self.reference))
        else {
            return Vec::new();
        };
        self.correspondences
            .iter()
            .filter_map(|c| {
                let q = warped.keypoints.get(c.query_idx)?;
                let t = reference.keypoints.get(c.train_idx)?;
                Some((q.position(), t.position()))
            })
            .collect()
    }
}

/// Two nearest neighbours `(index, distance)` of `dist` over `0..n`.
fn two_nearest(n: usize, dist: impl Fn(usize) -> f32) -> Option<((usize, f32), f32)> {
    if n < 2 {
        return None;
    }
    let mut best = (usize::MAX, f32::INFINITY);
    let mut second = f32::INFINITY;
    for j in 0..n {
        let d = dist(j);
        if d < best.1 {
            second = best.1;
            best = (j, d);
        } else if d < second {
            second = d;
        }
    }
    Some((best, second))
}

/// Brute-force 2-NN search of every `query` row against `train`, filtered by the ratio test.
pub fn match_descriptors(
    query: &Descriptors,
    train: &Descriptors,
    ratio: f32,
) -> Vec<Correspondence> {
    if !query.is_compatible(train) {
        log::warn!("descriptor kinds differ, no correspondences");
        return Vec::new();
    }
    let n_train = train.len();
    (0..query.len())
        .into_par_iter()
        .filter_map(|i| {
            let ((j, d1), d2) = match (query, train) {
                (Descriptors::Float { .. }, Descriptors::Float { .. }) => {
                    let q = query.float_row(i)?;
                    two_nearest(n_train, |j| {
                        train
                            .float_row(j)
                            .map_or(f32::INFINITY, |t| euclidean_distance(q, t))
                    })?
                }
                _ => {
                    let q = query.binary_row(i)?;
                    two_nearest(n_train, |j| {
                        train
                            .binary_row(j)
                            .map_or(f32::INFINITY, |t| hamming_distance(q, t) as f32)
                    })?
                }
            };
            ratio_test(d1, d2, ratio).then_some(Correspondence {
                query_idx: i,
                train_idx: j,
                distance: d1,
            })
        })
        .collect()
}

/// Matches every pair `i < j`, warping image `i` into the frame of image `j`.
pub fn get_pair_matches(features: &[FeatureSet], config: &MatchConfig) -> Vec<PairMatch> {
    let mut pairs = Vec::new();
    for warped in 0..features.len() {
        for reference in warped + 1..features.len() {
            let correspondences = match_descriptors(
                &features[warped].descriptors,
                &features[reference].descriptors,
                config.ratio,
            );
            log::debug!(
                "pair {} -> {}: {} correspondences from {} x {} keypoints",
                warped,
                reference,
                correspondences.len(),
                features[warped].len(),
                features[reference].len()
            );
            pairs.push(PairMatch {
                reference,
                warped,
                correspondences,
                homography: None,
                inliers: Vec::new(),
            });
        }
    }
    pairs
}
