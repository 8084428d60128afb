//! Binary Robust Invariant Scalable Keypoints.
//!
//! Corners are FAST-9 maxima over an octave / intra-octave scale space. The
//! descriptor compares smoothed intensities of a 60-point concentric ring
//! pattern rotated by the keypoint's gradient direction.

use std::f32::consts::{PI, TAU};

use image::GrayImage;

use super::descriptor::{BitPacker, Descriptors};
use super::plane::{Integral, Plane};
use super::{fast, DetectDescribe, FeatureMethod, FeatureSet};
use crate::types::Keypoint;

const RING_RADII: [f32; 5] = [0.0, 2.9, 4.9, 7.4, 10.8];
const RING_POINTS: [usize; 5] = [1, 10, 14, 15, 20];
const SHORT_PAIR_MAX: f32 = 9.75;
const LONG_PAIR_MIN: f32 = 13.67;
const DESCRIPTOR_BITS: usize = 256;
/// base size of a keypoint at scale 1, in pixels
const BASIC_SIZE: f32 = 12.0;

#[derive(Debug, Clone)]
pub struct Brisk {
    pub threshold: f32,
    pub octaves: usize,
    pub pattern_scale: f32,
    pub n_features: usize,
}

impl Default for Brisk {
    fn default() -> Self {
        Self {
            threshold: 30.0,
            octaves: 4,
            pattern_scale: 1.0,
            n_features: 500,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PatternPoint {
    x: f32,
    y: f32,
    sigma: f32,
}

#[derive(Debug, Clone)]
pub struct BriskPattern {
    points: Vec<PatternPoint>,
    short_pairs: Vec<(usize, usize)>,
    long_pairs: Vec<(usize, usize)>,
}

impl BriskPattern {
    pub fn new() -> BriskPattern {
        let mut points = Vec::with_capacity(RING_POINTS.iter().sum());
        for (ring, (&radius, &count)) in RING_RADII.iter().zip(&RING_POINTS).enumerate() {
            let offset = if ring % 2 == 1 { PI / count as f32 } else { 0.0 };
            let sigma = if ring == 0 {
                0.5
            } else {
                radius * (PI / count as f32).sin()
            };
            for k in 0..count {
                let theta = TAU * k as f32 / count as f32 + offset;
                points.push(PatternPoint {
                    x: radius * theta.cos(),
                    y: radius * theta.sin(),
                    sigma,
                });
            }
        }

        let mut short: Vec<((usize, usize), f32)> = Vec::new();
        let mut long_pairs = Vec::new();
        for i in 0..points.len() {
            for j in i + 1..points.len() {
                let d = ((points[j].x - points[i].x).powi(2) + (points[j].y - points[i].y).powi(2))
                    .sqrt();
                if d < SHORT_PAIR_MAX {
                    short.push(((i, j), d));
                } else if d > LONG_PAIR_MIN {
                    long_pairs.push((i, j));
                }
            }
        }
        short.sort_by(|a, b| a.1.total_cmp(&b.1));
        let short_pairs = short
            .into_iter()
            .take(DESCRIPTOR_BITS)
            .map(|(p, _)| p)
            .collect();

        BriskPattern {
            points,
            short_pairs,
            long_pairs,
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn short_pair_count(&self) -> usize {
        self.short_pairs.len()
    }

    pub fn long_pair_count(&self) -> usize {
        self.long_pairs.len()
    }

    /// Outer extent of the pattern including smoothing, in pattern units.
    fn extent(&self) -> f32 {
        self.points
            .iter()
            .map(|p| (p.x * p.x + p.y * p.y).sqrt() + p.sigma)
            .fold(0.0, f32::max)
    }
}

impl Default for BriskPattern {
    fn default() -> Self {
        Self::new()
    }
}

struct Layer {
    plane: Plane,
    scale: f32,
}

impl Layer {
    fn to_base(&self, base: &Plane, x: usize, y: usize) -> (f32, f32) {
        let sx = base.width() as f32 / self.plane.width() as f32;
        let sy = base.height() as f32 / self.plane.height() as f32;
        ((x as f32 + 0.5) * sx - 0.5, (y as f32 + 0.5) * sy - 0.5)
    }

    fn from_base(&self, base: &Plane, x: f32, y: f32) -> (f32, f32) {
        let sx = base.width() as f32 / self.plane.width() as f32;
        let sy = base.height() as f32 / self.plane.height() as f32;
        ((x + 0.5) / sx - 0.5, (y + 0.5) / sy - 0.5)
    }

    /// Largest FAST score in the 3x3 neighbourhood of a base-image location.
    fn max_score_near(&self, base: &Plane, x: f32, y: f32, threshold: f32) -> f32 {
        let (lx, ly) = self.from_base(base, x, y);
        let (cx, cy) = (lx.round() as isize, ly.round() as isize);
        let mut best = 0.0f32;
        for ny in cy - 1..=cy + 1 {
            for nx in cx - 1..=cx + 1 {
                if self.plane.contains(nx, ny, 3) {
                    best = best.max(fast::score(&self.plane, nx as usize, ny as usize, threshold));
                }
            }
        }
        best
    }
}

impl Brisk {
    fn scale_space(&self, base: &Plane) -> Vec<Layer> {
        let mut layers = Vec::with_capacity(2 * self.octaves);
        for octave in 0..self.octaves {
            let c = 2f32.powi(octave as i32);
            for scale in [c, 1.5 * c] {
                let plane = if scale == 1.0 {
                    base.clone()
                } else {
                    base.downscaled(scale)
                };
                if plane.width() < 16 || plane.height() < 16 {
                    return layers;
                }
                layers.push(Layer { plane, scale });
            }
        }
        layers
    }

    fn smoothed_intensity(
        &self,
        base: &Plane,
        integral: &Integral,
        x: f32,
        y: f32,
        sigma: f32,
    ) -> f32 {
        if sigma < 0.5 {
            return base.sample(x, y);
        }
        let half = sigma.round().max(1.0) as isize;
        let (cx, cy) = (x.round() as isize, y.round() as isize);
        integral.box_mean(cx - half, cy - half, cx + half, cy + half)
    }

    fn pattern_values(
        &self,
        pattern: &BriskPattern,
        base: &Plane,
        integral: &Integral,
        kp: &Keypoint,
        t: f32,
        angle: f32,
    ) -> Vec<f32> {
        let (sin, cos) = angle.sin_cos();
        pattern
            .points
            .iter()
            .map(|p| {
                let rx = cos * p.x - sin * p.y;
                let ry = sin * p.x + cos * p.y;
                self.smoothed_intensity(base, integral, kp.x + rx * t, kp.y + ry * t, p.sigma * t)
            })
            .collect()
    }

    /// Direction of the mean local gradient over the long-distance pairs.
    fn orientation(&self, pattern: &BriskPattern, values: &[f32]) -> f32 {
        let (mut gx, mut gy) = (0.0f32, 0.0f32);
        for &(i, j) in &pattern.long_pairs {
            let (pi, pj) = (pattern.points[i], pattern.points[j]);
            let (dx, dy) = (pj.x - pi.x, pj.y - pi.y);
            let norm2 = dx * dx + dy * dy;
            let diff = values[j] - values[i];
            gx += dx * diff / norm2;
            gy += dy * diff / norm2;
        }
        super::wrap_angle(gy.atan2(gx))
    }
}

impl DetectDescribe for Brisk {
    fn detect_and_describe(&self, gray: &GrayImage) -> FeatureSet {
        let base = Plane::from_gray(gray, 1.0);
        let layers = self.scale_space(&base);
        let pattern = BriskPattern::new();
        let extent = pattern.extent() + 1.0;

        let mut candidates: Vec<Keypoint> = Vec::new();
        for (k, layer) in layers.iter().enumerate() {
            let corners = fast::detect(&layer.plane, self.threshold, 3);
            for corner in corners {
                let (x, y) = layer.to_base(&base, corner.x, corner.y);
                let below = k
                    .checked_sub(1)
                    .map(|b| layers[b].max_score_near(&base, x, y, self.threshold))
                    .unwrap_or(0.0);
                let above = layers
                    .get(k + 1)
                    .map(|a| a.max_score_near(&base, x, y, self.threshold))
                    .unwrap_or(0.0);
                if corner.score < below || corner.score < above {
                    continue;
                }
                let radius = extent * layer.scale * self.pattern_scale;
                if x < radius
                    || y < radius
                    || x > base.width() as f32 - 1.0 - radius
                    || y > base.height() as f32 - 1.0 - radius
                {
                    continue;
                }
                candidates.push(Keypoint {
                    x,
                    y,
                    scale: BASIC_SIZE * layer.scale * self.pattern_scale,
                    orientation: 0.0,
                    response: corner.score,
                    octave: k,
                });
            }
        }
        candidates.sort_by(|a, b| b.response.total_cmp(&a.response));
        candidates.truncate(self.n_features);
        log::trace!(
            "brisk kept {} keypoints over {} layers",
            candidates.len(),
            layers.len()
        );

        let integral = base.integral();
        let mut keypoints = Vec::with_capacity(candidates.len());
        let mut data = Vec::with_capacity(candidates.len() * DESCRIPTOR_BITS / 8);
        for mut kp in candidates {
            let t = kp.scale / BASIC_SIZE;
            let upright = self.pattern_values(&pattern, &base, &integral, &kp, t, 0.0);
            kp.orientation = self.orientation(&pattern, &upright);
            let values = self.pattern_values(&pattern, &base, &integral, &kp, t, kp.orientation);
            let mut bits = BitPacker::<{ DESCRIPTOR_BITS / 8 }>::new();
            for &(i, j) in &pattern.short_pairs {
                bits.push(values[j] > values[i]);
            }
            data.extend_from_slice(&bits.finish());
            keypoints.push(kp);
        }

        FeatureSet {
            method: FeatureMethod::Brisk,
            keypoints,
            descriptors: Descriptors::Binary {
                bytes: DESCRIPTOR_BITS / 8,
                data,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_has_sixty_points_and_enough_pairs() {
        let pattern = BriskPattern::new();
        assert_eq!(pattern.point_count(), 60);
        assert_eq!(pattern.short_pair_count(), DESCRIPTOR_BITS);
        assert!(pattern.long_pair_count() > 0);
    }
}
