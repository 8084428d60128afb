//! Oriented FAST and rotated BRIEF.

use image::GrayImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use super::descriptor::{BitPacker, Descriptors};
use super::plane::Plane;
use super::{fast, DetectDescribe, FeatureMethod, FeatureSet};
use crate::types::Keypoint;

const DESCRIPTOR_BITS: usize = 256;
const PATTERN_SEED: u64 = 0x0DDB1A5E5BAD5EED;
const HARRIS_RADIUS: isize = 3;
const HARRIS_SIGMA: f32 = 1.5;
const MAX_CLIMB_STEPS: usize = 3;
const NEIGHBOURS: [(isize, isize); 8] =
    [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)];

#[derive(Debug, Clone)]
pub struct Orb {
    pub n_features: usize,
    pub scale_factor: f32,
    pub n_levels: usize,
    pub fast_threshold: f32,
    pub patch_size: usize,
    pub edge_threshold: usize,
    pub harris_k: f32,
}

impl Default for Orb {
    fn default() -> Self {
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            fast_threshold: 20.0,
            patch_size: 31,
            edge_threshold: 19,
            harris_k: 0.04,
        }
    }
}

/// Point-pair tests of a BRIEF descriptor, relative to the keypoint.
#[derive(Debug, Clone)]
pub struct BriefPattern {
    pub pairs: Vec<((f32, f32), (f32, f32))>,
}

impl BriefPattern {
    /// Isotropic Gaussian pairs (sigma = patch / 5) clipped to the patch half-width.
    pub fn gaussian(n: usize, patch_size: usize, seed: u64) -> BriefPattern {
        let half = (patch_size / 2) as f32 - 2.0;
        let std_dev = patch_size as f32 / 5.0;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let pairs = match Normal::new(0.0f32, std_dev) {
            Ok(normal) => {
                let mut draw = || normal.sample(&mut rng).clamp(-half, half).round();
                (0..n)
                    .map(|_| ((draw(), draw()), (draw(), draw())))
                    .collect()
            }
            Err(_) => Vec::new(),
        };
        BriefPattern { pairs }
    }
}

impl Orb {
    pub fn with_n_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    /// Number of features requested from each pyramid level.
    fn level_quotas(&self) -> Vec<usize> {
        let factor = 1.0 / self.scale_factor;
        let n = self.n_levels as i32;
        let first = self.n_features as f32 * (1.0 - factor) / (1.0 - factor.powi(n));
        let mut quotas: Vec<usize> = (0..n)
            .map(|level| (first * factor.powi(level)).round() as usize)
            .collect();
        let assigned: usize = quotas.iter().sum();
        if let Some(last) = quotas.last_mut() {
            *last += self.n_features.saturating_sub(assigned);
        }
        quotas
    }

    /// Harris measure over a Gaussian-weighted 7x7 window.
    fn harris_response(&self, plane: &Plane, x: usize, y: usize) -> f32 {
        let (mut sxx, mut syy, mut sxy) = (0.0f32, 0.0f32, 0.0f32);
        for dy in -HARRIS_RADIUS..=HARRIS_RADIUS {
            for dx in -HARRIS_RADIUS..=HARRIS_RADIUS {
                let (px, py) = ((x as isize + dx) as usize, (y as isize + dy) as usize);
                let (gx, gy) = plane.gradient(px, py);
                let w = (-((dx * dx + dy * dy) as f32) / (2.0 * HARRIS_SIGMA * HARRIS_SIGMA)).exp();
                sxx += w * gx * gx;
                syy += w * gy * gy;
                sxy += w * gx * gy;
            }
        }
        let det = sxx * syy - sxy * sxy;
        let trace = sxx + syy;
        det - self.harris_k * trace * trace
    }

    /// Sub-pixel position of the Harris peak nearest a corner, in level pixels.
    ///
    /// Climbs to the local maximum of the response, then fits a parabola
    /// through it and its neighbours along each axis.
    fn refine_position(&self, plane: &Plane, x: usize, y: usize) -> (f32, f32) {
        let margin = HARRIS_RADIUS + 2;
        let (mut cx, mut cy) = (x, y);
        let mut best = self.harris_response(plane, cx, cy);
        for _ in 0..MAX_CLIMB_STEPS {
            let mut next = None;
            for (dx, dy) in NEIGHBOURS {
                let (nx, ny) = (cx as isize + dx, cy as isize + dy);
                if !plane.contains(nx, ny, margin) {
                    continue;
                }
                let r = self.harris_response(plane, nx as usize, ny as usize);
                if r > best {
                    best = r;
                    next = Some((nx as usize, ny as usize));
                }
            }
            match next {
                Some((nx, ny)) => (cx, cy) = (nx, ny),
                None => break,
            }
        }
        if !plane.contains(cx as isize, cy as isize, margin) {
            return (cx as f32, cy as f32);
        }
        let at = |dx: isize, dy: isize| {
            self.harris_response(plane, (cx as isize + dx) as usize, (cy as isize + dy) as usize)
        };
        let ox = super::parabola_peak(at(-1, 0), best, at(1, 0));
        let oy = super::parabola_peak(at(0, -1), best, at(0, 1));
        (cx as f32 + ox, cy as f32 + oy)
    }

    /// Orientation of the intensity centroid over a disc of radius patch/2.
    fn intensity_centroid_angle(&self, plane: &Plane, x: usize, y: usize) -> f32 {
        let r = (self.patch_size / 2) as isize;
        let (mut m10, mut m01) = (0.0f32, 0.0f32);
        for dy in -r..=r {
            let span = ((r * r - dy * dy) as f32).sqrt() as isize;
            for dx in -span..=span {
                let v = plane.get_clamped(x as isize + dx, y as isize + dy);
                m10 += dx as f32 * v;
                m01 += dy as f32 * v;
            }
        }
        super::wrap_angle(m01.atan2(m10))
    }

    fn describe(
        &self,
        smoothed: &Plane,
        pattern: &BriefPattern,
        x: usize,
        y: usize,
        angle: f32,
    ) -> [u8; DESCRIPTOR_BITS / 8] {
        let (sin, cos) = angle.sin_cos();
        let at = |(px, py): (f32, f32)| {
            let rx = cos * px - sin * py;
            let ry = sin * px + cos * py;
            smoothed.get_clamped(
                (x as f32 + rx).round() as isize,
                (y as f32 + ry).round() as isize,
            )
        };
        let mut bits = BitPacker::<{ DESCRIPTOR_BITS / 8 }>::new();
        for &(a, b) in &pattern.pairs {
            bits.push(at(a) < at(b));
        }
        bits.finish()
    }
}

impl DetectDescribe for Orb {
    fn detect_and_describe(&self, gray: &GrayImage) -> FeatureSet {
        let base = Plane::from_gray(gray, 1.0);
        let pattern = BriefPattern::gaussian(DESCRIPTOR_BITS, self.patch_size, PATTERN_SEED);
        let quotas = self.level_quotas();

        let mut keypoints = Vec::new();
        let mut data = Vec::new();
        let mut scale = 1.0f32;
        for (level, quota) in quotas.into_iter().enumerate() {
            let plane = if level == 0 {
                base.clone()
            } else {
                base.downscaled(scale)
            };
            if plane.width() <= 2 * self.edge_threshold || plane.height() <= 2 * self.edge_threshold
            {
                break;
            }
            let sx = base.width() as f32 / plane.width() as f32;
            let sy = base.height() as f32 / plane.height() as f32;

            let mut candidates: Vec<(fast::Corner, f32)> =
                fast::detect(&plane, self.fast_threshold, self.edge_threshold)
                    .into_iter()
                    .map(|c| {
                        let response = self.harris_response(&plane, c.x, c.y);
                        (c, response)
                    })
                    .collect();
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
            candidates.truncate(quota);
            log::trace!("orb level {} kept {} corners", level, candidates.len());

            let smoothed = plane.blurred(2.0);
            for (corner, response) in candidates {
                let angle = self.intensity_centroid_angle(&plane, corner.x, corner.y);
                let descriptor = self.describe(&smoothed, &pattern, corner.x, corner.y, angle);
                let (lx, ly) = self.refine_position(&plane, corner.x, corner.y);
                keypoints.push(Keypoint {
                    x: (lx + 0.5) * sx - 0.5,
                    y: (ly + 0.5) * sy - 0.5,
                    scale: self.patch_size as f32 * scale,
                    orientation: angle,
                    response,
                    octave: level,
                });
                data.extend_from_slice(&descriptor);
            }
            scale *= self.scale_factor;
        }

        FeatureSet {
            method: FeatureMethod::Orb,
            keypoints,
            descriptors: Descriptors::Binary {
                bytes: DESCRIPTOR_BITS / 8,
                data,
            },
        }
    }
}
