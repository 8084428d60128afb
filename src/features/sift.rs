//! Scale-invariant feature transform.
//!
//! Difference-of-Gaussian extrema with sub-pixel refinement, dominant
//! gradient orientations and the 4x4x8 gradient histogram descriptor.

use std::f32::consts::TAU;

use image::GrayImage;
use nalgebra as na;

use super::descriptor::Descriptors;
use super::plane::Plane;
use super::{wrap_angle, DetectDescribe, FeatureMethod, FeatureSet};
use crate::types::Keypoint;

pub const DESCRIPTOR_LEN: usize = DESC_WIDTH * DESC_WIDTH * DESC_BINS;

const DESC_WIDTH: usize = 4;
const DESC_BINS: usize = 8;
const DESC_MAG_CLIP: f32 = 0.2;
const ORI_BINS: usize = 36;
const ORI_PEAK_RATIO: f32 = 0.8;
const ORI_SIGMA_FACTOR: f32 = 1.5;
const ORI_RADIUS_FACTOR: f32 = 3.0 * ORI_SIGMA_FACTOR;
const DESC_SCALE_FACTOR: f32 = 3.0;
const IMG_BORDER: usize = 5;
const MAX_INTERP_STEPS: usize = 5;
const MIN_SIDE: usize = 16;

#[derive(Debug, Clone)]
pub struct Sift {
    pub n_features: usize,
    pub n_octave_layers: usize,
    pub sigma: f32,
    pub init_sigma: f32,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
}

impl Default for Sift {
    fn default() -> Self {
        Self {
            n_features: 2000,
            n_octave_layers: 3,
            sigma: 1.6,
            init_sigma: 0.5,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
        }
    }
}

struct Octave {
    gaussians: Vec<Plane>,
    dogs: Vec<Plane>,
}

/// Refined extremum in octave coordinates.
struct Extremum {
    octave: usize,
    layer: usize,
    x: usize,
    y: usize,
    offset: (f32, f32, f32),
    response: f32,
}

impl Sift {
    fn octave_count(&self, width: usize, height: usize) -> usize {
        let min_side = width.min(height);
        if min_side < MIN_SIDE {
            return 0;
        }
        let n = (min_side as f32).log2().floor() as isize - 3;
        n.max(1) as usize
    }

    /// Incremental blur applied between consecutive Gaussian images of an octave.
    fn layer_sigmas(&self) -> Vec<f32> {
        let s = self.n_octave_layers;
        let k = 2f32.powf(1.0 / s as f32);
        let mut sigmas = vec![self.sigma; s + 3];
        for (i, sig) in sigmas.iter_mut().enumerate().skip(1) {
            let prev = self.sigma * k.powi(i as i32 - 1);
            let total = prev * k;
            *sig = (total * total - prev * prev).sqrt();
        }
        sigmas
    }

    fn build_pyramid(&self, base: Plane, n_octaves: usize) -> Vec<Octave> {
        let s = self.n_octave_layers;
        let sigmas = self.layer_sigmas();
        let mut octaves: Vec<Octave> = Vec::with_capacity(n_octaves);
        for o in 0..n_octaves {
            let first = match octaves.last() {
                None => base.clone(),
                Some(prev) => prev.gaussians[s].decimated(),
            };
            let mut gaussians = Vec::with_capacity(s + 3);
            gaussians.push(first);
            for sig in sigmas.iter().skip(1) {
                let next = gaussians[gaussians.len() - 1].blurred(*sig);
                gaussians.push(next);
            }
            let dogs = gaussians
                .windows(2)
                .map(|pair| pair[1].difference(&pair[0]))
                .collect();
            log::trace!(
                "sift octave {} at {}x{}",
                o,
                gaussians[0].width(),
                gaussians[0].height()
            );
            octaves.push(Octave { gaussians, dogs });
        }
        octaves
    }

    fn is_extremum(dogs: &[Plane], layer: usize, x: usize, y: usize, value: f32) -> bool {
        for plane in &dogs[layer - 1..=layer + 1] {
            for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    let v = plane.get(nx, ny);
                    if (value > 0.0 && v > value) || (value <= 0.0 && v < value) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Fits a 3-D quadratic around a candidate, moving it until the offset is
    /// under half a sample, then applies the contrast and edge tests.
    fn refine(
        &self,
        octave: usize,
        dogs: &[Plane],
        layer: usize,
        x: usize,
        y: usize,
    ) -> Option<Extremum> {
        let s = self.n_octave_layers;
        let (w, h) = (dogs[0].width(), dogs[0].height());
        let (mut xi, mut yi, mut li) = (x as isize, y as isize, layer as isize);

        for _ in 0..MAX_INTERP_STEPS {
            let (l, px, py) = (li as usize, xi as usize, yi as usize);
            let d = |dl: isize, dx: isize, dy: isize| {
                let plane = &dogs[(l as isize + dl) as usize];
                plane.get((px as isize + dx) as usize, (py as isize + dy) as usize)
            };
            let v = d(0, 0, 0);
            let grad = na::Vector3::new(
                0.5 * (d(0, 1, 0) - d(0, -1, 0)),
                0.5 * (d(0, 0, 1) - d(0, 0, -1)),
                0.5 * (d(1, 0, 0) - d(-1, 0, 0)),
            );
            let dxx = d(0, 1, 0) + d(0, -1, 0) - 2.0 * v;
            let dyy = d(0, 0, 1) + d(0, 0, -1) - 2.0 * v;
            let dss = d(1, 0, 0) + d(-1, 0, 0) - 2.0 * v;
            let dxy = 0.25 * (d(0, 1, 1) - d(0, -1, 1) - d(0, 1, -1) + d(0, -1, -1));
            let dxs = 0.25 * (d(1, 1, 0) - d(1, -1, 0) - d(-1, 1, 0) + d(-1, -1, 0));
            let dys = 0.25 * (d(1, 0, 1) - d(1, 0, -1) - d(-1, 0, 1) + d(-1, 0, -1));
            let hessian = na::Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss);

            let step = -hessian.lu().solve(&grad)?;
            if step.iter().all(|v| v.abs() < 0.5) {
                let contrast = v + 0.5 * grad.dot(&step);
                if contrast.abs() * (s as f32) < self.contrast_threshold {
                    return None;
                }
                let trace = dxx + dyy;
                let det = dxx * dyy - dxy * dxy;
                let r = self.edge_threshold;
                if det <= 0.0 || trace * trace * r >= (r + 1.0) * (r + 1.0) * det {
                    return None;
                }
                return Some(Extremum {
                    octave,
                    layer: l,
                    x: px,
                    y: py,
                    offset: (step[0], step[1], step[2]),
                    response: contrast.abs(),
                });
            }
            if step.iter().any(|v| !v.is_finite() || v.abs() > 1e6) {
                return None;
            }
            xi += step[0].round() as isize;
            yi += step[1].round() as isize;
            li += step[2].round() as isize;
            let border = IMG_BORDER as isize;
            if li < 1
                || li > s as isize
                || xi < border
                || yi < border
                || xi >= w as isize - border
                || yi >= h as isize - border
            {
                return None;
            }
        }
        None
    }

    /// Peaks of the 36-bin gradient orientation histogram, in radians.
    fn orientations(&self, plane: &Plane, x: usize, y: usize, scale: f32) -> Vec<f32> {
        let radius = (ORI_RADIUS_FACTOR * scale).round() as isize;
        let sigma = ORI_SIGMA_FACTOR * scale;
        let denom = 2.0 * sigma * sigma;
        let (w, h) = (plane.width() as isize, plane.height() as isize);

        let mut hist = [0.0f32; ORI_BINS];
        for dy in -radius..=radius {
            let py = y as isize + dy;
            if py <= 0 || py >= h - 1 {
                continue;
            }
            for dx in -radius..=radius {
                let px = x as isize + dx;
                if px <= 0 || px >= w - 1 {
                    continue;
                }
                let (gx, gy) = plane.gradient(px as usize, py as usize);
                let weight = (-((dx * dx + dy * dy) as f32) / denom).exp();
                let angle = wrap_angle(gy.atan2(gx));
                let bin = ((ORI_BINS as f32 * angle / TAU).round() as usize) % ORI_BINS;
                hist[bin] += weight * (gx * gx + gy * gy).sqrt();
            }
        }

        let n = ORI_BINS;
        let smoothed: Vec<f32> = (0..n)
            .map(|i| {
                (hist[(i + n - 2) % n] + hist[(i + 2) % n]) / 16.0
                    + (hist[(i + n - 1) % n] + hist[(i + 1) % n]) * 4.0 / 16.0
                    + hist[i] * 6.0 / 16.0
            })
            .collect();
        let max = smoothed.iter().cloned().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Vec::new();
        }

        let mut peaks = Vec::new();
        for i in 0..n {
            let left = smoothed[(i + n - 1) % n];
            let right = smoothed[(i + 1) % n];
            let v = smoothed[i];
            if v > left && v > right && v >= ORI_PEAK_RATIO * max {
                let mut bin = i as f32 + 0.5 * (left - right) / (left - 2.0 * v + right);
                if bin < 0.0 {
                    bin += n as f32;
                } else if bin >= n as f32 {
                    bin -= n as f32;
                }
                peaks.push(wrap_angle(bin * TAU / n as f32));
            }
        }
        peaks
    }

    fn describe(&self, plane: &Plane, x: usize, y: usize, scale: f32, angle: f32) -> Vec<f32> {
        let d = DESC_WIDTH;
        let n = DESC_BINS;
        let hist_width = DESC_SCALE_FACTOR * scale;
        let diagonal = ((plane.width().pow(2) + plane.height().pow(2)) as f32).sqrt();
        let radius = (hist_width * std::f32::consts::SQRT_2 * (d as f32 + 1.0) * 0.5)
            .round()
            .min(diagonal) as isize;
        let (sin_t, cos_t) = angle.sin_cos();
        let bins_per_rad = n as f32 / TAU;
        let exp_scale = -1.0 / (0.5 * (d * d) as f32);
        let (w, h) = (plane.width() as isize, plane.height() as isize);

        // padded by one cell on each side and two orientation bins for wrap-around
        let stride_c = n + 2;
        let stride_r = (d + 2) * stride_c;
        let mut hist = vec![0.0f32; (d + 2) * stride_r];

        for i in -radius..=radius {
            for j in -radius..=radius {
                let c_rot = (j as f32 * cos_t + i as f32 * sin_t) / hist_width;
                let r_rot = (-(j as f32) * sin_t + i as f32 * cos_t) / hist_width;
                let rbin = r_rot + d as f32 / 2.0 - 0.5;
                let cbin = c_rot + d as f32 / 2.0 - 0.5;
                if rbin <= -1.0 || rbin >= d as f32 || cbin <= -1.0 || cbin >= d as f32 {
                    continue;
                }
                let (px, py) = (x as isize + j, y as isize + i);
                if px <= 0 || py <= 0 || px >= w - 1 || py >= h - 1 {
                    continue;
                }
                let (gx, gy) = plane.gradient(px as usize, py as usize);
                let magnitude = (gx * gx + gy * gy).sqrt();
                let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
                let mut obin = (wrap_angle(gy.atan2(gx)) - angle) * bins_per_rad;
                if obin < 0.0 {
                    obin += n as f32;
                }
                if obin >= n as f32 {
                    obin -= n as f32;
                }

                let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
                let (dr, dc, dobin) = (rbin - r0, cbin - c0, obin - o0);
                let (r0, c0, o0) = ((r0 + 1.0) as usize, (c0 + 1.0) as usize, o0 as usize);
                let v = magnitude * weight;
                for (ri, wr) in [(0, 1.0 - dr), (1, dr)] {
                    for (ci, wc) in [(0, 1.0 - dc), (1, dc)] {
                        for (oi, wo) in [(0, 1.0 - dobin), (1, dobin)] {
                            let idx = (r0 + ri) * stride_r + (c0 + ci) * stride_c + o0 + oi;
                            hist[idx] += v * wr * wc * wo;
                        }
                    }
                }
            }
        }

        let mut desc = Vec::with_capacity(DESCRIPTOR_LEN);
        for r in 1..=d {
            for c in 1..=d {
                let cell = r * stride_r + c * stride_c;
                let mut bins = [0.0f32; DESC_BINS];
                bins.copy_from_slice(&hist[cell..cell + n]);
                bins[0] += hist[cell + n];
                bins[1] += hist[cell + n + 1];
                desc.extend_from_slice(&bins);
            }
        }
        normalize_clipped(&mut desc);
        desc
    }
}

/// Unit-normalise, clip large components, then normalise again.
fn normalize_clipped(desc: &mut [f32]) {
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return;
    }
    let clip = DESC_MAG_CLIP * norm;
    desc.iter_mut().for_each(|v| *v = v.min(clip));
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
    desc.iter_mut().for_each(|v| *v /= norm);
}

impl DetectDescribe for Sift {
    fn detect_and_describe(&self, gray: &GrayImage) -> FeatureSet {
        let (width, height) = (gray.width() as usize, gray.height() as usize);
        let n_octaves = self.octave_count(width, height);
        if n_octaves == 0 {
            return FeatureSet::empty(FeatureMethod::Sift);
        }
        let s = self.n_octave_layers;
        let sig_diff = (self.sigma * self.sigma - self.init_sigma * self.init_sigma)
            .max(0.01)
            .sqrt();
        let base = Plane::from_gray(gray, 1.0 / 255.0).blurred(sig_diff);
        let octaves = self.build_pyramid(base, n_octaves);
        let threshold = 0.5 * self.contrast_threshold / s as f32;

        let mut extrema = Vec::new();
        for (o, octave) in octaves.iter().enumerate() {
            let (w, h) = (octave.dogs[0].width(), octave.dogs[0].height());
            if w <= 2 * IMG_BORDER || h <= 2 * IMG_BORDER {
                continue;
            }
            for layer in 1..=s {
                let dog = &octave.dogs[layer];
                for y in IMG_BORDER..h - IMG_BORDER {
                    for x in IMG_BORDER..w - IMG_BORDER {
                        let v = dog.get(x, y);
                        if v.abs() <= threshold {
                            continue;
                        }
                        if !Self::is_extremum(&octave.dogs, layer, x, y, v) {
                            continue;
                        }
                        if let Some(e) = self.refine(o, &octave.dogs, layer, x, y) {
                            extrema.push(e);
                        }
                    }
                }
            }
        }
        log::trace!("sift refined {} extrema", extrema.len());

        let mut described: Vec<(Keypoint, Vec<f32>)> = Vec::new();
        for e in extrema {
            let octave_scale = 2f32.powi(e.octave as i32);
            let (ox, oy, os) = e.offset;
            let scale = self.sigma * 2f32.powf((e.layer as f32 + os) / s as f32);
            let plane = &octaves[e.octave].gaussians[e.layer];
            for angle in self.orientations(plane, e.x, e.y, scale) {
                let descriptor = self.describe(plane, e.x, e.y, scale, angle);
                let keypoint = Keypoint {
                    x: (e.x as f32 + ox) * octave_scale,
                    y: (e.y as f32 + oy) * octave_scale,
                    scale: 2.0 * scale * octave_scale,
                    orientation: angle,
                    response: e.response,
                    octave: e.octave,
                };
                described.push((keypoint, descriptor));
            }
        }
        described.sort_by(|a, b| b.0.response.total_cmp(&a.0.response));
        described.truncate(self.n_features);

        let mut keypoints = Vec::with_capacity(described.len());
        let mut data = Vec::with_capacity(described.len() * DESCRIPTOR_LEN);
        for (kp, desc) in described {
            keypoints.push(kp);
            data.extend(desc);
        }
        FeatureSet {
            method: FeatureMethod::Sift,
            keypoints,
            descriptors: Descriptors::Float {
                dim: DESCRIPTOR_LEN,
                data,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octave_count_follows_short_side() {
        let sift = Sift::default();
        assert_eq!(sift.octave_count(640, 480), 5);
        assert_eq!(sift.octave_count(20, 20), 1);
        assert_eq!(sift.octave_count(15, 400), 0);
    }

    #[test]
    fn layer_sigmas_compose_to_double_sigma() {
        let sift = Sift::default();
        let sigmas = sift.layer_sigmas();
        assert_eq!(sigmas.len(), 6);
        // blurs over one octave accumulate to 2 * sigma
        let total: f32 = sigmas[..4].iter().map(|s| s * s).sum::<f32>().sqrt();
        assert!((total - 2.0 * sift.sigma).abs() < 1e-4);
    }

    #[test]
    fn clipped_normalisation_gives_unit_vector() {
        let mut desc = vec![0.0f32; DESCRIPTOR_LEN];
        desc[0] = 10.0;
        desc[1] = 1.0;
        normalize_clipped(&mut desc);
        let norm: f32 = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(desc[0] > desc[1]);
    }
}
