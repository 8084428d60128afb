pub mod brisk;
pub mod descriptor;
pub mod fast;
pub mod orb;
pub mod plane;
pub mod sift;

use std::fmt;
use std::str::FromStr;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

pub use brisk::Brisk;
pub use descriptor::Descriptors;
pub use orb::Orb;
pub use sift::Sift;

use crate::error::StitchError;
use crate::types::Keypoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureMethod {
    Sift,
    Brisk,
    Orb,
}

impl FromStr for FeatureMethod {
    type Err = StitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sift" => Ok(FeatureMethod::Sift),
            "brisk" => Ok(FeatureMethod::Brisk),
            "orb" => Ok(FeatureMethod::Orb),
            _ => Err(StitchError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for FeatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureMethod::Sift => "sift",
            FeatureMethod::Brisk => "brisk",
            FeatureMethod::Orb => "orb",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// upper bound on keypoints kept per image, strongest first
    pub max_features: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { max_features: 2000 }
    }
}

/// Keypoints of one image with their descriptors, row `i` describing `keypoints[i]`.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub method: FeatureMethod,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Descriptors,
}

impl FeatureSet {
    pub fn empty(method: FeatureMethod) -> FeatureSet {
        let descriptors = match method {
            FeatureMethod::Sift => Descriptors::Float {
                dim: sift::DESCRIPTOR_LEN,
                data: Vec::new(),
            },
            FeatureMethod::Brisk | FeatureMethod::Orb => Descriptors::Binary {
                bytes: 32,
                data: Vec::new(),
            },
        };
        FeatureSet {
            method,
            keypoints: Vec::new(),
            descriptors,
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

pub trait DetectDescribe {
    fn detect_and_describe(&self, gray: &GrayImage) -> FeatureSet;
}

impl FeatureMethod {
    pub fn detector(&self, config: &FeatureConfig) -> Box<dyn DetectDescribe + Send + Sync> {
        match self {
            FeatureMethod::Sift => Box::new(Sift {
                n_features: config.max_features,
                ..Sift::default()
            }),
            FeatureMethod::Brisk => Box::new(Brisk {
                n_features: config.max_features,
                ..Brisk::default()
            }),
            FeatureMethod::Orb => Box::new(Orb::default().with_n_features(config.max_features)),
        }
    }
}

/// Angle folded into `[0, 2pi)`.
pub(crate) fn wrap_angle(angle: f32) -> f32 {
    let a = angle.rem_euclid(std::f32::consts::TAU);
    if a >= std::f32::consts::TAU { 0.0 } else { a }
}

/// Vertex offset of the parabola through `(-1, left)`, `(0, center)` and
/// `(1, right)`, clamped to half a sample. Zero when `center` is no peak.
pub(crate) fn parabola_peak(left: f32, center: f32, right: f32) -> f32 {
    let curvature = left - 2.0 * center + right;
    if curvature >= 0.0 || curvature.is_nan() {
        return 0.0;
    }
    (0.5 * (left - right) / curvature).clamp(-0.5, 0.5)
}

/// Detects and describes keypoints on the luma of `image`.
pub fn extract_features(
    image: &RgbImage,
    method: FeatureMethod,
    config: &FeatureConfig,
) -> FeatureSet {
    let gray = image::imageops::grayscale(image);
    let features = method.detector(config).detect_and_describe(&gray);
    log::debug!(
        "{} found {} keypoints on {}x{} image",
        method,
        features.len(),
        image.width(),
        image.height()
    );
    features
}
