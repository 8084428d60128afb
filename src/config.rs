use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::FeatureConfig;
use crate::matching::MatchConfig;
use crate::optimization::RansacConfig;

/// Tunables of a stitching run. Fields missing from a JSON file keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    pub features: FeatureConfig,
    pub matching: MatchConfig,
    pub ransac: RansacConfig,
    /// remap the left image's values onto the right image's distribution first
    pub match_histograms: bool,
    pub max_canvas_pixels: u64,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            matching: MatchConfig::default(),
            ransac: RansacConfig::default(),
            match_histograms: true,
            max_canvas_pixels: 64_000_000,
        }
    }
}

impl StitchConfig {
    pub fn from_json_file(path: &Path) -> Result<StitchConfig> {
        crate::io::object_from_json(path)
    }
}
