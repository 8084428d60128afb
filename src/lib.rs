pub mod color;
pub mod config;
pub mod error;
pub mod features;
pub mod io;
pub mod matching;
pub mod optimization;
pub mod pipeline;
pub mod rendering;
pub mod types;

pub use config::StitchConfig;
pub use error::{PipelineError, Stage, StitchError};
pub use features::{extract_features, FeatureMethod, FeatureSet};
pub use pipeline::{stitch_files, stitch_images, Panoramas};
pub use types::{Homography, Keypoint};
