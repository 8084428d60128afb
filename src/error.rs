use std::fmt;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, StitchError>;

#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("unsupported feature method `{0}`, expected one of: sift, brisk, orb")]
    UnsupportedMethod(String),

    #[error("insufficient correspondences: found {found}, need at least {needed}")]
    InsufficientCorrespondences { found: usize, needed: usize },

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("canvas of {width}x{height} pixels exceeds the configured limit")]
    CanvasTooLarge { width: u64, height: u64 },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Load,
    Features,
    Matching,
    Homography,
    Compositing,
    Output,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "configuration",
            Stage::Load => "image loading",
            Stage::Features => "feature extraction",
            Stage::Matching => "matching",
            Stage::Homography => "homography estimation",
            Stage::Compositing => "compositing",
            Stage::Output => "output",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StitchError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: StitchError) -> PipelineError {
        PipelineError { stage, source }
    }
}

/// Attach a stage to a library error.
pub trait AtStage<T> {
    fn at_stage(self, stage: Stage) -> std::result::Result<T, PipelineError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at_stage(self, stage: Stage) -> std::result::Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}
