use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, StitchError};

fn io_error(path: &Path, source: std::io::Error) -> StitchError {
    StitchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Serializes an object to a pretty JSON file.
pub fn object_to_json<T: Serialize>(output_path: &Path, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object).map_err(|source| StitchError::Config {
        path: output_path.to_path_buf(),
        source,
    })?;
    std::fs::write(output_path, j).map_err(|e| io_error(output_path, e))
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(file_path).map_err(|e| io_error(file_path, e))?;
    serde_json::from_str(&contents).map_err(|source| StitchError::Config {
        path: file_path.to_path_buf(),
        source,
    })
}

/// Decodes any supported image format into 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let reader = ImageReader::open(path).map_err(|e| io_error(path, e))?;
    let reader = reader.with_guessed_format().map_err(|e| io_error(path, e))?;
    let img = reader.decode().map_err(|source| StitchError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Encodes an image, the format following the file extension.
pub fn save_rgb(path: &Path, img: &RgbImage) -> Result<()> {
    img.save(path).map_err(|source| StitchError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Summary of a stitching run, written as `report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct StitchReport {
    pub timestamp: String,
    pub method: crate::features::FeatureMethod,
    pub left: PathBuf,
    pub right: PathBuf,
    pub keypoints: [usize; 2],
    pub correspondences: usize,
    pub inliers: usize,
    /// row-major, maps left image pixels into the right image frame
    pub homography: [[f64; 3]; 3],
    pub canvas: [u32; 2],
    pub outputs: Vec<PathBuf>,
}

/// Local time in RFC 3339, UTC when the local offset is unknown.
pub fn timestamp_now() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    now.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

pub fn write_report(output_path: &Path, report: &StitchReport) -> Result<()> {
    object_to_json(output_path, report)
}
