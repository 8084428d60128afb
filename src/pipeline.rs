use std::path::{Path, PathBuf};

use image::RgbImage;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;

use crate::color::hist_match;
use crate::config::StitchConfig;
use crate::error::{self, AtStage, PipelineError, Stage, StitchError};
use crate::features::{extract_features, FeatureMethod, FeatureSet};
use crate::io::{load_rgb, save_rgb, timestamp_now, write_report, StitchReport};
use crate::matching::{get_pair_matches, PairMatch, MIN_CORRESPONDENCES};
use crate::optimization::build_homographies;
use crate::rendering::{BlendStrategy, Composite};
use crate::types::Homography;

pub const REPORT_FILE: &str = "report.json";

/// Both composites of a stitched pair and what produced them.
#[derive(Debug, Clone)]
pub struct Panoramas {
    pub brute_force: Composite,
    pub simple_blend: Composite,
    pub homography: Homography,
    pub pair: PairMatch,
    pub keypoints: [usize; 2],
}

impl Panoramas {
    pub fn composite(&self, strategy: BlendStrategy) -> &Composite {
        match strategy {
            BlendStrategy::BruteForce => &self.brute_force,
            BlendStrategy::Simple => &self.simple_blend,
        }
    }
}

/// Stitches `left` into the frame of `right`.
pub fn stitch_images(
    left: &RgbImage,
    right: &RgbImage,
    method: FeatureMethod,
    config: &StitchConfig,
) -> Result<Panoramas, PipelineError> {
    let left = if config.match_histograms {
        log::info!("matching left histogram to right");
        hist_match(left, right)
    } else {
        left.clone()
    };
    let images = [&left, right];

    log::info!("extracting {} features", method);
    let features: Vec<FeatureSet> = images
        .par_iter()
        .progress_count(images.len() as u64)
        .map(|img| extract_features(img, method, &config.features))
        .collect();

    log::info!("matching descriptors");
    let mut pair_matches = get_pair_matches(&features, &config.matching);
    let found = pair_matches
        .first()
        .map_or(0, |pm| pm.correspondences.len());
    if pair_matches.first().is_none_or(|pm| !pm.is_usable()) {
        return Err(PipelineError::new(
            Stage::Matching,
            StitchError::InsufficientCorrespondences {
                found,
                needed: MIN_CORRESPONDENCES,
            },
        ));
    }

    log::info!("estimating homography from {} correspondences", found);
    for result in build_homographies(&mut pair_matches, &features, &config.ransac) {
        result.at_stage(Stage::Homography)?;
    }
    let pair = pair_matches.swap_remove(0);
    let homography = pair
        .homography
        .ok_or_else(|| StitchError::DegenerateGeometry("no homography estimated".to_string()))
        .at_stage(Stage::Homography)?;
    log::info!(
        "homography with {} / {} inliers:{}",
        pair.inliers.len(),
        pair.correspondences.len(),
        homography.matrix()
    );

    let reference = images[pair.reference];
    let warped = images[pair.warped];
    // each strategy is rendered and its failure logged; a stitch succeeds only
    // when both do
    let [brute_force, simple_blend] = BlendStrategy::ALL.map(|strategy| {
        log::info!("rendering {}", strategy.file_name());
        strategy
            .render(reference, warped, &homography, config.max_canvas_pixels)
            .inspect_err(|e| log::warn!("{} failed: {}", strategy.file_name(), e))
    });

    Ok(Panoramas {
        brute_force: brute_force.at_stage(Stage::Compositing)?,
        simple_blend: simple_blend.at_stage(Stage::Compositing)?,
        homography,
        keypoints: [features[0].len(), features[1].len()],
        pair,
    })
}

/// Temporary name of an output inside its own directory, extension kept.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".partial-{}", name))
}

/// Writes both panoramas and the report, all or nothing.
///
/// Everything is encoded under a staging name first and renamed into place
/// afterwards. On any failure the staged files and the outputs already
/// renamed are removed.
fn write_outputs(
    panoramas: &Panoramas,
    report: &StitchReport,
    output_dir: &Path,
) -> error::Result<()> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::new();
    let result = stage_outputs(panoramas, report, output_dir, &mut staged)
        .and_then(|()| commit_outputs(&staged));
    if result.is_err() {
        for (tmp, _) in &staged {
            let _ = std::fs::remove_file(tmp);
        }
    }
    result
}

fn stage_outputs(
    panoramas: &Panoramas,
    report: &StitchReport,
    output_dir: &Path,
    staged: &mut Vec<(PathBuf, PathBuf)>,
) -> error::Result<()> {
    for (strategy, path) in BlendStrategy::ALL.iter().zip(&report.outputs) {
        let tmp = staging_path(path);
        staged.push((tmp.clone(), path.clone()));
        save_rgb(&tmp, &panoramas.composite(*strategy).image)?;
    }
    let path = output_dir.join(REPORT_FILE);
    let tmp = staging_path(&path);
    staged.push((tmp.clone(), path));
    write_report(&tmp, report)
}

fn commit_outputs(staged: &[(PathBuf, PathBuf)]) -> error::Result<()> {
    for (i, (tmp, path)) in staged.iter().enumerate() {
        if let Err(source) = std::fs::rename(tmp, path) {
            for (_, done) in &staged[..i] {
                let _ = std::fs::remove_file(done);
            }
            return Err(StitchError::Io {
                path: path.clone(),
                source,
            });
        }
    }
    Ok(())
}

/// Loads both images, stitches them and writes the panoramas plus a report
/// into `output_dir`. Nothing is written unless both composites succeed, and
/// a failed write leaves none of the outputs behind.
pub fn stitch_files(
    left_path: &Path,
    right_path: &Path,
    method: &str,
    output_dir: &Path,
    config: &StitchConfig,
) -> Result<StitchReport, PipelineError> {
    let method: FeatureMethod = method.parse::<FeatureMethod>().at_stage(Stage::Config)?;
    let left = load_rgb(left_path).at_stage(Stage::Load)?;
    let right = load_rgb(right_path).at_stage(Stage::Load)?;
    log::info!(
        "loaded {} ({}x{}) and {} ({}x{})",
        left_path.display(),
        left.width(),
        left.height(),
        right_path.display(),
        right.width(),
        right.height()
    );

    let panoramas = stitch_images(&left, &right, method, config)?;

    std::fs::create_dir_all(output_dir)
        .map_err(|source| StitchError::Io {
            path: output_dir.to_path_buf(),
            source,
        })
        .at_stage(Stage::Output)?;
    let outputs: Vec<PathBuf> = BlendStrategy::ALL
        .iter()
        .map(|strategy| output_dir.join(strategy.file_name()))
        .collect();

    let canvas = panoramas.simple_blend.image.dimensions();
    let report = StitchReport {
        timestamp: timestamp_now(),
        method,
        left: left_path.to_path_buf(),
        right: right_path.to_path_buf(),
        keypoints: panoramas.keypoints,
        correspondences: panoramas.pair.correspondences.len(),
        inliers: panoramas.pair.inliers.len(),
        homography: panoramas.homography.to_rows(),
        canvas: [canvas.0, canvas.1],
        outputs: outputs.clone(),
    };
    write_outputs(&panoramas, &report, output_dir).at_stage(Stage::Output)?;
    for path in &outputs {
        log::info!("wrote {}", path.display());
    }
    Ok(report)
}
