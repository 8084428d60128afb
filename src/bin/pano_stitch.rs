use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use pano_stitch::{stitch_files, StitchConfig};

#[derive(Parser)]
#[command(version, about, author)]
struct PanoCli {
    /// image warped into the frame of the right image
    #[arg(long)]
    left: PathBuf,

    /// reference image
    #[arg(long)]
    right: PathBuf,

    /// feature method: ["sift", "brisk", "orb"]
    #[arg(long, default_value = "sift")]
    method: String,

    /// output folder
    #[arg(long, default_value = "results")]
    output: PathBuf,

    /// RANSAC seed
    #[arg(long)]
    seed: Option<u64>,

    /// json file with a StitchConfig
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = PanoCli::parse();

    let mut config = match &cli.config {
        Some(path) => match StitchConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{}", pano_stitch::PipelineError::new(pano_stitch::Stage::Config, e));
                std::process::exit(1);
            }
        },
        None => StitchConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.ransac.seed = seed;
    }

    let now = Instant::now();
    match stitch_files(&cli.left, &cli.right, &cli.method, &cli.output, &config) {
        Ok(report) => {
            log::info!(
                "stitched {}x{} panorama with {} inliers in {:.3} sec",
                report.canvas[0],
                report.canvas[1],
                report.inliers,
                now.elapsed().as_secs_f64()
            );
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
