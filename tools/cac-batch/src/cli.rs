//! 命令行参数.

use std::path::PathBuf;

use cac_berry::consts::Connectivity;
use cac_berry::dataset::{Kernel, Split};
use cac_berry::score::RiskBands;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "cac-batch",
    version,
    about = "Coronary artery calcium scoring over a directory of chest CT scans"
)]
pub struct Cli {
    #[arg(
        long,
        help = "Raw scan directory [default: $CAC_INPUT_DIR or ~/dataset/cac/input]"
    )]
    pub input: Option<PathBuf>,

    #[arg(
        long,
        help = "Scratch/output directory [default: $CAC_SCRATCH_DIR or ~/dataset/cac/scratch]"
    )]
    pub scratch: Option<PathBuf>,

    #[arg(
        long,
        help = "Dataset metadata table [default: $CAC_METADATA or ~/dataset/cac/metadata.tsv]"
    )]
    pub metadata: Option<PathBuf>,

    #[arg(long, help = "Directory of candidate label volumes, one `{id}.npz` per subject")]
    pub candidates: PathBuf,

    #[arg(
        long,
        help = "Directory of false-positive reduction masks; candidates pass through when omitted"
    )]
    pub reduced: Option<PathBuf>,

    #[arg(long, default_value_t = Split::Test, help = "Split to process: train|valid|test")]
    pub split: Split,

    #[arg(long, help = "Only process scans reconstructed with this kernel: soft|sharp")]
    pub kernel: Option<Kernel>,

    #[arg(long, default_value_t = false, help = "Score classifier output without region growing")]
    pub no_postprocess: bool,

    #[arg(long, default_value = "26", help = "Voxel connectivity: 6|26")]
    pub connectivity: Connectivity,

    #[arg(long, help = "Number of subjects processed concurrently [default: CPU count]")]
    pub workers: Option<usize>,

    #[arg(
        long,
        default_value = "10,100,400",
        help = "Upper bounds of the minimal, mild and moderate risk categories"
    )]
    pub risk_bands: RiskBands,

    #[arg(long, help = "Mass score calibration factor in mg/(HU*mm^3)")]
    pub mass_calibration: Option<f64>,

    #[arg(
        long,
        help = "Reference score table (`subject_id`, `agatston_score`) for risk concordance"
    )]
    pub reference: Option<PathBuf>,

    #[arg(short, long, default_value_t = false, help = "Enable debug logging")]
    pub verbose: bool,
}
