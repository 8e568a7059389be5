//! 程序运行函数.

use anyhow::{ensure, Context, Result};
use cac_berry::classify::{ClassifierRole, PrecomputedLabels, VoxelClassifier};
use cac_berry::dataset::MetadataTable;
use cac_berry::pipeline::{Pipeline, PipelineConfig};
use cac_berry::score::{concordance, Weighting};
use log::info;
use utils::loader;

use crate::cli::Cli;
use crate::reference::ReferenceScores;
use crate::result::BatchResult;

/// 按命令行参数组装批处理参数.
fn config_from(cli: &Cli) -> Result<PipelineConfig> {
    let input = match &cli.input {
        Some(d) => d.clone(),
        None => loader::input_dir_from_env_or_home().context("cannot locate home directory")?,
    };
    let scratch = match &cli.scratch {
        Some(d) => d.clone(),
        None => loader::scratch_dir_from_env_or_home().context("cannot locate home directory")?,
    };
    ensure!(input.is_dir(), "input directory {} does not exist", input.display());
    if let Some(c) = cli.mass_calibration {
        ensure!(
            c.is_finite() && c > 0.0,
            "mass calibration must be a finite positive number, got {c}"
        );
    }

    let mut config = PipelineConfig::new(input, scratch);
    config.split = cli.split;
    config.kernel = cli.kernel;
    config.score_postprocessed = !cli.no_postprocess;
    config.connectivity = cli.connectivity;
    config.workers = cli.workers.unwrap_or_else(utils::cpus).max(1);
    config.bands = cli.risk_bands;
    config.mass_calibration = cli.mass_calibration;
    Ok(config)
}

/// 实际运行.
pub fn run(cli: &Cli) -> Result<BatchResult> {
    let config = config_from(cli)?;

    let metadata_path = match &cli.metadata {
        Some(p) => p.clone(),
        None => loader::metadata_path_from_env_or_home().context("cannot locate home directory")?,
    };
    let metadata = MetadataTable::load(&metadata_path)
        .with_context(|| format!("failed to load metadata {}", metadata_path.display()))?;
    info!("{} subjects in metadata table", metadata.len());

    let detector: Box<dyn VoxelClassifier> = Box::new(PrecomputedLabels::new(
        &cli.candidates,
        ClassifierRole::CandidateDetector,
    ));
    let reducer = cli.reduced.as_ref().map(|d| {
        Box::new(PrecomputedLabels::new(d, ClassifierRole::FalsePositiveReducer))
            as Box<dyn VoxelClassifier>
    });

    let bands = config.bands;
    let pipeline = Pipeline::new(config, metadata, detector, reducer);
    let report = pipeline.run().context("batch aborted")?;

    let concordance = match &cli.reference {
        Some(p) => {
            let reference = ReferenceScores::load(p)?;
            let pairs = reference.pair_with(&report.records, &bands);
            info!(
                "{} of {} scored subjects have a reference score",
                pairs.len(),
                report.records.len()
            );
            concordance(&pairs, Weighting::Quadratic).map(|c| (pairs.len(), c))
        }
        None => None,
    };

    Ok(BatchResult::new(
        report,
        pipeline.layout().root().to_path_buf(),
        concordance,
    ))
}
