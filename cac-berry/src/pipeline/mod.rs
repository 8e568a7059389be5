//! 批处理编排.
//!
//! 对输入目录下每个被选中的受试者依次执行
//! 重采样 -> 候选检测 -> 假阳性抑制 -> 区域生长 (可选) -> 病灶提取与评分,
//! 每个阶段的产物原子地写入工作目录. 受试者之间不共享可变状态,
//! 单个受试者的失败会被记录, 但不会中断整个批次.

use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::classify::VoxelClassifier;
use crate::consts::Connectivity;
use crate::dataset::{discover, Kernel, MetadataTable, Split, SubjectInput};
use crate::resample::{ResampleSpec, VolumeResampler};
use crate::score::{RiskBands, ScoreRecord};
use crate::CacResult;

mod artifacts;
mod report;
mod stages;

pub use artifacts::{ArtifactLayout, Stage};
pub use report::{write_failures, write_scores, Failure};
pub use stages::SubjectStatus;

use stages::SubjectJob;

#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

/// 单个受试者的处理结果.
pub type SubjectResult = Result<(ScoreRecord, SubjectStatus), Failure>;

/// 批处理参数.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// 原始扫描目录.
    pub input_dir: PathBuf,

    /// 工作目录, 存放中间产物, 失败记录与评分表.
    pub scratch_dir: PathBuf,

    /// 只处理该划分中的受试者.
    pub split: Split,

    /// 若给出, 只处理使用该重建核的受试者.
    pub kernel: Option<Kernel>,

    /// 是否在区域生长后的标签上评分.
    pub score_postprocessed: bool,

    /// 区域生长与病灶提取使用的邻接规则.
    pub connectivity: Connectivity,

    /// 并行处理的受试者个数上限.
    pub workers: usize,

    /// 风险分级配置.
    pub bands: RiskBands,

    /// 质量评分校准系数.
    pub mass_calibration: Option<f64>,

    /// 重采样目标.
    pub resample: ResampleSpec,
}

impl PipelineConfig {
    /// 使用默认参数: 测试集, 不筛选重建核, 在生长后的标签上评分, 26-邻域,
    /// 10/100/400 风险分级, 标准分辨率, 并行度为可用核心数.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input_dir: P, scratch_dir: Q) -> Self {
        Self {
            input_dir: input_dir.into(),
            scratch_dir: scratch_dir.into(),
            split: Split::Test,
            kernel: None,
            score_postprocessed: true,
            connectivity: Connectivity::TwentySix,
            workers: std::thread::available_parallelism().map_or(1, usize::from),
            bands: RiskBands::default(),
            mass_calibration: None,
            resample: ResampleSpec::standard(),
        }
    }
}

/// 决定评分结果的参数. 评分产物记录产生它时的参数,
/// 与本次运行不一致时该产物失效, 从上游产物重新评分.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreSettings {
    /// 是否在区域生长后的标签上评分.
    pub postprocessed: bool,

    /// 区域生长与病灶提取使用的邻接规则.
    pub connectivity: Connectivity,

    /// 风险分级配置.
    pub bands: RiskBands,

    /// 质量评分校准系数.
    pub mass_calibration: Option<f64>,
}

impl PipelineConfig {
    /// 本配置对应的评分参数.
    pub fn score_settings(&self) -> ScoreSettings {
        ScoreSettings {
            postprocessed: self.score_postprocessed,
            connectivity: self.connectivity,
            bands: self.bands,
            mass_calibration: self.mass_calibration,
        }
    }
}

/// 一次批处理运行的汇总.
#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    /// 成功的受试者评分记录, 按 ID 升序.
    pub records: Vec<ScoreRecord>,

    /// 本次运行中重新计算过的受试者个数.
    pub computed: usize,

    /// 直接复用评分产物的受试者个数.
    pub resumed: usize,

    /// 因划分或重建核不匹配而跳过的受试者个数.
    pub filtered: usize,

    /// 失败的受试者.
    pub failures: Vec<Failure>,
}

/// 批处理编排器.
pub struct Pipeline {
    config: PipelineConfig,
    layout: ArtifactLayout,
    metadata: MetadataTable,
    resampler: VolumeResampler,
    detector: Box<dyn VoxelClassifier>,
    reducer: Option<Box<dyn VoxelClassifier>>,
}

impl Pipeline {
    /// 创建编排器.
    ///
    /// `reducer` 为 `None` 时跳过假阳性抑制, 候选结果直接作为抑制后的结果.
    pub fn new(
        config: PipelineConfig,
        metadata: MetadataTable,
        detector: Box<dyn VoxelClassifier>,
        reducer: Option<Box<dyn VoxelClassifier>>,
    ) -> Self {
        Self {
            layout: ArtifactLayout::new(&config.scratch_dir).with_connectivity(config.connectivity),
            resampler: VolumeResampler::new(config.resample),
            config,
            metadata,
            detector,
            reducer,
        }
    }

    /// 批处理参数.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 产物布局.
    #[inline]
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// 处理单个受试者. 失败时返回出错的阶段与错误.
    pub fn process(&self, input: &SubjectInput) -> SubjectResult {
        SubjectJob::new(self, input)
            .run()
            .map_err(|(stage, e)| Failure::new(&input.subject_id, stage, &e))
    }

    /// 运行整个批次.
    ///
    /// 只有工作目录无法创建, 输入目录无法读取, 或汇总文件无法写出时才返回 `Err`;
    /// 受试者级别的错误记录在 [`BatchReport::failures`] 与 `failures.tsv` 中.
    pub fn run(&self) -> CacResult<BatchReport> {
        self.layout.create_dirs()?;
        let mut report = BatchReport::default();

        let mut selected = vec![];
        for input in discover(&self.config.input_dir)? {
            match self
                .metadata
                .selects(&input.subject_id, self.config.split, self.config.kernel)
            {
                Ok(true) => selected.push(input),
                Ok(false) => report.filtered += 1,
                Err(e) => report
                    .failures
                    .push(Failure::new(&input.subject_id, Stage::Load, &e)),
            }
        }
        info!(
            "{} subjects selected ({} filtered out, {} without metadata), {} workers",
            selected.len(),
            report.filtered,
            report.failures.len(),
            self.config.workers
        );

        for (input, res) in selected.iter().zip(self.process_all(&selected)?) {
            match res {
                Ok((record, status)) => {
                    match status {
                        SubjectStatus::Computed => report.computed += 1,
                        SubjectStatus::Resumed => report.resumed += 1,
                    }
                    report.records.push(record);
                }
                Err(f) => {
                    warn!(
                        "{}: failed at stage {} ({}): {}",
                        input.subject_id, f.stage, f.kind, f.message
                    );
                    report.failures.push(f);
                }
            }
        }
        report.failures.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));

        write_failures(self.layout.failures_path(), &report.failures)?;
        write_scores(self.layout.scores_path(), &report.records)?;
        info!(
            "batch finished: {} computed, {} resumed, {} failed",
            report.computed,
            report.resumed,
            report.failures.len()
        );
        Ok(report)
    }

    /// 处理全部受试者, 结果与输入一一对应. 同时处理的受试者不超过 `workers` 个.
    #[cfg(feature = "rayon")]
    fn process_all(&self, inputs: &[SubjectInput]) -> CacResult<Vec<SubjectResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(pool.install(|| inputs.par_iter().map(|i| self.process(i)).collect()))
    }

    /// 处理全部受试者, 结果与输入一一对应.
    #[cfg(not(feature = "rayon"))]
    fn process_all(&self, inputs: &[SubjectInput]) -> CacResult<Vec<SubjectResult>> {
        Ok(inputs.iter().map(|i| self.process(i)).collect())
    }
}
