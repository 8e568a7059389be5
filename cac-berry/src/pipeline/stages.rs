//! 单个受试者的类型化阶段函数.
//!
//! 每个阶段先检查自己的产物是否存在: 存在则直接加载, 不再调用上游阶段;
//! 否则从上游产物计算并原子地写出. 于是中断后重新运行只会补齐缺失的部分.

use std::path::PathBuf;
use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{Pipeline, ScoreSettings, Stage};
use crate::artifact::{load_bincode, save_bincode};
use crate::classify::{apply_reduction, validate_output, ClassifierRole};
use crate::dataset::SubjectInput;
use crate::lesion::LesionExtractor;
use crate::post_proc::RegionGrower;
use crate::score::{ScoreEngine, ScoreRecord};
use crate::{CacError, CacResult, LabelVolume, Volume};

/// 带阶段信息的错误.
pub(crate) type StageResult<T> = Result<T, (Stage, CacError)>;

trait AtStage<T> {
    fn at(self, stage: Stage) -> StageResult<T>;
}

impl<T> AtStage<T> for CacResult<T> {
    #[inline]
    fn at(self, stage: Stage) -> StageResult<T> {
        self.map_err(|e| (stage, e))
    }
}

/// 评分产物: 评分记录及产生它的参数.
#[derive(Serialize, Deserialize)]
struct ScoreArtifact {
    settings: ScoreSettings,
    record: ScoreRecord,
}

/// 受试者的处理结果.
#[derive(Clone, Debug, PartialEq)]
pub enum SubjectStatus {
    /// 至少有一个阶段被重新计算.
    Computed,

    /// 评分产物已存在且参数一致, 直接加载.
    Resumed,
}

/// 一个受试者在一次运行中的处理上下文.
pub(crate) struct SubjectJob<'a> {
    pipeline: &'a Pipeline,
    input: &'a SubjectInput,
}

impl<'a> SubjectJob<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline, input: &'a SubjectInput) -> Self {
        Self { pipeline, input }
    }

    #[inline]
    fn id(&self) -> &str {
        &self.input.subject_id
    }

    fn artifact(&self, stage: Stage) -> StageResult<PathBuf> {
        self.pipeline
            .layout
            .path(stage, self.id())
            .ok_or_else(|| {
                let e = CacError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("阶段 {stage} 没有产物"),
                ));
                (stage, e)
            })
    }

    /// 若产物存在则加载, 否则计算并保存.
    fn cached<T, L, C, S>(&self, stage: Stage, load: L, compute: C, save: S) -> StageResult<T>
    where
        L: FnOnce(&PathBuf) -> CacResult<T>,
        C: FnOnce() -> StageResult<T>,
        S: FnOnce(&T, &PathBuf) -> CacResult<()>,
    {
        let path = self.artifact(stage)?;
        if path.is_file() {
            debug!("{}: reusing {stage} artifact", self.id());
            return load(&path).at(stage);
        }
        let start = Instant::now();
        let value = compute()?;
        save(&value, &path).at(stage)?;
        debug!(
            "{}: stage {stage} finished in {} ms",
            self.id(),
            start.elapsed().as_millis()
        );
        Ok(value)
    }

    /// 重采样后的强度体.
    fn resampled(&self) -> StageResult<Volume> {
        self.cached(
            Stage::Resample,
            |p| Volume::load_npz(p),
            || {
                let meta = self.pipeline.metadata.get(self.id()).at(Stage::Load)?;
                let raw = self.input.open(meta.slice_order).at(Stage::Load)?;
                self.pipeline
                    .resampler
                    .resample(&raw, meta.slice_thickness)
                    .at(Stage::Resample)
            },
            |v, p| v.save_npz(p),
        )
    }

    /// 候选检测结果.
    fn candidates(&self, volume: &Volume) -> StageResult<LabelVolume> {
        self.cached(
            Stage::Candidates,
            |p| LabelVolume::load_npz(p),
            || {
                let c = &self.pipeline.detector;
                let out = c.classify(self.id(), volume, None).at(Stage::Candidates)?;
                validate_output(ClassifierRole::CandidateDetector, &out, volume)
                    .at(Stage::Candidates)?;
                Ok(out)
            },
            |v, p| v.save_npz(p),
        )
    }

    /// 假阳性抑制后的标签体. 未配置抑制器时等同于候选结果.
    fn reduced(&self, volume: &Volume) -> StageResult<LabelVolume> {
        self.cached(
            Stage::Reduce,
            |p| LabelVolume::load_npz(p),
            || {
                let candidates = self.candidates(volume)?;
                let Some(reducer) = self.pipeline.reducer.as_ref() else {
                    return Ok(candidates);
                };
                let accept = reducer
                    .classify(self.id(), volume, Some(&candidates))
                    .at(Stage::Reduce)?;
                validate_output(ClassifierRole::FalsePositiveReducer, &accept, volume)
                    .at(Stage::Reduce)?;
                apply_reduction(&candidates, &accept).at(Stage::Reduce)
            },
            |v, p| v.save_npz(p),
        )
    }

    /// 区域生长后的标签体.
    fn grown(&self, volume: &Volume) -> StageResult<LabelVolume> {
        self.cached(
            Stage::Grow,
            |p| LabelVolume::load_npz(p),
            || {
                let reduced = self.reduced(volume)?;
                RegionGrower::new(self.pipeline.config.connectivity)
                    .grow_from_labels(&reduced, volume)
                    .at(Stage::Grow)
            },
            |v, p| v.save_npz(p),
        )
    }

    /// 从重采样体与 (生长后或抑制后的) 标签体计算评分记录.
    fn score(&self) -> StageResult<ScoreRecord> {
        let config = &self.pipeline.config;
        let volume = self.resampled()?;
        let labels = if config.score_postprocessed {
            self.grown(&volume)?
        } else {
            self.reduced(&volume)?
        };
        let lesions = LesionExtractor::new(config.connectivity)
            .extract(&labels, &volume)
            .at(Stage::Score)?;
        ScoreEngine::new(config.bands)
            .with_mass_calibration(config.mass_calibration)
            .score(self.id(), &lesions)
            .at(Stage::Score)
    }

    /// 评分记录.
    ///
    /// 评分产物存在且其参数与本次运行一致时直接加载; 参数不一致时重新评分并覆盖,
    /// 上游产物照常复用.
    fn scored(&self) -> StageResult<(ScoreRecord, SubjectStatus)> {
        let path = self.artifact(Stage::Score)?;
        let settings = self.pipeline.config.score_settings();
        if path.is_file() {
            let saved: ScoreArtifact = load_bincode(&path).at(Stage::Score)?;
            if saved.settings == settings {
                debug!("{}: reusing score artifact", self.id());
                return Ok((saved.record, SubjectStatus::Resumed));
            }
            info!("{}: scoring settings changed, rescoring", self.id());
        }

        let start = Instant::now();
        let artifact = ScoreArtifact {
            settings,
            record: self.score()?,
        };
        save_bincode(&artifact, &path).at(Stage::Score)?;
        debug!(
            "{}: stage {} finished in {} ms",
            self.id(),
            Stage::Score,
            start.elapsed().as_millis()
        );
        Ok((artifact.record, SubjectStatus::Computed))
    }

    /// 执行全部阶段.
    pub(crate) fn run(&self) -> StageResult<(ScoreRecord, SubjectStatus)> {
        self.scored()
    }
}
