//! 体素分类器能力接口.
//!
//! 网络结构与推理不在本库范围内. 这里只约定分类器的输入输出:
//! 重采样后的强度体进, 与之逐体素对齐的标签体出.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::consts::label;
use crate::{CacError, CacResult, GridAttr, LabelVolume, Volume};

/// 分类器在两阶段流程中承担的角色.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ClassifierRole {
    /// 候选检测器. 输出 7 类标签体.
    CandidateDetector,

    /// 假阳性抑制器. 在候选体素上输出 0/1 接受掩码.
    FalsePositiveReducer,
}

impl ClassifierRole {
    /// 日志与失败记录中使用的阶段名.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CandidateDetector => "candidates",
            Self::FalsePositiveReducer => "reduced",
        }
    }
}

impl fmt::Display for ClassifierRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 体素分类器.
///
/// 实现必须是无状态的, 或自行保证并发安全: 批处理时多个受试者会在不同线程上
/// 同时调用 `classify`.
pub trait VoxelClassifier: Send + Sync {
    /// 分类器角色.
    fn role(&self) -> ClassifierRole;

    /// 对 `volume` 逐体素分类.
    ///
    /// 假阳性抑制器会收到候选检测的结果 `candidates`; 候选检测器收到 `None`.
    fn classify(
        &self,
        subject_id: &str,
        volume: &Volume,
        candidates: Option<&LabelVolume>,
    ) -> CacResult<LabelVolume>;
}

/// 检查分类器输出是否可用: 与 `volume` 处于同一网格, 且标签值在角色允许的范围内.
pub fn validate_output(
    role: ClassifierRole,
    output: &LabelVolume,
    volume: &Volume,
) -> CacResult<()> {
    output.ensure_paired(volume, role.name())?;
    let ok = match role {
        ClassifierRole::CandidateDetector => output.is_well_formed(),
        ClassifierRole::FalsePositiveReducer => output.data().iter().all(|p| *p <= 1),
    };
    if ok {
        Ok(())
    } else {
        Err(CacError::Classifier(format!(
            "{role} 输出包含非法标签值 {:?}",
            output.labels_present()
        )))
    }
}

/// 用假阳性抑制器的接受掩码过滤候选标签体.
///
/// 掩码为 0 的体素被置为背景, 其余保留候选类别.
pub fn apply_reduction(candidates: &LabelVolume, accept: &LabelVolume) -> CacResult<LabelVolume> {
    candidates.ensure_paired(accept, "候选标签与接受掩码")?;
    let mut out = candidates.clone();
    out.data_mut()
        .iter_mut()
        .zip(accept.data().iter())
        .filter(|(_, a)| **a == 0)
        .for_each(|(p, _)| *p = label::BACKGROUND);
    Ok(out)
}

/// 从目录加载离线推理结果的分类器. 文件名为 `{subject_id}.npz`.
#[derive(Clone, Debug)]
pub struct PrecomputedLabels {
    dir: PathBuf,
    role: ClassifierRole,
}

impl PrecomputedLabels {
    /// 以 `dir` 为结果目录, 承担 `role` 角色.
    pub fn new<P: AsRef<Path>>(dir: P, role: ClassifierRole) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            role,
        }
    }

    /// 受试者 `subject_id` 对应的结果文件路径.
    #[inline]
    pub fn path_of(&self, subject_id: &str) -> PathBuf {
        self.dir.join(format!("{subject_id}.npz"))
    }
}

impl VoxelClassifier for PrecomputedLabels {
    fn role(&self) -> ClassifierRole {
        self.role
    }

    fn classify(
        &self,
        subject_id: &str,
        volume: &Volume,
        _candidates: Option<&LabelVolume>,
    ) -> CacResult<LabelVolume> {
        let path = self.path_of(subject_id);
        if !path.is_file() {
            return Err(CacError::Classifier(format!(
                "{} 中没有受试者 `{subject_id}` 的 {} 结果",
                self.dir.display(),
                self.role
            )));
        }
        debug!("loading precomputed {} labels from {}", self.role, path.display());
        let labels = LabelVolume::load_npz(&path)?;
        validate_output(self.role, &labels, volume)?;
        Ok(labels)
    }
}
