//! 中间产物目录布局.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::consts::Connectivity;
use crate::CacResult;

/// 处理流程的阶段. 每个阶段的输出是一个按受试者存放的产物.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Stage {
    /// 读取元数据与原始扫描. 不产生产物.
    Load,

    /// 重采样, `resampled/{id}.npz`.
    Resample,

    /// 候选检测, `candidates/{id}.npz`.
    Candidates,

    /// 假阳性抑制, `reduced/{id}.npz`.
    Reduce,

    /// 区域生长, `grown/c{6|26}/{id}.npz`. 按邻接规则分目录存放.
    Grow,

    /// 病灶提取与评分, `scores/{id}.bin`.
    Score,
}

impl Stage {
    /// 所有产生产物的阶段, 按执行顺序.
    pub const PRODUCING: [Stage; 5] = [
        Self::Resample,
        Self::Candidates,
        Self::Reduce,
        Self::Grow,
        Self::Score,
    ];

    /// 失败记录中使用的阶段名.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Resample => "resample",
            Self::Candidates => "candidates",
            Self::Reduce => "reduce",
            Self::Grow => "grow",
            Self::Score => "score",
        }
    }

    /// 产物子目录与扩展名. `Load` 没有产物.
    const fn location(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Load => None,
            Self::Resample => Some(("resampled", "npz")),
            Self::Candidates => Some(("candidates", "npz")),
            Self::Reduce => Some(("reduced", "npz")),
            Self::Grow => Some(("grown", "npz")),
            Self::Score => Some(("scores", "bin")),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 工作目录下的产物布局. 显式地在各阶段之间传递, 不依赖全局状态.
#[derive(Clone, Debug)]
pub struct ArtifactLayout {
    root: PathBuf,
    connectivity: Connectivity,
}

impl ArtifactLayout {
    /// 以 `root` 为工作目录, 区域生长使用默认的 26-邻域.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            connectivity: Connectivity::default(),
        }
    }

    /// 替换区域生长产物对应的邻接规则.
    #[inline]
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// 工作目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `stage` 的产物目录与扩展名. `Stage::Load` 返回 `None`.
    fn dir(&self, stage: Stage) -> Option<(PathBuf, &'static str)> {
        let (dir, ext) = stage.location()?;
        let mut path = self.root.join(dir);
        if stage == Stage::Grow {
            path.push(format!("c{}", self.connectivity.name()));
        }
        Some((path, ext))
    }

    /// 创建所有产物子目录.
    pub fn create_dirs(&self) -> CacResult<()> {
        for (dir, _) in Stage::PRODUCING.iter().filter_map(|s| self.dir(*s)) {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// 受试者 `subject_id` 在 `stage` 的产物路径. `Stage::Load` 返回 `None`.
    pub fn path(&self, stage: Stage, subject_id: &str) -> Option<PathBuf> {
        let (dir, ext) = self.dir(stage)?;
        Some(dir.join(format!("{subject_id}.{ext}")))
    }

    /// 产物是否已存在.
    #[inline]
    pub fn exists(&self, stage: Stage, subject_id: &str) -> bool {
        self.path(stage, subject_id).map_or(false, |p| p.is_file())
    }

    /// 失败记录文件路径.
    #[inline]
    pub fn failures_path(&self) -> PathBuf {
        self.root.join("failures.tsv")
    }

    /// 评分导出文件路径.
    #[inline]
    pub fn scores_path(&self) -> PathBuf {
        self.root.join("scores.tsv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let l = ArtifactLayout::new("/scratch");
        assert_eq!(
            l.path(Stage::Resample, "p1"),
            Some(PathBuf::from("/scratch/resampled/p1.npz"))
        );
        assert_eq!(
            l.path(Stage::Score, "p1"),
            Some(PathBuf::from("/scratch/scores/p1.bin"))
        );
        assert_eq!(
            l.path(Stage::Grow, "p1"),
            Some(PathBuf::from("/scratch/grown/c26/p1.npz"))
        );
        assert_eq!(
            l.clone().with_connectivity(Connectivity::Six).path(Stage::Grow, "p1"),
            Some(PathBuf::from("/scratch/grown/c6/p1.npz"))
        );
        assert_eq!(l.path(Stage::Load, "p1"), None);
        assert_eq!(l.failures_path(), PathBuf::from("/scratch/failures.tsv"));
    }

    #[test]
    fn test_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let l = ArtifactLayout::new(dir.path());
        l.create_dirs().unwrap();
        for d in ["resampled", "candidates", "reduced", "grown/c26", "scores"] {
            assert!(dir.path().join(d).is_dir());
        }
        assert!(!l.exists(Stage::Grow, "x"));
    }
}
