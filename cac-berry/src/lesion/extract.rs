//! 连通分量病灶提取.

use std::collections::VecDeque;

use log::debug;
use ndarray::Array3;

use super::Lesion;
use crate::consts::hu::CALCIUM_THRESHOLD;
use crate::consts::{label, CalciumClass, Connectivity};
use crate::{CacError, CacResult, GridAttr, LabelVolume, Volume};

/// 病灶提取器.
///
/// 体素合格当且仅当类别非背景且 HU 不低于门限. 各类别独立求连通分量,
/// 不同类别即使相邻也不会合并. 低于门限的体素不属于任何病灶, 但只要存在一条
/// 由合格体素组成的路径, 连通性就得以保持.
#[derive(Copy, Clone, Debug)]
pub struct LesionExtractor {
    connectivity: Connectivity,
    threshold: f32,
}

impl Default for LesionExtractor {
    fn default() -> Self {
        Self::new(Connectivity::default())
    }
}

impl LesionExtractor {
    /// 以 `connectivity` 为邻接规则创建提取器, 门限为 130 HU.
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            connectivity,
            threshold: CALCIUM_THRESHOLD,
        }
    }

    /// 替换 HU 门限. 低于 130 HU 的门限只用于实验,
    /// 这样提取的病灶在评分时会被拒绝.
    #[inline]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// HU 门限.
    #[inline]
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    #[inline]
    fn qualifies(&self, labels: &LabelVolume, volume: &Volume, pos: (usize, usize, usize)) -> bool {
        !label::is_background(labels[pos]) && volume[pos] >= self.threshold
    }

    /// 提取所有病灶. 结果按首个体素的行优先顺序排列.
    ///
    /// # 注意
    ///
    /// `labels` 与 `volume` 网格不一致时返回 `ShapeMismatch`;
    /// 合格体素上出现未知标签值时返回 `Classifier`.
    pub fn extract(&self, labels: &LabelVolume, volume: &Volume) -> CacResult<Vec<Lesion>> {
        labels.ensure_paired(volume, "标签体与强度体")?;

        let mut visited = Array3::from_elem(labels.shape(), false);
        let mut queue = VecDeque::new();
        let mut lesions = vec![];

        for (start, &p) in labels.data().indexed_iter() {
            if visited[start] || !self.qualifies(labels, volume, start) {
                continue;
            }
            let class = CalciumClass::from_label(p).ok_or_else(|| {
                CacError::Classifier(format!("位置 {start:?} 的标签值 {p} 未知"))
            })?;

            visited[start] = true;
            queue.push_back(start);
            let mut voxels = vec![];
            while let Some(pos) = queue.pop_front() {
                voxels.push(pos);
                for nb in labels.neighbours(pos, self.connectivity) {
                    if !visited[nb] && labels[nb] == p && self.qualifies(labels, volume, nb) {
                        visited[nb] = true;
                        queue.push_back(nb);
                    }
                }
            }
            lesions.push(Lesion::new(class, voxels, volume)?);
        }

        debug!(
            "extracted {} lesions ({:?}-connectivity, threshold {} HU)",
            lesions.len(),
            self.connectivity,
            self.threshold
        );
        Ok(lesions)
    }
}
