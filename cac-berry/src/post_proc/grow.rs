//! 3D 区域生长.

use std::collections::VecDeque;

use log::debug;
use ndarray::Array3;

use crate::consts::hu::CALCIUM_THRESHOLD;
use crate::consts::{label, CalciumClass, Connectivity};
use crate::{CacError, CacResult, GridAttr, Idx3d, LabelVolume, Volume};

/// 生长种子: 起点位置与其类别.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Seed {
    /// 种子体素位置, `(z, h, w)`.
    pub pos: Idx3d,

    /// 种子类别. 生长得到的区域整体属于该类别.
    pub class: CalciumClass,
}

impl Seed {
    /// 创建种子.
    #[inline]
    pub fn new(pos: Idx3d, class: CalciumClass) -> Self {
        Self { pos, class }
    }
}

/// 以 HU 门限为边界的 BFS 区域生长器.
///
/// 将分类器给出的阳性体素扩展为完整的病灶范围.
/// 一个邻居体素被加入区域, 当且仅当其 HU 不低于门限且尚未被任何区域占据.
///
/// # 注意
///
/// 种子按给定顺序依次处理, 先到先得: 后处理的种子永远不会抢占已被占据的体素.
/// 低于门限或已被占据的种子不产生任何区域.
#[derive(Copy, Clone, Debug)]
pub struct RegionGrower {
    connectivity: Connectivity,
    threshold: f32,
}

impl RegionGrower {
    /// 以 `connectivity` 为邻接规则创建生长器, 门限为 130 HU.
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            connectivity,
            threshold: CALCIUM_THRESHOLD,
        }
    }

    /// 替换 HU 门限.
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

    /// 邻接规则.
    #[inline]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// 从 `seeds` 出发在 `volume` 上生长. 输出标签体位于 `volume` 的网格上.
    ///
    /// 种子越界时返回 `ShapeMismatch`.
    pub fn grow(&self, seeds: &[Seed], volume: &Volume) -> CacResult<LabelVolume> {
        if let Some(s) = seeds.iter().find(|s| !volume.check(&s.pos)) {
            return Err(CacError::ShapeMismatch(format!(
                "种子 {:?} 越界, 体数据形状为 {:?}",
                s.pos,
                volume.shape()
            )));
        }

        let mut out = LabelVolume::background(volume.shape(), *volume.grid());
        let mut claimed = Array3::from_elem(volume.shape(), false);
        let mut queue = VecDeque::new();
        let mut regions = 0usize;

        for seed in seeds {
            if claimed[seed.pos] || volume[seed.pos] < self.threshold {
                continue;
            }
            regions += 1;
            let label = seed.class.label();
            claimed[seed.pos] = true;
            out[seed.pos] = label;
            queue.push_back(seed.pos);

            while let Some(pos) = queue.pop_front() {
                for nb in volume.neighbours(pos, self.connectivity) {
                    if !claimed[nb] && volume[nb] >= self.threshold {
                        claimed[nb] = true;
                        out[nb] = label;
                        queue.push_back(nb);
                    }
                }
            }
        }

        debug!(
            "grew {regions} regions from {} seeds ({} voxels)",
            seeds.len(),
            out.size() - out.count(label::BACKGROUND)
        );
        Ok(out)
    }

    /// 以 `labels` 中所有非背景体素为种子 (行优先顺序) 在 `volume` 上生长.
    ///
    /// `labels` 与 `volume` 网格不一致时返回 `ShapeMismatch`,
    /// 含有未知标签值时返回 `Classifier`.
    pub fn grow_from_labels(&self, labels: &LabelVolume, volume: &Volume) -> CacResult<LabelVolume> {
        labels.ensure_paired(volume, "种子标签与强度体")?;
        let seeds = labels
            .foreground_pos()
            .into_iter()
            .map(|pos| {
                CalciumClass::from_label(labels[pos])
                    .map(|class| Seed::new(pos, class))
                    .ok_or_else(|| {
                        CacError::Classifier(format!("位置 {pos:?} 的标签值 {} 未知", labels[pos]))
                    })
            })
            .collect::<CacResult<Vec<_>>>()?;
        self.grow(&seeds, volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::label;
    use crate::VoxelGrid;

    fn grid() -> VoxelGrid {
        VoxelGrid::with_spacing([1.5, 0.66, 0.66]).unwrap()
    }

    fn line(values: &[f32]) -> Volume {
        let data = Array3::from_shape_vec((1, 1, values.len()), values.to_vec()).unwrap();
        Volume::new(data, grid())
    }

    #[test]
    fn test_first_seed_wins() {
        let v = line(&[200.0; 5]);
        let seeds = [
            Seed::new((0, 0, 0), CalciumClass::LadLm),
            Seed::new((0, 0, 4), CalciumClass::Rca),
        ];
        let out = RegionGrower::new(Connectivity::Six).grow(&seeds, &v).unwrap();
        assert_eq!(out.count(label::LAD_LM), 5);
        assert_eq!(out.count(label::RCA), 0);

        // 反转处理顺序
        let seeds = [seeds[1], seeds[0]];
        let out = RegionGrower::new(Connectivity::Six).grow(&seeds, &v).unwrap();
        assert_eq!(out.count(label::RCA), 5);
    }

    #[test]
    fn test_threshold_boundary() {
        let v = line(&[300.0, 130.0, 129.9, 500.0, 140.0]);
        let seeds = [Seed::new((0, 0, 0), CalciumClass::Lcx)];
        let out = RegionGrower::new(Connectivity::TwentySix).grow(&seeds, &v).unwrap();
        // 130 包含在内, 129.9 阻断生长.
        assert_eq!(out.count(label::LCX), 2);
        assert_eq!(out[(0, 0, 3)], label::BACKGROUND);

        // 更高的门限
        let out = RegionGrower::new(Connectivity::TwentySix)
            .with_threshold(200.0)
            .grow(&seeds, &v)
            .unwrap();
        assert_eq!(out.count(label::LCX), 1);
    }

    #[test]
    fn test_seed_below_threshold_produces_nothing() {
        let v = line(&[100.0, 400.0, 400.0]);
        let seeds = [Seed::new((0, 0, 0), CalciumClass::Aorta)];
        let out = RegionGrower::new(Connectivity::Six).grow(&seeds, &v).unwrap();
        assert_eq!(out.count(label::BACKGROUND), 3);
    }

    #[test]
    fn test_seed_out_of_bounds() {
        let v = line(&[200.0; 2]);
        let err = RegionGrower::new(Connectivity::Six)
            .grow(&[Seed::new((0, 0, 2), CalciumClass::Rca)], &v)
            .unwrap_err();
        assert_eq!(err.kind(), "ShapeMismatchError");
    }

    #[test]
    fn test_grow_from_labels_row_major() {
        // 两个种子位于同一高密度块中, 行优先更靠前的种子获胜.
        let v = Volume::new(Array3::from_elem((2, 2, 2), 250.0), grid());
        let mut labels = LabelVolume::background((2, 2, 2), grid());
        labels[(1, 1, 1)] = label::LAD_LM;
        labels[(0, 1, 0)] = label::MITRAL_VALVE;
        let out = RegionGrower::new(Connectivity::Six)
            .grow_from_labels(&labels, &v)
            .unwrap();
        assert_eq!(out.count(label::MITRAL_VALVE), 8);

        labels[(0, 0, 0)] = 42;
        let err = RegionGrower::new(Connectivity::Six)
            .grow_from_labels(&labels, &v)
            .unwrap_err();
        assert_eq!(err.kind(), "ClassifierError");
    }
}
