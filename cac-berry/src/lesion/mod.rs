//! 钙化病灶.
//!
//! 病灶是同一非背景类别, 且 HU 不低于门限的体素组成的极大连通集合.
//! 病灶永远不会跨越两个类别.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts::CalciumClass;
use crate::{CacError, CacResult, GridAttr, Idx3d, Volume};

mod extract;

pub use extract::LesionExtractor;

/// 病灶在某一水平切片上的截面统计.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SliceTally {
    /// 切片 z 索引.
    pub z: usize,

    /// 截面体素个数.
    pub count: usize,

    /// 截面最大 HU 值.
    pub max_hu: f32,
}

/// 单个钙化病灶.
#[derive(Clone, Debug)]
pub struct Lesion {
    class: CalciumClass,
    voxels: Vec<Idx3d>,
    slices: Vec<SliceTally>,
    max_hu: f32,
    min_hu: f32,
    mean_hu: f64,
    voxel_mm3: f64,
    pixel_mm2: f64,
}

impl Lesion {
    /// 由体素集合与其所在的强度体计算病灶统计量.
    ///
    /// `voxels` 会被排序为行优先顺序. 为空或包含越界索引时返回 `ShapeMismatch`.
    /// 该方法不检查连通性与门限.
    pub fn new(class: CalciumClass, mut voxels: Vec<Idx3d>, volume: &Volume) -> CacResult<Self> {
        if voxels.is_empty() {
            return Err(CacError::ShapeMismatch("病灶不能为空".to_string()));
        }
        if let Some(p) = voxels.iter().find(|p| !volume.check(p)) {
            return Err(CacError::ShapeMismatch(format!(
                "病灶体素 {p:?} 越界, 体数据形状为 {:?}",
                volume.shape()
            )));
        }
        voxels.sort_unstable();

        let mut per_slice: BTreeMap<usize, (usize, f32)> = BTreeMap::new();
        let (mut max_hu, mut min_hu) = (f32::MIN, f32::MAX);
        for &pos in voxels.iter() {
            let hu = volume[pos];
            max_hu = max_hu.max(hu);
            min_hu = min_hu.min(hu);
            let e = per_slice.entry(pos.0).or_insert((0, f32::MIN));
            e.0 += 1;
            e.1 = e.1.max(hu);
        }
        let slices = per_slice
            .into_iter()
            .map(|(z, (count, max_hu))| SliceTally { z, count, max_hu })
            .collect();

        Ok(Self {
            class,
            mean_hu: volume.mean_hu(voxels.iter().copied()),
            voxels,
            slices,
            max_hu,
            min_hu,
            voxel_mm3: volume.voxel(),
            pixel_mm2: volume.slice_pixel(),
        })
    }

    /// 病灶类别.
    #[inline]
    pub fn class(&self) -> CalciumClass {
        self.class
    }

    /// 所有体素, 行优先顺序.
    #[inline]
    pub fn voxels(&self) -> &[Idx3d] {
        &self.voxels
    }

    /// 行优先意义下的第一个体素.
    #[inline]
    pub fn first_voxel(&self) -> Idx3d {
        self.voxels[0]
    }

    /// 体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    /// 总是返回 `false`. 病灶至少包含一个体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    /// 病灶体积, 立方毫米.
    #[inline]
    pub fn volume_mm3(&self) -> f64 {
        self.voxels.len() as f64 * self.voxel_mm3
    }

    /// 单个体素的平面面积, 平方毫米.
    #[inline]
    pub fn pixel_mm2(&self) -> f64 {
        self.pixel_mm2
    }

    /// 各切片截面统计, 按 z 升序.
    #[inline]
    pub fn slices(&self) -> &[SliceTally] {
        &self.slices
    }

    /// 最大 HU 值.
    #[inline]
    pub fn max_hu(&self) -> f32 {
        self.max_hu
    }

    /// 最小 HU 值.
    #[inline]
    pub fn min_hu(&self) -> f32 {
        self.min_hu
    }

    /// 平均 HU 值.
    #[inline]
    pub fn mean_hu(&self) -> f64 {
        self.mean_hu
    }
}
