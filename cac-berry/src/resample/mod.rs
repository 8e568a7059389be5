//! 加权平均重采样.
//!
//! 厚层采集的一个切片是其覆盖范围内组织的平均. 因此改变层厚/层间距时,
//! 按源切片与目标切片的重叠长度做加权平均, 模拟部分容积效应.
//! 平面内使用双线性插值. 标签体永远不做平均: z 方向取最大重叠的源切片,
//! 平面内取最近邻.

use log::debug;
use ndarray::{s, Array3, ArrayView3, Axis};

use crate::{CacError, CacResult, GridAttr, HuRange, LabelVolume, SliceOrder, Volume, VoxelGrid};

mod in_plane;
mod weights;

pub use in_plane::resampled_shape;
pub use weights::{dominant, resampled_len, SliceGeometry, SliceWeights};

/// 平面内分辨率比较容差, 毫米.
const IN_PLANE_EPS: f64 = 1e-6;

/// 重采样目标: 层厚, 层间距, 平面内 (各向同性) 分辨率. 单位均为毫米.
///
/// 该结构是只读的. 若要修改参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ResampleSpec {
    thickness: f64,
    spacing: f64,
    in_plane: f64,
}

impl ResampleSpec {
    /// 构建重采样目标.
    ///
    /// # 注意
    ///
    /// 任一参数非正或非有限时返回 `InvalidSpacing`.
    /// 层厚小于层间距时相邻目标切片之间存在空隙, 同样返回 `InvalidSpacing`.
    /// 层厚不小于层间距 (相接或重叠切片) 是正常情况.
    pub fn new(thickness: f64, spacing: f64, in_plane: f64) -> CacResult<Self> {
        let values = [thickness, spacing, in_plane];
        if values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(CacError::InvalidSpacing(format!(
                "重采样目标必须严格为正, 得到 层厚 {thickness}, 层间距 {spacing}, 平面内 {in_plane}"
            )));
        }
        if thickness < spacing {
            return Err(CacError::InvalidSpacing(format!(
                "目标层厚 {thickness} 小于层间距 {spacing}"
            )));
        }
        Ok(Self {
            thickness,
            spacing,
            in_plane,
        })
    }

    /// 标准化分辨率: z 方向 1.5 mm 层厚/层间距, 平面内 0.66 mm.
    pub const fn standard() -> Self {
        Self {
            thickness: 1.5,
            spacing: 1.5,
            in_plane: 0.66,
        }
    }

    /// 目标层厚.
    #[inline]
    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    /// 目标层间距.
    #[inline]
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// 目标平面内分辨率.
    #[inline]
    pub fn in_plane(&self) -> f64 {
        self.in_plane
    }
}

impl Default for ResampleSpec {
    fn default() -> Self {
        Self::standard()
    }
}

/// 体数据重采样器. 不修改输入, 总是产生新的体数据.
#[derive(Copy, Clone, Debug)]
pub struct VolumeResampler {
    spec: ResampleSpec,
    range: HuRange,
}

impl VolumeResampler {
    /// 以 `spec` 为目标创建重采样器. 输出 HU 截断到 [`HuRange::resampled`].
    pub fn new(spec: ResampleSpec) -> Self {
        Self {
            spec,
            range: HuRange::resampled(),
        }
    }

    /// 重采样目标.
    #[inline]
    pub fn spec(&self) -> &ResampleSpec {
        &self.spec
    }

    /// 将强度体重采样到目标分辨率.
    ///
    /// `source_thickness` 为采集层厚 (一般来自元数据表), 非正或非有限时退化为
    /// 源层间距. 头→脚方向的体数据在重采样前后各翻转一次, 输出的 z 原点重新计算,
    /// 使索引 0 仍然对应同一物理端.
    pub fn resample(&self, volume: &Volume, source_thickness: f64) -> CacResult<Volume> {
        ensure_non_empty(volume)?;
        let grid = *volume.grid();
        let geometry = self.geometry(&grid, volume.len_z(), source_thickness);
        let weights = geometry.weights();
        let src = canonical(volume.data(), grid.order());

        let (_, h, w) = src.dim();
        let mut out = Array3::<f32>::zeros((weights.len(), h, w));
        for (mut dst, ws) in out.axis_iter_mut(Axis(0)).zip(weights.iter()) {
            for &(k, weight) in ws {
                dst.scaled_add(weight as f32, &src.index_axis(Axis(0), k));
            }
        }

        let [_, sy, sx] = grid.spacing();
        if self.needs_in_plane(sy, sx) {
            out = in_plane::resample_slices(out.view(), (sy, sx), self.spec.in_plane);
        }
        let mut out = restore(out, grid.order());
        out.mapv_inplace(|v| self.range.clamp(v));

        let target = self.target_grid(&grid, volume.len_z(), out.len_of(Axis(0)))?;
        debug!(
            "resampled volume {:?} @ {:?} -> {:?} @ {:?}",
            volume.shape(),
            grid.spacing(),
            out.dim(),
            target.spacing()
        );
        Ok(Volume::new(out, target))
    }

    /// 将标签体重采样到与 `resample(paired, source_thickness)` 相同的网格.
    ///
    /// `paired` 必须是与 `mask` 配对的原始强度体, 否则返回 `ShapeMismatch`.
    /// z 方向取重叠最大的源切片 (并列时取索引较小者), 平面内取最近邻.
    /// 输出只包含输入中出现过的标签.
    pub fn resample_mask(
        &self,
        mask: &LabelVolume,
        paired: &Volume,
        source_thickness: f64,
    ) -> CacResult<LabelVolume> {
        mask.ensure_paired(paired, "标签体与强度体")?;
        ensure_non_empty(paired)?;
        let grid = *paired.grid();
        let geometry = self.geometry(&grid, mask.len_z(), source_thickness);
        let src = canonical(mask.data(), grid.order());

        let (_, h, w) = src.dim();
        let mut out = Array3::<u8>::zeros((geometry.out_len(), h, w));
        for (mut dst, ws) in out.axis_iter_mut(Axis(0)).zip(geometry.weights().iter()) {
            dst.assign(&src.index_axis(Axis(0), dominant(ws)));
        }

        let [_, sy, sx] = grid.spacing();
        if self.needs_in_plane(sy, sx) {
            out = in_plane::resample_label_slices(out.view(), (sy, sx), self.spec.in_plane);
        }
        let out = restore(out, grid.order());
        let target = self.target_grid(&grid, mask.len_z(), out.len_of(Axis(0)))?;
        Ok(LabelVolume::new(out, target))
    }

    fn geometry(&self, grid: &VoxelGrid, len: usize, source_thickness: f64) -> SliceGeometry {
        let spacing = grid.spacing()[0];
        let thickness = if source_thickness.is_finite() && source_thickness > 0.0 {
            source_thickness
        } else {
            spacing
        };
        SliceGeometry {
            len,
            spacing,
            thickness,
            target_spacing: self.spec.spacing,
            target_thickness: self.spec.thickness,
        }
    }

    #[inline]
    fn needs_in_plane(&self, sy: f64, sx: f64) -> bool {
        (sy - self.spec.in_plane).abs() > IN_PLANE_EPS || (sx - self.spec.in_plane).abs() > IN_PLANE_EPS
    }

    fn target_grid(&self, grid: &VoxelGrid, n: usize, n_out: usize) -> CacResult<VoxelGrid> {
        let [sz, sy, sx] = grid.spacing();
        let [oz, oy, ox] = grid.origin();
        let (sy, sx) = if self.needs_in_plane(sy, sx) {
            (self.spec.in_plane, self.spec.in_plane)
        } else {
            (sy, sx)
        };
        let oz = match grid.order() {
            SliceOrder::FeetToHead => oz,
            SliceOrder::HeadToFeet => {
                oz - (n as f64 - 1.0) * sz + (n_out as f64 - 1.0) * self.spec.spacing
            }
        };
        VoxelGrid::new([self.spec.spacing, sy, sx], [oz, oy, ox], grid.order())
    }
}

fn ensure_non_empty(volume: &Volume) -> CacResult<()> {
    if volume.size() == 0 {
        return Err(CacError::ShapeMismatch(format!(
            "无法重采样空体数据 {:?}",
            volume.shape()
        )));
    }
    Ok(())
}

/// 规范 (脚→头) 方向的视图.
fn canonical<A>(data: ArrayView3<'_, A>, order: SliceOrder) -> ArrayView3<'_, A> {
    match order {
        SliceOrder::FeetToHead => data,
        SliceOrder::HeadToFeet => data.slice_move(s![..;-1, .., ..]),
    }
}

/// 将规范方向的结果恢复为 `order` 方向.
fn restore<A: Clone>(data: Array3<A>, order: SliceOrder) -> Array3<A> {
    match order {
        SliceOrder::FeetToHead => data,
        SliceOrder::HeadToFeet => data.slice(s![..;-1, .., ..]).to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::label;

    fn f32_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn grid(spacing: [f64; 3], order: SliceOrder) -> VoxelGrid {
        VoxelGrid::new(spacing, [10.0, -5.0, 2.0], order).unwrap()
    }

    fn ramp(shape: (usize, usize, usize), spacing: [f64; 3], order: SliceOrder) -> Volume {
        let data = Array3::from_shape_fn(shape, |(z, h, w)| (z * 37 + h * 11 + w * 3) as f32);
        Volume::new(data, grid(spacing, order))
    }

    #[test]
    fn test_spec_validation() {
        assert!(ResampleSpec::new(1.5, 1.5, 0.66).is_ok());
        assert!(ResampleSpec::new(3.0, 1.5, 0.66).is_ok());
        for (t, s, r) in [
            (0.0, 1.5, 0.66),
            (1.5, -1.5, 0.66),
            (1.5, 1.5, 0.0),
            (f64::NAN, 1.5, 0.66),
            (0.5, 1.5, 0.66),
            (0.75, 1.5, 0.66),
            (1.0, 1.5, 0.66),
        ] {
            let err = ResampleSpec::new(t, s, r).unwrap_err();
            assert_eq!(err.kind(), "InvalidSpacingError");
        }
        assert_eq!(ResampleSpec::default(), ResampleSpec::standard());
    }

    #[test]
    fn test_constant_volume_stays_constant() {
        let v = Volume::new(
            Array3::from_elem((9, 7, 7), 200.0),
            grid([0.625, 0.7, 0.7], SliceOrder::FeetToHead),
        );
        let r = VolumeResampler::new(ResampleSpec::standard());
        let out = r.resample(&v, 0.625).unwrap();
        assert_eq!(out.shape(), (4, 7, 7));
        assert!(out.data().iter().all(|x| f32_eq(*x, 200.0)));
        assert_eq!(out.pix_dim(), [1.5, 0.66, 0.66]);
        assert_eq!(out.grid().origin(), [10.0, -5.0, 2.0]);
    }

    #[test]
    fn test_partial_volume_dilutes_thin_slice() {
        let mut v = Volume::new(
            Array3::zeros((2, 1, 1)),
            grid([1.0, 0.66, 0.66], SliceOrder::FeetToHead),
        );
        v[(1, 0, 0)] = 100.0;
        let r = VolumeResampler::new(ResampleSpec::standard());
        let out = r.resample(&v, 1.0).unwrap();
        // [-0.75, 0.75): 源 0 覆盖 1.0, 源 1 覆盖 0.25.
        assert_eq!(out.shape(), (1, 1, 1));
        assert!(f32_eq(out[(0, 0, 0)], 20.0));
    }

    #[test]
    fn test_output_is_clamped() {
        let mut v = Volume::new(
            Array3::from_elem((3, 2, 2), 40.0),
            grid([1.5, 0.66, 0.66], SliceOrder::FeetToHead),
        );
        v[(0, 0, 0)] = -3024.0;
        v[(2, 1, 1)] = 6000.0;
        let out = VolumeResampler::new(ResampleSpec::standard())
            .resample(&v, 1.5)
            .unwrap();
        assert!(out.data().iter().all(|x| (-1000.0..=3096.0).contains(x)));
        assert_eq!(out[(0, 0, 0)], -1000.0);
        assert_eq!(out[(2, 1, 1)], 3096.0);
    }

    #[test]
    fn test_orientation_round_trip() {
        let spacing = [0.8, 0.5, 0.5];
        let a = ramp((11, 5, 6), spacing, SliceOrder::HeadToFeet);
        let b = Volume::new(
            a.data().slice(s![..;-1, .., ..]).to_owned(),
            grid(spacing, SliceOrder::FeetToHead),
        );
        let r = VolumeResampler::new(ResampleSpec::standard());
        let ra = r.resample(&a, 2.0).unwrap();
        let rb = r.resample(&b, 2.0).unwrap();
        assert_eq!(ra.shape(), rb.shape());
        let flipped = rb.data().slice(s![..;-1, .., ..]).to_owned();
        for (x, y) in ra.data().iter().zip(flipped.iter()) {
            assert!(f32_eq(*x, *y));
        }
        assert_eq!(ra.grid().order(), SliceOrder::HeadToFeet);
    }

    #[test]
    fn test_head_to_feet_origin() {
        let v = ramp((5, 2, 2), [1.0, 0.66, 0.66], SliceOrder::HeadToFeet);
        let out = VolumeResampler::new(ResampleSpec::standard())
            .resample(&v, 1.0)
            .unwrap();
        // n_out = floor(4 / 1.5) + 1 = 3, 10 - 4 + 3 = 9.
        assert_eq!(out.len_z(), 3);
        assert!((out.grid().origin()[0] - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_mask_never_introduces_labels() {
        let spacing = [0.625, 0.7, 0.7];
        let v = ramp((13, 9, 9), spacing, SliceOrder::HeadToFeet);
        let data = Array3::from_shape_fn((13, 9, 9), |(z, h, w)| match (z + h * w) % 5 {
            0 => label::LCX,
            1 => label::AORTIC_VALVE,
            _ => label::BACKGROUND,
        });
        let mask = LabelVolume::new(data, *v.grid());
        let r = VolumeResampler::new(ResampleSpec::standard());
        let rv = r.resample(&v, 0.625).unwrap();
        let rm = r.resample_mask(&mask, &v, 0.625).unwrap();

        assert!(rm.ensure_paired(&rv, "test").is_ok());
        assert_eq!(rm.grid(), rv.grid());
        assert!(rm.labels_present().is_subset(&mask.labels_present()));
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let v = ramp((4, 3, 3), [1.0, 0.66, 0.66], SliceOrder::FeetToHead);
        let mask = LabelVolume::background((4, 3, 2), *v.grid());
        let err = VolumeResampler::new(ResampleSpec::standard())
            .resample_mask(&mask, &v, 1.0)
            .unwrap_err();
        assert_eq!(err.kind(), "ShapeMismatchError");
    }
}
