use std::collections::BTreeSet;
use std::ops::{Index, IndexMut};
use std::path::Path;
use std::str::FromStr;

use ndarray::{Array3, ArrayView, ArrayViewMut, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use serde::{Deserialize, Serialize};

use crate::consts::{label, Connectivity};
use crate::{CacError, CacResult, Idx3d};

pub mod artifact;
mod hu_range;

pub use hu_range::HuRange;

/// 间距比较的容差, 以毫米为单位.
const SPACING_EPS: f64 = 1e-6;

/// 切片沿 z 轴的排列方向.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
pub enum SliceOrder {
    /// 规范方向. 索引增大时切片由脚向头移动.
    #[default]
    FeetToHead,

    /// 反向. 索引增大时切片由头向脚移动.
    HeadToFeet,
}

impl SliceOrder {
    /// 元数据表及产物中使用的名字.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FeetToHead => "feet-to-head",
            Self::HeadToFeet => "head-to-feet",
        }
    }

    /// 产物中的数值编码.
    #[inline]
    pub(crate) const fn code(&self) -> u8 {
        match self {
            Self::FeetToHead => 0,
            Self::HeadToFeet => 1,
        }
    }

    #[inline]
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::FeetToHead),
            1 => Some(Self::HeadToFeet),
            _ => None,
        }
    }
}

impl FromStr for SliceOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feet-to-head" => Ok(Self::FeetToHead),
            "head-to-feet" => Ok(Self::HeadToFeet),
            _ => Err(format!("未知的切片方向 `{s}`, 应为 feet-to-head 或 head-to-feet")),
        }
    }
}

/// 体素网格: 间距, 原点与切片方向. 强度体和标签体共用.
///
/// 间距各分量保证严格为正且有限. 该结构是只读的, 若要修改网格参数,
/// 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    spacing: [f64; 3],
    origin: [f64; 3],
    order: SliceOrder,
}

impl VoxelGrid {
    /// 构建体素网格. `spacing` 和 `origin` 均按 `(z, y, x)` 顺序, 以毫米为单位.
    ///
    /// 任一间距分量非正或非有限时返回 `InvalidSpacing`.
    pub fn new(spacing: [f64; 3], origin: [f64; 3], order: SliceOrder) -> CacResult<Self> {
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(CacError::InvalidSpacing(format!(
                "体素间距必须严格为正, 得到 {spacing:?}"
            )));
        }
        Ok(Self {
            spacing,
            origin,
            order,
        })
    }

    /// 原点为零, 方向为规范方向的网格.
    #[inline]
    pub fn with_spacing(spacing: [f64; 3]) -> CacResult<Self> {
        Self::new(spacing, [0.0; 3], SliceOrder::FeetToHead)
    }

    /// 体素间距, `(z, y, x)`, 毫米.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 索引 `(0, 0, 0)` 体素的物理位置, `(z, y, x)`, 毫米.
    #[inline]
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// 切片方向.
    #[inline]
    pub fn order(&self) -> SliceOrder {
        self.order
    }

    /// 两个网格的间距是否在容差内一致.
    pub fn same_spacing(&self, other: &Self) -> bool {
        self.spacing
            .iter()
            .zip(other.spacing.iter())
            .all(|(a, b)| (a - b).abs() <= SPACING_EPS)
    }
}

/// 三维体数据的网格属性和部分通用操作.
pub trait GridAttr {
    /// 获取体素网格.
    fn grid(&self) -> &VoxelGrid;

    /// 获取数据形状大小, `(z, h, w)`.
    fn shape(&self) -> Idx3d;

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        self.grid().spacing()
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获取水平切片方向的像素实际面积值, 以平方毫米为单位.
    #[inline]
    fn slice_pixel(&self) -> f64 {
        self.pix_dim().iter().skip(1).product()
    }

    /// 获取 `pos` 在 `connectivity` 规则下的所有邻居.
    ///
    /// 在数据范围外的坐标会被过滤掉, 不会包含在返回值中.
    fn neighbours(&self, (z, h, w): Idx3d, connectivity: Connectivity) -> Vec<Idx3d> {
        connectivity
            .offsets()
            .iter()
            .filter_map(|&(dz, dh, dw)| {
                Some((
                    z.checked_add_signed(dz)?,
                    h.checked_add_signed(dh)?,
                    w.checked_add_signed(dw)?,
                ))
            })
            .filter(|p| self.check(p))
            .collect()
    }

    /// 检查 `other` 是否与 `self` 处于同一体素网格 (形状与间距一致).
    ///
    /// 不一致时返回 `ShapeMismatch`, 其中 `what` 用于描述出错的配对.
    fn ensure_paired<G: GridAttr>(&self, other: &G, what: &str) -> CacResult<()> {
        if self.shape() != other.shape() {
            return Err(CacError::ShapeMismatch(format!(
                "{what}: 形状 {:?} 与 {:?} 不一致",
                self.shape(),
                other.shape()
            )));
        }
        if !self.grid().same_spacing(other.grid()) {
            return Err(CacError::ShapeMismatch(format!(
                "{what}: 间距 {:?} 与 {:?} 不一致",
                self.pix_dim(),
                other.pix_dim()
            )));
        }
        Ok(())
    }
}

/// 将 nifti 的 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 3D CT 强度体, HU 值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct Volume {
    grid: VoxelGrid,
    data: Array3<f32>,
}

impl GridAttr for Volume {
    #[inline]
    fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for Volume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Volume {
    /// 由 `(z, h, w)` 排列的 HU 数据和网格直接创建.
    #[inline]
    pub fn new(data: Array3<f32>, grid: VoxelGrid) -> Self {
        Self { grid, data }
    }

    /// 打开 nii 文件格式的 3D CT 扫描. `path` 为 nii 文件的本地路径.
    ///
    /// 间距取自 `pixdim`, 原点取自 `qoffset`. nifti header
    /// 不携带可靠的切片方向, 因此由调用者通过 `order` 给出 (一般来自元数据表).
    pub fn open_nifti<P: AsRef<Path>>(path: P, order: SliceOrder) -> CacResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = obj.header().clone();

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        let data = Array3::<f32>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
            .map_err(|e| CacError::ShapeMismatch(format!("nifti 数据与 header 不符: {e}")))?;

        let [_, pw, ph, pz, ..] = header.pixdim;
        let grid = VoxelGrid::new(
            [pz as f64, ph as f64, pw as f64],
            [
                header.quatern_z as f64,
                header.quatern_y as f64,
                header.quatern_x as f64,
            ],
            order,
        )?;
        Ok(Self { grid, data })
    }

    /// 计算由 `it` 给出的所有索引对应的 CT HU 值的平均值.
    ///
    /// 如果存在越界索引, 则程序 panic. `it` 为空时返回 NaN.
    pub fn mean_hu<I: IntoIterator<Item = Idx3d>>(&self, it: I) -> f64 {
        let mut count = 0u64;
        let mut hu = 0.0;
        for pos in it.into_iter() {
            count += 1;
            hu += self[pos] as f64;
        }
        hu / (count as f64)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }
}

/// 3D CT 钙化类别标签体. 标签值以 `u8` 保存, 取值见 [`crate::consts::label`].
#[derive(Debug, Clone)]
pub struct LabelVolume {
    grid: VoxelGrid,
    data: Array3<u8>,
}

impl GridAttr for LabelVolume {
    #[inline]
    fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for LabelVolume {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for LabelVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl LabelVolume {
    /// 由 `(z, h, w)` 排列的标签数据和网格直接创建.
    #[inline]
    pub fn new(data: Array3<u8>, grid: VoxelGrid) -> Self {
        Self { grid, data }
    }

    /// 在 `grid` 上创建形状为 `shape` 的全背景标签体.
    #[inline]
    pub fn background(shape: Idx3d, grid: VoxelGrid) -> Self {
        Self {
            grid,
            data: Array3::from_elem(shape, label::BACKGROUND),
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }

    /// 获取 3D 标注中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 标注中出现过的所有标签值, 升序.
    pub fn labels_present(&self) -> BTreeSet<u8> {
        self.data.iter().copied().collect()
    }

    /// 是否所有体素均为已知类别标签.
    pub fn is_well_formed(&self) -> bool {
        self.data.iter().all(|p| label::is_known(*p))
    }

    /// 收集满足谓词 `pred` 的所有体素对应的下标, 结果按行优先存储.
    pub fn filter_pos<F: Fn(u8) -> bool>(&self, pred: F) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, pixel)| pred(*pixel).then_some(pos))
            .collect()
    }

    /// 收集所有非背景体素对应的下标. 结果按行优先存储.
    #[inline]
    pub fn foreground_pos(&self) -> Vec<Idx3d> {
        self.filter_pos(|p| !label::is_background(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::Connectivity;

    fn grid() -> VoxelGrid {
        VoxelGrid::with_spacing([1.0, 0.5, 0.5]).unwrap()
    }

    #[test]
    fn test_grid_rejects_non_positive_spacing() {
        for bad in [[0.0, 1.0, 1.0], [1.0, -0.5, 1.0], [1.0, 1.0, f64::NAN]] {
            let err = VoxelGrid::with_spacing(bad).unwrap_err();
            assert_eq!(err.kind(), "InvalidSpacingError");
        }
    }

    #[test]
    fn test_neighbour_counts() {
        let v = LabelVolume::background((3, 3, 3), grid());
        // 中心点
        assert_eq!(v.neighbours((1, 1, 1), Connectivity::Six).len(), 6);
        assert_eq!(v.neighbours((1, 1, 1), Connectivity::TwentySix).len(), 26);
        // 角点
        assert_eq!(v.neighbours((0, 0, 0), Connectivity::Six).len(), 3);
        assert_eq!(v.neighbours((0, 0, 0), Connectivity::TwentySix).len(), 7);
        assert_eq!(v.neighbours((2, 2, 2), Connectivity::TwentySix).len(), 7);
    }

    #[test]
    fn test_ensure_paired() {
        let a = LabelVolume::background((2, 3, 4), grid());
        let b = Volume::new(Array3::zeros((2, 3, 4)), grid());
        assert!(a.ensure_paired(&b, "test").is_ok());

        let c = Volume::new(Array3::zeros((2, 3, 5)), grid());
        assert_eq!(
            a.ensure_paired(&c, "test").unwrap_err().kind(),
            "ShapeMismatchError"
        );

        let d = Volume::new(
            Array3::zeros((2, 3, 4)),
            VoxelGrid::with_spacing([2.0, 0.5, 0.5]).unwrap(),
        );
        assert_eq!(
            a.ensure_paired(&d, "test").unwrap_err().kind(),
            "ShapeMismatchError"
        );
    }

    #[test]
    fn test_label_statistics() {
        let mut v = LabelVolume::background((2, 2, 2), grid());
        v[(0, 0, 0)] = label::LAD_LM;
        v[(1, 1, 1)] = label::RCA;
        assert_eq!(v.count(label::BACKGROUND), 6);
        assert_eq!(
            v.labels_present().into_iter().collect::<Vec<_>>(),
            vec![0, 1, 3]
        );
        assert_eq!(v.foreground_pos(), vec![(0, 0, 0), (1, 1, 1)]);
        assert!(v.is_well_formed());
        v[(0, 1, 0)] = 9;
        assert!(!v.is_well_formed());
    }

    #[test]
    fn test_slice_order_parse() {
        assert_eq!("feet-to-head".parse(), Ok(SliceOrder::FeetToHead));
        assert_eq!("head-to-feet".parse(), Ok(SliceOrder::HeadToFeet));
        assert!("sideways".parse::<SliceOrder>().is_err());
        for o in [SliceOrder::FeetToHead, SliceOrder::HeadToFeet] {
            assert_eq!(SliceOrder::from_code(o.code()), Some(o));
        }
    }

    #[test]
    fn test_open_nifti_permutes_and_reads_geometry() {
        use nifti::writer::WriterOptions;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.nii");

        // nifti 中按 (W, H, z) 排列.
        let raw = Array3::from_shape_fn((4, 3, 2), |(w, h, z)| (z * 100 + h * 10 + w) as f32);
        let header = NiftiHeader {
            pixdim: [1.0, 0.7, 0.8, 2.5, 0.0, 0.0, 0.0, 0.0],
            quatern_x: 10.0,
            quatern_y: 20.0,
            quatern_z: -30.0,
            ..NiftiHeader::default()
        };
        WriterOptions::new(&path)
            .reference_header(&header)
            .write_nifti(&raw)
            .unwrap();

        let v = Volume::open_nifti(&path, SliceOrder::HeadToFeet).unwrap();
        assert_eq!(v.shape(), (2, 3, 4));
        for (z, h, w) in [(0, 0, 0), (1, 2, 3), (1, 0, 2), (0, 2, 1)] {
            assert_eq!(v[(z, h, w)], (z * 100 + h * 10 + w) as f32);
        }

        let grid = v.grid();
        for (got, want) in grid.spacing().iter().zip([2.5, 0.8, 0.7]) {
            assert!((got - want).abs() < 1e-6);
        }
        assert_eq!(grid.origin(), [-30.0, 20.0, 10.0]);
        assert_eq!(grid.order(), SliceOrder::HeadToFeet);
    }
}
