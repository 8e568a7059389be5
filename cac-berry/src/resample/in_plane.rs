//! 平面内 (水平切片) 插值.

use ndarray::{Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis};

use super::weights::resampled_len;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 源坐标: 输出索引 `i` 在源索引空间中的位置, 截断到 `[0, n - 1]`.
#[inline]
fn source_coord(i: usize, scale: f64, n: usize) -> f64 {
    (i as f64 * scale).min((n - 1) as f64)
}

fn bilinear_slice(src: ArrayView2<'_, f32>, mut dst: ArrayViewMut2<'_, f32>, scale: (f64, f64)) {
    let (h, w) = src.dim();
    for ((i, j), out) in dst.indexed_iter_mut() {
        let y = source_coord(i, scale.0, h);
        let x = source_coord(j, scale.1, w);
        let (y0, x0) = (y.floor() as usize, x.floor() as usize);
        let (y1, x1) = ((y0 + 1).min(h - 1), (x0 + 1).min(w - 1));
        let (fy, fx) = (y - y0 as f64, x - x0 as f64);

        let top = src[(y0, x0)] as f64 * (1.0 - fx) + src[(y0, x1)] as f64 * fx;
        let bottom = src[(y1, x0)] as f64 * (1.0 - fx) + src[(y1, x1)] as f64 * fx;
        *out = (top * (1.0 - fy) + bottom * fy) as f32;
    }
}

fn nearest_slice(src: ArrayView2<'_, u8>, mut dst: ArrayViewMut2<'_, u8>, scale: (f64, f64)) {
    let (h, w) = src.dim();
    for ((i, j), out) in dst.indexed_iter_mut() {
        let y = (source_coord(i, scale.0, h).round() as usize).min(h - 1);
        let x = (source_coord(j, scale.1, w).round() as usize).min(w - 1);
        *out = src[(y, x)];
    }
}

/// 平面内重采样后的切片形状.
#[inline]
pub fn resampled_shape((h, w): (usize, usize), (sy, sx): (f64, f64), target: f64) -> (usize, usize) {
    (resampled_len(h, sy, target), resampled_len(w, sx, target))
}

/// 将每个水平切片由间距 `(sy, sx)` 双线性插值到各向同性分辨率 `target`.
///
/// 输出切片个数与输入相同. 开启 `rayon` 特性时各切片并行处理.
pub fn resample_slices(src: ArrayView3<'_, f32>, spacing: (f64, f64), target: f64) -> Array3<f32> {
    let (z, h, w) = src.dim();
    let (oh, ow) = resampled_shape((h, w), spacing, target);
    let mut out = Array3::zeros((z, oh, ow));
    if oh == 0 || ow == 0 {
        return out;
    }
    let scale = (target / spacing.0, target / spacing.1);
    let op = |i: usize, dst: ArrayViewMut2<'_, f32>| {
        bilinear_slice(src.index_axis(Axis(0), i), dst, scale)
    };

    #[cfg(feature = "rayon")]
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, dst)| op(i, dst));
    #[cfg(not(feature = "rayon"))]
    out.axis_iter_mut(Axis(0))
        .enumerate()
        .for_each(|(i, dst)| op(i, dst));
    out
}

/// 标签体的最近邻平面内重采样. 开启 `rayon` 特性时各切片并行处理.
pub fn resample_label_slices(src: ArrayView3<'_, u8>, spacing: (f64, f64), target: f64) -> Array3<u8> {
    let (z, h, w) = src.dim();
    let (oh, ow) = resampled_shape((h, w), spacing, target);
    let mut out = Array3::zeros((z, oh, ow));
    if oh == 0 || ow == 0 {
        return out;
    }
    let scale = (target / spacing.0, target / spacing.1);
    let op = |i: usize, dst: ArrayViewMut2<'_, u8>| {
        nearest_slice(src.index_axis(Axis(0), i), dst, scale)
    };

    #[cfg(feature = "rayon")]
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, dst)| op(i, dst));
    #[cfg(not(feature = "rayon"))]
    out.axis_iter_mut(Axis(0))
        .enumerate()
        .for_each(|(i, dst)| op(i, dst));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_bilinear_halves_spacing() {
        // 1 x 2 x 2, 间距 1 mm -> 0.5 mm, 得到 3 x 3.
        let src = Array3::from_shape_vec((1, 2, 2), vec![0.0, 2.0, 4.0, 6.0]).unwrap();
        let out = resample_slices(src.view(), (1.0, 1.0), 0.5);
        assert_eq!(out.dim(), (1, 3, 3));
        assert!(f32_eq(out[(0, 0, 0)], 0.0));
        assert!(f32_eq(out[(0, 0, 1)], 1.0));
        assert!(f32_eq(out[(0, 1, 1)], 3.0));
        assert!(f32_eq(out[(0, 2, 2)], 6.0));
    }

    #[test]
    fn test_nearest_keeps_values() {
        let src = Array3::from_shape_fn((2, 5, 5), |(z, h, w)| ((z + h + w) % 4) as u8);
        let out = resample_label_slices(src.view(), (0.7, 0.7), 0.66);
        assert_eq!(out.dim(), (2, 5, 5));
        assert!(out.iter().all(|p| *p < 4));
    }

    #[test]
    fn test_label_slices_are_independent() {
        let src = Array3::from_shape_fn((6, 4, 4), |(z, h, w)| ((z * 7 + h * 3 + w) % 5) as u8);
        let out = resample_label_slices(src.view(), (0.8, 0.8), 0.5);
        for z in 0..6 {
            let single = resample_label_slices(src.slice(ndarray::s![z..z + 1, .., ..]), (0.8, 0.8), 0.5);
            assert_eq!(out.index_axis(Axis(0), z), single.index_axis(Axis(0), 0));
        }
    }
}
