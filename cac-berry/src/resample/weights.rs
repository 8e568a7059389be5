//! z 方向重叠权重.

/// 一个输出切片的 `(源切片索引, 权重)` 列表. 权重之和为 1.
pub type SliceWeights = Vec<(usize, f64)>;

/// 浮点截断容差. 避免 `(n - 1) * s / S` 恰为整数时因舍入少算一层.
const COUNT_EPS: f64 = 1e-6;

/// 沿一个轴重采样后的体素个数: `floor((n - 1) * from / to) + 1`.
///
/// `n == 0` 时返回 0.
pub fn resampled_len(n: usize, from: f64, to: f64) -> usize {
    if n == 0 {
        return 0;
    }
    ((n - 1) as f64 * from / to + COUNT_EPS).floor() as usize + 1
}

/// z 方向的源切片与目标切片的几何描述. 所有长度以毫米为单位.
#[derive(Copy, Clone, Debug)]
pub struct SliceGeometry {
    /// 源切片个数.
    pub len: usize,

    /// 源切片中心间距.
    pub spacing: f64,

    /// 源切片 (采集) 层厚.
    pub thickness: f64,

    /// 目标切片中心间距.
    pub target_spacing: f64,

    /// 目标切片层厚.
    pub target_thickness: f64,
}

impl SliceGeometry {
    /// 输出切片个数.
    #[inline]
    pub fn out_len(&self) -> usize {
        resampled_len(self.len, self.spacing, self.target_spacing)
    }

    /// 计算所有输出切片的重叠权重.
    ///
    /// 源切片 `k` 覆盖 `[k * s - t / 2, k * s + t / 2)`, 输出切片 `i` 覆盖
    /// `[i * S - T / 2, i * S + T / 2)`. 每个与输出切片重叠的源切片以重叠长度为权重,
    /// 再归一化使权重之和为 1. 边界切片只有部分被源数据覆盖, 归一化后仍是加权平均.
    /// 若某输出切片与任何源切片都不重叠 (源切片之间存在间隙), 则取最近的源切片, 权重为 1.
    pub fn weights(&self) -> Vec<SliceWeights> {
        (0..self.out_len()).map(|i| self.weights_at(i)).collect()
    }

    fn weights_at(&self, i: usize) -> SliceWeights {
        debug_assert!(self.len > 0);
        let center = i as f64 * self.target_spacing;
        let (lo, hi) = (
            center - self.target_thickness / 2.0,
            center + self.target_thickness / 2.0,
        );
        let half = self.thickness / 2.0;

        // 可能重叠的源切片索引范围.
        let first = ((lo - half) / self.spacing).floor().max(0.0) as usize;
        let last = (((hi + half) / self.spacing).ceil().max(0.0) as usize).min(self.len - 1);

        let mut ans: SliceWeights = (first..=last)
            .filter_map(|k| {
                let c = k as f64 * self.spacing;
                let overlap = hi.min(c + half) - lo.max(c - half);
                (overlap > 0.0).then_some((k, overlap))
            })
            .collect();

        let total: f64 = ans.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            let nearest = ((center / self.spacing).round() as usize).min(self.len - 1);
            return vec![(nearest, 1.0)];
        }
        ans.iter_mut().for_each(|(_, w)| *w /= total);
        ans
    }
}

/// 权重最大的源切片. 并列时取索引较小者.
pub fn dominant(weights: &SliceWeights) -> usize {
    let mut best = weights[0];
    for &(k, w) in weights.iter().skip(1) {
        if w > best.1 {
            best = (k, w);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_resampled_len() {
        assert_eq!(resampled_len(0, 1.0, 1.0), 0);
        assert_eq!(resampled_len(1, 5.0, 1.0), 1);
        assert_eq!(resampled_len(11, 0.5, 1.5), 4);
        assert_eq!(resampled_len(10, 1.0, 1.5), 7);
        // (n - 1) * s / S 恰为整数
        assert_eq!(resampled_len(31, 0.5, 1.5), 11);
        assert_eq!(resampled_len(512, 0.7, 0.66), 542);
    }

    /// 任意正的层厚/间距组合下, 每个输出切片的权重之和都为 1.
    #[test]
    fn test_weights_sum_to_one() {
        for len in [1usize, 2, 7, 40] {
            for spacing in [0.5, 0.625, 1.0, 2.5, 5.0] {
                for thickness in [0.3, 0.625, 1.0, 3.0, 5.0] {
                    for target_spacing in [0.5, 1.0, 1.5, 3.0] {
                        for target_thickness in [0.25, 1.5, 3.0, 6.0] {
                            let g = SliceGeometry {
                                len,
                                spacing,
                                thickness,
                                target_spacing,
                                target_thickness,
                            };
                            for (i, w) in g.weights().iter().enumerate() {
                                let sum: f64 = w.iter().map(|(_, x)| x).sum();
                                assert!(f64_eq(sum, 1.0), "{g:?} slice {i}: {sum}");
                                assert!(w.iter().all(|(k, x)| *k < len && *x > 0.0));
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_weights_partial_overlap() {
        // 源: 1 mm 间距 1 mm 层厚; 目标: 1.5 mm 间距 1.5 mm 层厚.
        let g = SliceGeometry {
            len: 4,
            spacing: 1.0,
            thickness: 1.0,
            target_spacing: 1.5,
            target_thickness: 1.5,
        };
        let w = g.weights();
        assert_eq!(w.len(), 3);

        // 输出 0: [-0.75, 0.75), 源 0 覆盖 [-0.5, 0.5), 源 1 覆盖 [0.5, 1.5).
        assert_eq!(w[0].len(), 2);
        assert_eq!(w[0][0].0, 0);
        assert!(f64_eq(w[0][0].1, 1.0 / 1.25));
        assert!(f64_eq(w[0][1].1, 0.25 / 1.25));

        // 输出 1: [0.75, 2.25), 源 1 0.75, 源 2 0.75.
        assert_eq!(w[1], vec![(1, 0.5), (2, 0.5)]);
        assert_eq!(dominant(&w[1]), 1);
    }

    #[test]
    fn test_weights_gap_falls_back_to_nearest() {
        // 源层厚远小于间距, 目标切片落在间隙里.
        let g = SliceGeometry {
            len: 3,
            spacing: 5.0,
            thickness: 1.0,
            target_spacing: 2.0,
            target_thickness: 1.0,
        };
        let w = g.weights();
        // 输出 1 中心 2.0, [1.5, 2.5) 与 [-0.5, 0.5) 和 [4.5, 5.5) 都不相交.
        assert_eq!(w[1], vec![(0, 1.0)]);
        // 输出 2 中心 4.0, [3.5, 4.5) 同样落在间隙, 最近为源 1.
        assert_eq!(w[2], vec![(1, 1.0)]);
    }
}
