use crate::consts::hu::{CLAMP_MAX, CLAMP_MIN};

/// CT HU 值闭区间, 包含下限 (lower) 和上限 (upper).
///
/// 该区间是只读的.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HuRange {
    lower: f32,
    upper: f32,
}

impl HuRange {
    /// 重采样后使用的截断区间 \[-1000, 3096\].
    ///
    /// 用于压制部分厂商视野外低于 -1024 的伪影值.
    #[inline]
    pub const fn resampled() -> HuRange {
        Self {
            lower: CLAMP_MIN,
            upper: CLAMP_MAX,
        }
    }

    /// 将 `hu` 截断到区间内. NaN 被映射为下限.
    #[inline]
    pub fn clamp(&self, hu: f32) -> f32 {
        if hu.is_nan() {
            self.lower
        } else {
            hu.clamp(self.lower, self.upper)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HuRange;

    #[test]
    fn test_hu_range_clamp() {
        let r = HuRange::resampled();
        assert_eq!(r.clamp(-3024.0), -1000.0);
        assert_eq!(r.clamp(-1024.0), -1000.0);
        assert_eq!(r.clamp(-1000.0), -1000.0);
        assert_eq!(r.clamp(130.0), 130.0);
        assert_eq!(r.clamp(3096.0), 3096.0);
        assert_eq!(r.clamp(4000.0), 3096.0);
        assert_eq!(r.clamp(f32::NAN), -1000.0);
    }
}
