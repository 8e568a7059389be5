//! 临床风险分级与一致性评估.

use std::fmt;
use std::str::FromStr;

use itertools::iproduct;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

/// 有序的冠脉钙化风险等级.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    /// 无钙化 (评分为 0).
    None,

    /// 极轻度.
    Minimal,

    /// 轻度.
    Mild,

    /// 中度.
    Moderate,

    /// 重度.
    Severe,
}

impl RiskCategory {
    /// 全部等级, 升序.
    pub const ALL: [RiskCategory; 5] = [
        Self::None,
        Self::Minimal,
        Self::Mild,
        Self::Moderate,
        Self::Severe,
    ];

    /// 等级序号, 从 0 开始.
    #[inline]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// 导出表格中使用的名字.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Minimal => "minimal",
            Self::Mild => "mild",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 构建 [`RiskBands`] 失败的原因.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InitBandsError {
    /// 上界不是有限正数.
    #[error("风险分级边界 {0} 不是有限正数")]
    NonPositive(f64),

    /// 上界不严格递增.
    #[error("风险分级边界必须严格递增, 得到 {0:?}")]
    NotIncreasing([f64; 3]),

    /// 个数不是 3.
    #[error("风险分级边界应有 3 个, 得到 {0} 个")]
    Count(usize),

    /// 无法解析为数字.
    #[error("无法解析风险分级边界 `{0}`")]
    Parse(String),
}

/// 风险分级配置: 三个严格递增的正上界 (极轻度, 轻度, 中度).
///
/// 分级规则:
///
/// - `score <= 0`: [`RiskCategory::None`];
/// - `score <= b0`: [`RiskCategory::Minimal`];
/// - `score <= b1`: [`RiskCategory::Mild`];
/// - `score <= b2`: [`RiskCategory::Moderate`];
/// - 其它: [`RiskCategory::Severe`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 3]", into = "[f64; 3]")]
pub struct RiskBands {
    bounds: [f64; 3],
}

impl RiskBands {
    /// 构建分级配置.
    pub fn new(bounds: [f64; 3]) -> Result<Self, InitBandsError> {
        if let Some(b) = bounds.iter().find(|b| !b.is_finite() || **b <= 0.0) {
            return Err(InitBandsError::NonPositive(*b));
        }
        if bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(InitBandsError::NotIncreasing(bounds));
        }
        Ok(Self { bounds })
    }

    /// 三个上界.
    #[inline]
    pub fn bounds(&self) -> [f64; 3] {
        self.bounds
    }

    /// 将评分映射为风险等级.
    pub fn categorize(&self, score: NotNan<f64>) -> RiskCategory {
        let score = score.into_inner();
        let [b0, b1, b2] = self.bounds;
        if score <= 0.0 {
            RiskCategory::None
        } else if score <= b0 {
            RiskCategory::Minimal
        } else if score <= b1 {
            RiskCategory::Mild
        } else if score <= b2 {
            RiskCategory::Moderate
        } else {
            RiskCategory::Severe
        }
    }
}

impl Default for RiskBands {
    /// 10 / 100 / 400.
    fn default() -> Self {
        Self {
            bounds: [10.0, 100.0, 400.0],
        }
    }
}

impl TryFrom<[f64; 3]> for RiskBands {
    type Error = InitBandsError;

    fn try_from(value: [f64; 3]) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RiskBands> for [f64; 3] {
    fn from(value: RiskBands) -> Self {
        value.bounds
    }
}

impl FromStr for RiskBands {
    type Err = InitBandsError;

    /// 解析形如 `10,100,400` 的字符串.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<f64>()
                    .map_err(|_| InitBandsError::Parse(p.trim().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        match values.as_slice() {
            &[a, b, c] => Self::new([a, b, c]),
            _ => Err(InitBandsError::Count(values.len())),
        }
    }
}

/// Cohen's kappa 的不一致权重.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Weighting {
    /// 仅完全一致计为一致.
    #[default]
    Unweighted,

    /// 线性权重 `1 - |i - j| / (k - 1)`.
    Linear,

    /// 二次权重 `1 - (|i - j| / (k - 1))^2`.
    Quadratic,
}

impl Weighting {
    fn agreement(&self, i: usize, j: usize) -> f64 {
        let k = RiskCategory::ALL.len() as f64;
        let d = i.abs_diff(j) as f64 / (k - 1.0);
        match self {
            Self::Unweighted => {
                if i == j {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Linear => 1.0 - d,
            Self::Quadratic => 1.0 - d * d,
        }
    }
}

/// 预测与参考风险等级之间的一致性.
#[derive(Clone, Debug, PartialEq)]
pub struct Concordance {
    /// 混淆矩阵, `matrix[predicted][reference]`.
    pub matrix: [[usize; 5]; 5],

    /// 完全一致的比例.
    pub agreement: f64,

    /// 加权 Cohen's kappa.
    pub kappa: f64,
}

/// 计算 `(预测, 参考)` 对的一致性. `pairs` 为空时返回 `None`.
///
/// 期望一致率为 1 (双方都只使用同一个等级) 时, kappa 定义为 1.
pub fn concordance(
    pairs: &[(RiskCategory, RiskCategory)],
    weighting: Weighting,
) -> Option<Concordance> {
    if pairs.is_empty() {
        return None;
    }
    let mut matrix = [[0usize; 5]; 5];
    for (p, r) in pairs {
        matrix[p.index()][r.index()] += 1;
    }
    let n = pairs.len() as f64;
    let rows: Vec<f64> = matrix.iter().map(|r| r.iter().sum::<usize>() as f64).collect();
    let cols: Vec<f64> = (0..5)
        .map(|j| matrix.iter().map(|r| r[j]).sum::<usize>() as f64)
        .collect();

    let (mut observed, mut expected) = (0.0, 0.0);
    for (i, j) in iproduct!(0..5, 0..5) {
        let w = weighting.agreement(i, j);
        observed += w * matrix[i][j] as f64 / n;
        expected += w * rows[i] * cols[j] / (n * n);
    }
    let agreement = (0..5).map(|i| matrix[i][i]).sum::<usize>() as f64 / n;
    let kappa = if (1.0 - expected).abs() < 1e-12 {
        1.0
    } else {
        (observed - expected) / (1.0 - expected)
    };
    Some(Concordance {
        matrix,
        agreement,
        kappa,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use RiskCategory::*;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn nn(x: f64) -> NotNan<f64> {
        NotNan::new(x).unwrap()
    }

    #[test]
    fn test_categorize_boundaries() {
        let b = RiskBands::default();
        assert_eq!(b.categorize(nn(0.0)), None);
        assert_eq!(b.categorize(nn(-3.0)), None);
        assert_eq!(b.categorize(nn(0.01)), Minimal);
        assert_eq!(b.categorize(nn(10.0)), Minimal);
        assert_eq!(b.categorize(nn(11.0)), Mild);
        assert_eq!(b.categorize(nn(100.0)), Mild);
        assert_eq!(b.categorize(nn(400.0)), Moderate);
        assert_eq!(b.categorize(nn(400.5)), Severe);

        let custom = RiskBands::new([1.0, 2.0, 3.0]).unwrap();
        assert_eq!(custom.categorize(nn(0.0)), None);
        assert_eq!(custom.categorize(nn(2.5)), Moderate);
    }

    #[test]
    fn test_invalid_bands() {
        assert_eq!(
            RiskBands::new([10.0, 10.0, 400.0]),
            Err(InitBandsError::NotIncreasing([10.0, 10.0, 400.0]))
        );
        assert_eq!(
            RiskBands::new([0.0, 10.0, 400.0]),
            Err(InitBandsError::NonPositive(0.0))
        );
        assert!(RiskBands::new([1.0, f64::INFINITY, 400.0]).is_err());
        assert_eq!(
            InitBandsError::Count(2).to_string(),
            "风险分级边界应有 3 个, 得到 2 个"
        );
    }

    #[test]
    fn test_parse_bands() {
        assert_eq!("10,100,400".parse(), Ok(RiskBands::default()));
        assert_eq!(
            " 1, 2 ,3".parse::<RiskBands>().unwrap().bounds(),
            [1.0, 2.0, 3.0]
        );
        assert_eq!("1,2".parse::<RiskBands>(), Err(InitBandsError::Count(2)));
        assert!(matches!(
            "1,x,3".parse::<RiskBands>(),
            Err(InitBandsError::Parse(_))
        ));
    }

    #[test]
    fn test_bands_serde_validates() {
        let b: RiskBands = bincode::deserialize(&bincode::serialize(&[5.0f64, 50.0, 500.0]).unwrap())
            .unwrap();
        assert_eq!(b.bounds(), [5.0, 50.0, 500.0]);
        let bad = bincode::serialize(&[50.0f64, 5.0, 500.0]).unwrap();
        assert!(bincode::deserialize::<RiskBands>(&bad).is_err());
    }

    #[test]
    fn test_concordance() {
        assert!(concordance(&[], Weighting::Linear).is_none());

        let perfect = [(None, None), (Mild, Mild), (Severe, Severe)];
        let c = concordance(&perfect, Weighting::Quadratic).unwrap();
        assert!(f64_eq(c.agreement, 1.0));
        assert!(f64_eq(c.kappa, 1.0));

        // 两个等级上的经典例子: po = 0.7, pe = 0.5, kappa = 0.4.
        let mut pairs = vec![];
        pairs.extend(std::iter::repeat((None, None)).take(20));
        pairs.extend(std::iter::repeat((None, Minimal)).take(5));
        pairs.extend(std::iter::repeat((Minimal, None)).take(10));
        pairs.extend(std::iter::repeat((Minimal, Minimal)).take(15));
        for w in [Weighting::Unweighted, Weighting::Linear, Weighting::Quadratic] {
            let c = concordance(&pairs, w).unwrap();
            assert!(f64_eq(c.agreement, 0.7));
            assert!(f64_eq(c.kappa, 0.4), "{w:?}: {}", c.kappa);
        }
        let c = concordance(&pairs, Weighting::Unweighted).unwrap();
        assert_eq!(c.matrix[1][0], 10);
        assert_eq!(c.matrix[0][1], 5);
    }

    #[test]
    fn test_weighted_kappa_credits_near_misses() {
        let pairs = [
            (None, None),
            (Minimal, Mild),
            (Mild, Moderate),
            (Moderate, Moderate),
            (Severe, Severe),
        ];
        let u = concordance(&pairs, Weighting::Unweighted).unwrap().kappa;
        let l = concordance(&pairs, Weighting::Linear).unwrap().kappa;
        let q = concordance(&pairs, Weighting::Quadratic).unwrap().kappa;
        assert!(u < l && l < q);
    }
}
