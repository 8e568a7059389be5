//! Agatston / 体积 / 质量评分.
//!
//! # 注意
//!
//! 评分直接在重采样后的 (可能重叠的) 切片网格上进行. 传统 Agatston
//! 定义基于 3 mm 非重叠切片, 两者数值并不严格可比.

use log::debug;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

use crate::consts::hu::CALCIUM_THRESHOLD;
use crate::consts::CalciumClass;
use crate::lesion::Lesion;
use crate::{CacError, CacResult};

pub mod risk;

pub use risk::{concordance, Concordance, InitBandsError, RiskBands, RiskCategory, Weighting};

/// 由截面最大 HU 值得到的 Agatston 密度系数.
///
/// \[130, 200) -> 1, \[200, 300) -> 2, \[300, 400) -> 3, \[400, +inf) -> 4.
/// 低于 130 HU 时返回 0.
#[inline]
pub fn density_factor(max_hu: f32) -> u8 {
    match max_hu {
        h if h >= 400.0 => 4,
        h if h >= 300.0 => 3,
        h if h >= 200.0 => 2,
        h if h >= CALCIUM_THRESHOLD => 1,
        _ => 0,
    }
}

/// 单个病灶的评分.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LesionScore {
    /// 病灶类别.
    pub class: CalciumClass,

    /// Agatston 评分.
    pub agatston: f64,

    /// 体积评分, 立方毫米.
    pub volume_mm3: f64,

    /// 质量评分, 毫克. 未配置校准系数时为 `None`.
    pub mass_mg: Option<f64>,
}

/// 评分的累加值.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTotals {
    /// Agatston 评分.
    pub agatston: f64,

    /// 体积评分, 立方毫米.
    pub volume_mm3: f64,

    /// 质量评分, 毫克.
    pub mass_mg: Option<f64>,

    /// 病灶个数.
    pub lesions: usize,
}

impl ScoreTotals {
    fn add(&mut self, s: &LesionScore) {
        self.agatston += s.agatston;
        self.volume_mm3 += s.volume_mm3;
        self.mass_mg = match (self.mass_mg, s.mass_mg) {
            (Some(a), Some(b)) => Some(a + b),
            (None, b) => b,
            (a, None) => a,
        };
        self.lesions += 1;
    }
}

/// 单个类别的评分.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    /// 类别.
    pub class: CalciumClass,

    /// 该类别全部病灶的累加值.
    pub totals: ScoreTotals,
}

/// 一个受试者的评分记录.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// 受试者 ID.
    pub subject_id: String,

    /// 各类别评分, 按 [`CalciumClass::ALL`] 顺序, 总是包含全部类别.
    pub classes: Vec<ClassScore>,

    /// 冠脉总分 (LAD/LM, LCX, RCA).
    pub coronary: ScoreTotals,

    /// 全部类别总分.
    pub total: ScoreTotals,

    /// 由冠脉 Agatston 总分得到的风险等级.
    pub risk: RiskCategory,
}

impl ScoreRecord {
    /// 类别 `class` 的评分.
    pub fn class_score(&self, class: CalciumClass) -> Option<&ClassScore> {
        self.classes.iter().find(|c| c.class == class)
    }
}

/// 评分引擎.
#[derive(Copy, Clone, Debug, Default)]
pub struct ScoreEngine {
    bands: RiskBands,
    mass_calibration: Option<f64>,
}

impl ScoreEngine {
    /// 以 `bands` 为风险分级配置创建评分引擎. 默认不计算质量评分.
    pub fn new(bands: RiskBands) -> Self {
        Self {
            bands,
            mass_calibration: None,
        }
    }

    /// 设置质量评分校准系数 (mg / (HU·mm³)). `None` 表示不计算质量评分.
    #[inline]
    pub fn with_mass_calibration(mut self, calibration: Option<f64>) -> Self {
        self.mass_calibration = calibration;
        self
    }

    /// 风险分级配置.
    #[inline]
    pub fn bands(&self) -> &RiskBands {
        &self.bands
    }

    /// 对单个病灶评分.
    ///
    /// 病灶包含低于 130 HU 的体素时返回 `ThresholdViolation`.
    pub fn score_lesion(&self, lesion: &Lesion) -> CacResult<LesionScore> {
        if lesion.min_hu() < CALCIUM_THRESHOLD {
            return Err(CacError::ThresholdViolation {
                class: lesion.class().label(),
                hu: lesion.min_hu(),
            });
        }
        let area = lesion.pixel_mm2();
        let agatston = lesion
            .slices()
            .iter()
            .map(|t| t.count as f64 * area * density_factor(t.max_hu) as f64)
            .sum();
        let volume_mm3 = lesion.volume_mm3();
        Ok(LesionScore {
            class: lesion.class(),
            agatston,
            volume_mm3,
            mass_mg: self
                .mass_calibration
                .map(|c| c * volume_mm3 * lesion.mean_hu()),
        })
    }

    /// 对一个受试者的全部病灶评分.
    pub fn score(&self, subject_id: &str, lesions: &[Lesion]) -> CacResult<ScoreRecord> {
        let mut classes: Vec<ClassScore> = CalciumClass::ALL
            .iter()
            .map(|&class| ClassScore {
                class,
                totals: ScoreTotals::default(),
            })
            .collect();
        let mut coronary = ScoreTotals::default();
        let mut total = ScoreTotals::default();

        for lesion in lesions {
            let s = self.score_lesion(lesion)?;
            if let Some(c) = classes.iter_mut().find(|c| c.class == s.class) {
                c.totals.add(&s);
            }
            if s.class.is_coronary() {
                coronary.add(&s);
            }
            total.add(&s);
        }

        // 合格体素的 HU 与网格间距均有限, 该操作不会生成 Err, 可直接 unwrap.
        let risk = self.bands.categorize(NotNan::new(coronary.agatston).unwrap());
        debug!(
            "{subject_id}: {} lesions, coronary agatston {:.1} ({risk})",
            lesions.len(),
            coronary.agatston
        );
        Ok(ScoreRecord {
            subject_id: subject_id.to_string(),
            classes,
            coronary,
            total,
            risk,
        })
    }
}
