//! 通用常量.

use serde::{Deserialize, Serialize};
use std::fmt;

/// CT HU 值相关常量.
pub mod hu {
    /// 钙化评分的标准 HU 下限.
    pub const CALCIUM_THRESHOLD: f32 = 130.0;

    /// 重采样后 HU 值的下限. 部分厂商视野外的体素会低于 -1024.
    pub const CLAMP_MIN: f32 = -1000.0;

    /// 重采样后 HU 值的上限.
    pub const CLAMP_MAX: f32 = 3096.0;
}

/// 标签体素值.
pub mod label {
    /// 背景.
    pub const BACKGROUND: u8 = 0;

    /// 左前降支 / 左主干.
    pub const LAD_LM: u8 = 1;

    /// 左回旋支.
    pub const LCX: u8 = 2;

    /// 右冠状动脉.
    pub const RCA: u8 = 3;

    /// 主动脉.
    pub const AORTA: u8 = 4;

    /// 主动脉瓣.
    pub const AORTIC_VALVE: u8 = 5;

    /// 二尖瓣.
    pub const MITRAL_VALVE: u8 = 6;

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, BACKGROUND)
    }

    /// 体素是否属于冠状动脉 (计入冠脉总分)?
    #[inline]
    pub const fn is_coronary(p: u8) -> bool {
        matches!(p, LAD_LM | LCX | RCA)
    }

    /// 体素值是否是合法的类别标签?
    #[inline]
    pub const fn is_known(p: u8) -> bool {
        p <= MITRAL_VALVE
    }
}

/// 非背景的钙化类别.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum CalciumClass {
    /// 左前降支 / 左主干.
    LadLm,

    /// 左回旋支.
    Lcx,

    /// 右冠状动脉.
    Rca,

    /// 主动脉.
    Aorta,

    /// 主动脉瓣.
    AorticValve,

    /// 二尖瓣.
    MitralValve,
}

impl CalciumClass {
    /// 全部类别, 按标签值升序.
    pub const ALL: [CalciumClass; 6] = [
        Self::LadLm,
        Self::Lcx,
        Self::Rca,
        Self::Aorta,
        Self::AorticValve,
        Self::MitralValve,
    ];

    /// 从标签体素值构造. 背景或未知值返回 `None`.
    pub const fn from_label(p: u8) -> Option<Self> {
        match p {
            label::LAD_LM => Some(Self::LadLm),
            label::LCX => Some(Self::Lcx),
            label::RCA => Some(Self::Rca),
            label::AORTA => Some(Self::Aorta),
            label::AORTIC_VALVE => Some(Self::AorticValve),
            label::MITRAL_VALVE => Some(Self::MitralValve),
            _ => None,
        }
    }

    /// 对应的标签体素值.
    #[inline]
    pub const fn label(&self) -> u8 {
        match self {
            Self::LadLm => label::LAD_LM,
            Self::Lcx => label::LCX,
            Self::Rca => label::RCA,
            Self::Aorta => label::AORTA,
            Self::AorticValve => label::AORTIC_VALVE,
            Self::MitralValve => label::MITRAL_VALVE,
        }
    }

    /// 是否计入冠脉总分.
    #[inline]
    pub const fn is_coronary(&self) -> bool {
        label::is_coronary(self.label())
    }

    /// 导出表格中使用的名字.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LadLm => "LAD_LM",
            Self::Lcx => "LCX",
            Self::Rca => "RCA",
            Self::Aorta => "AORTA",
            Self::AorticValve => "AORTIC_VALVE",
            Self::MitralValve => "MITRAL_VALVE",
        }
    }
}

impl fmt::Display for CalciumClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 体素连通规则.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// 6-邻域, 仅共面.
    Six,

    /// 26-邻域, 共面, 共边或共顶点.
    #[default]
    TwentySix,
}

/// 6-邻域偏移量, `(dz, dh, dw)`.
const N6: [(isize, isize, isize); 6] = [
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (0, 0, -1),
    (0, 0, 1),
];

/// 26-邻域偏移量, `(dz, dh, dw)`, 行优先.
const N26: [(isize, isize, isize); 26] = [
    (-1, -1, -1),
    (-1, -1, 0),
    (-1, -1, 1),
    (-1, 0, -1),
    (-1, 0, 0),
    (-1, 0, 1),
    (-1, 1, -1),
    (-1, 1, 0),
    (-1, 1, 1),
    (0, -1, -1),
    (0, -1, 0),
    (0, -1, 1),
    (0, 0, -1),
    (0, 0, 1),
    (0, 1, -1),
    (0, 1, 0),
    (0, 1, 1),
    (1, -1, -1),
    (1, -1, 0),
    (1, -1, 1),
    (1, 0, -1),
    (1, 0, 0),
    (1, 0, 1),
    (1, 1, -1),
    (1, 1, 0),
    (1, 1, 1),
];

impl Connectivity {
    /// 命令行与产物目录中使用的名字.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Six => "6",
            Self::TwentySix => "26",
        }
    }

    /// 邻域偏移量.
    #[inline]
    pub fn offsets(&self) -> &'static [(isize, isize, isize)] {
        match self {
            Self::Six => &N6,
            Self::TwentySix => &N26,
        }
    }
}

impl std::str::FromStr for Connectivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6" => Ok(Self::Six),
            "26" => Ok(Self::TwentySix),
            _ => Err(format!("未知的邻接规则 `{s}`, 应为 6 或 26")),
        }
    }
}
