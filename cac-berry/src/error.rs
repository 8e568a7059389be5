//! 运行时错误.

use crate::consts::hu::CALCIUM_THRESHOLD;

/// 核心库的运行时错误.
///
/// 前四种是领域错误, 说明数据或配置存在缺陷, 不应自动重试.
/// 其余是底层 I/O 与编解码错误.
#[derive(Debug, thiserror::Error)]
pub enum CacError {
    /// 非正或自相矛盾的间距请求.
    #[error("非法间距: {0}")]
    InvalidSpacing(String),

    /// 受试者不在元数据表中.
    #[error("元数据表中不存在受试者 `{0}`")]
    MissingMetadata(String),

    /// 标签体与其配对的强度体网格不一致.
    #[error("体素网格不一致: {0}")]
    ShapeMismatch(String),

    /// 试图将低于钙化下限的体素作为钙化评分.
    #[error(
        "类别 {class} 的病灶包含 {hu} HU 的体素, 低于钙化下限 {floor} HU",
        floor = CALCIUM_THRESHOLD
    )]
    ThresholdViolation {
        /// 病灶类别标签.
        class: u8,

        /// 违规体素的 HU 值.
        hu: f32,
    },

    /// 元数据表格式错误. `(来源, 行号, 原因)`.
    #[error("元数据表 {source_name}:{line} 格式错误: {reason}")]
    Metadata {
        /// 来源 (一般是文件路径).
        source_name: String,

        /// 从 1 开始的行号.
        line: usize,

        /// 原因.
        reason: String,
    },

    /// 外部分类器没有给出可用结果.
    #[error("分类器错误: {0}")]
    Classifier(String),

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// nifti 读取错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// npz 读取错误.
    #[error(transparent)]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),

    /// npz 写入错误.
    #[error(transparent)]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),

    /// 评分记录编解码错误.
    #[error(transparent)]
    Encode(#[from] bincode::Error),
}

impl CacError {
    /// 稳定的错误种类名, 用于失败日志.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSpacing(_) => "InvalidSpacingError",
            Self::MissingMetadata(_) => "MissingMetadataError",
            Self::ShapeMismatch(_) => "ShapeMismatchError",
            Self::ThresholdViolation { .. } => "ThresholdViolationError",
            Self::Metadata { .. } => "MetadataFormatError",
            Self::Classifier(_) => "ClassifierError",
            Self::Io(_) => "IoError",
            Self::Nifti(_) => "NiftiError",
            Self::ReadNpz(_) | Self::WriteNpz(_) => "NpzError",
            Self::Encode(_) => "EncodeError",
        }
    }
}

/// 核心库运行时结果.
pub type CacResult<T> = Result<T, CacError>;
