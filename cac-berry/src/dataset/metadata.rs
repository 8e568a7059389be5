//! 数据集元数据表.
//!
//! TSV 格式, 允许 `#` 注释与空行, 第一个非注释行为表头. 列:
//!
//! | 列名 | 取值 |
//! |------|------|
//! | `subject_id` | 受试者 ID |
//! | `slice_thickness` | 采集层厚, 毫米 |
//! | `slice_order` | `feet-to-head` 或 `head-to-feet` |
//! | `kernel` | `soft` 或 `sharp` |
//! | `split` | `train`, `valid` 或 `test` |
//!
//! 列的顺序任意, 多余的列被忽略.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::{CacError, CacResult, SliceOrder};

/// 重建核.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Kernel {
    /// 软组织核.
    Soft,

    /// 锐利核.
    Sharp,
}

impl Kernel {
    /// 表中使用的名字.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Sharp => "sharp",
        }
    }
}

impl FromStr for Kernel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "soft" => Ok(Self::Soft),
            "sharp" => Ok(Self::Sharp),
            _ => Err(format!("未知的重建核 `{s}`, 应为 soft 或 sharp")),
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 数据集划分.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Split {
    /// 训练集.
    Train,

    /// 验证集.
    Valid,

    /// 测试集.
    Test,
}

impl Split {
    /// 表中使用的名字.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Valid => "valid",
            Self::Test => "test",
        }
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "valid" => Ok(Self::Valid),
            "test" => Ok(Self::Test),
            _ => Err(format!("未知的数据集划分 `{s}`, 应为 train, valid 或 test")),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 单个受试者的元数据.
#[derive(Clone, Debug, PartialEq)]
pub struct SubjectMeta {
    /// 受试者 ID.
    pub subject_id: String,

    /// 采集层厚, 毫米.
    pub slice_thickness: f64,

    /// 切片方向.
    pub slice_order: SliceOrder,

    /// 重建核.
    pub kernel: Kernel,

    /// 数据集划分.
    pub split: Split,
}

const COLUMNS: [&str; 5] = ["subject_id", "slice_thickness", "slice_order", "kernel", "split"];

/// 元数据表. 以受试者 ID 为键, 按 ID 升序迭代.
#[derive(Clone, Debug, Default)]
pub struct MetadataTable {
    rows: BTreeMap<String, SubjectMeta>,
}

impl MetadataTable {
    /// 从 TSV 文件加载.
    pub fn load<P: AsRef<Path>>(path: P) -> CacResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    /// 解析 TSV 文本. `source` 用于错误信息.
    pub fn parse(content: &str, source: &str) -> CacResult<Self> {
        let err = |line: usize, reason: String| CacError::Metadata {
            source_name: source.to_string(),
            line,
            reason,
        };

        let mut lines = content
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

        let (header_no, header) = lines
            .next()
            .ok_or_else(|| err(1, "缺少表头".to_string()))?;
        let header: Vec<&str> = header.split('\t').map(str::trim).collect();
        let mut index = [0usize; 5];
        for (slot, col) in index.iter_mut().zip(COLUMNS) {
            *slot = header
                .iter()
                .position(|h| *h == col)
                .ok_or_else(|| err(header_no, format!("缺少列 `{col}`")))?;
        }
        let [i_id, i_thick, i_order, i_kernel, i_split] = index;

        let mut rows = BTreeMap::new();
        for (line_no, line) in lines {
            let parts: Vec<&str> = line.split('\t').map(str::trim).collect();
            if parts.len() != header.len() {
                return Err(err(
                    line_no,
                    format!("应有 {} 列, 实际为 {} 列", header.len(), parts.len()),
                ));
            }
            if let Some(c) = index.iter().find(|c| parts[**c].is_empty()) {
                return Err(err(line_no, format!("字段 `{}` 为空", header[*c])));
            }

            let slice_thickness: f64 = parts[i_thick]
                .parse()
                .map_err(|_| err(line_no, format!("slice_thickness `{}` 不是合法数值", parts[i_thick])))?;
            let meta = SubjectMeta {
                subject_id: parts[i_id].to_string(),
                slice_thickness,
                slice_order: parts[i_order].parse().map_err(|e| err(line_no, e))?,
                kernel: parts[i_kernel].parse().map_err(|e| err(line_no, e))?,
                split: parts[i_split].parse().map_err(|e| err(line_no, e))?,
            };
            if rows.insert(meta.subject_id.clone(), meta).is_some() {
                return Err(err(
                    line_no,
                    format!("受试者 `{}` 重复出现", parts[i_id]),
                ));
            }
        }
        Ok(Self { rows })
    }

    /// 受试者个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 表是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 获取受试者元数据, 不存在时返回 `MissingMetadata`.
    pub fn get(&self, subject_id: &str) -> CacResult<&SubjectMeta> {
        self.rows
            .get(subject_id)
            .ok_or_else(|| CacError::MissingMetadata(subject_id.to_string()))
    }

    /// 按 ID 升序迭代全部受试者.
    pub fn iter(&self) -> impl Iterator<Item = &SubjectMeta> + '_ {
        self.rows.values()
    }

    /// `subject_id` 是否满足划分与 (可选的) 重建核筛选条件.
    ///
    /// 不在表中的受试者返回 `MissingMetadata`.
    pub fn selects(&self, subject_id: &str, split: Split, kernel: Option<Kernel>) -> CacResult<bool> {
        let m = self.get(subject_id)?;
        Ok(m.split == split && kernel.map_or(true, |k| m.kernel == k))
    }
}
