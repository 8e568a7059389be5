//! 原始扫描的发现与加载.
//!
//! 输入目录下每个受试者对应一个文件, 形如 `{subject_id}.nii`, `{subject_id}.nii.gz`
//! 或 `{subject_id}.npz`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{CacResult, SliceOrder, Volume};

/// 原始扫描文件的格式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InputFormat {
    /// NIfTI, 可能经过 gzip 压缩.
    Nifti,

    /// npz 产物格式.
    Npz,
}

/// 一个受试者的原始扫描文件.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubjectInput {
    /// 受试者 ID.
    pub subject_id: String,

    /// 文件路径.
    pub path: PathBuf,

    /// 文件格式.
    pub format: InputFormat,
}

impl SubjectInput {
    /// 由文件路径识别受试者 ID 与格式. 不支持的文件返回 `None`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let name = path.file_name()?.to_str()?;
        let (id, format) = if let Some(id) = name.strip_suffix(".nii.gz") {
            (id, InputFormat::Nifti)
        } else if let Some(id) = name.strip_suffix(".nii") {
            (id, InputFormat::Nifti)
        } else if let Some(id) = name.strip_suffix(".npz") {
            (id, InputFormat::Npz)
        } else {
            return None;
        };
        (!id.is_empty()).then(|| Self {
            subject_id: id.to_string(),
            path: path.to_path_buf(),
            format,
        })
    }

    /// 加载扫描.
    ///
    /// NIfTI header 不携带切片方向, 由 `order` 给出; npz 文件自带方向, `order` 被忽略.
    pub fn open(&self, order: SliceOrder) -> CacResult<Volume> {
        match self.format {
            InputFormat::Nifti => Volume::open_nifti(&self.path, order),
            InputFormat::Npz => Volume::load_npz(&self.path),
        }
    }
}

/// 列出 `dir` 下所有受试者的原始扫描, 按 ID 升序.
///
/// 同一 ID 存在多个文件时, 优先级为 `.nii` > `.nii.gz` > `.npz`.
pub fn discover<P: AsRef<Path>>(dir: P) -> CacResult<Vec<SubjectInput>> {
    let mut found: BTreeMap<String, SubjectInput> = BTreeMap::new();
    for entry in std::fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(input) = SubjectInput::from_path(&path) else {
            continue;
        };
        let rank = |s: &SubjectInput| match (s.format, s.path.extension().and_then(|e| e.to_str())) {
            (InputFormat::Nifti, Some("nii")) => 0,
            (InputFormat::Nifti, _) => 1,
            (InputFormat::Npz, _) => 2,
        };
        match found.get(&input.subject_id) {
            Some(old) if rank(old) <= rank(&input) => {}
            _ => {
                found.insert(input.subject_id.clone(), input);
            }
        }
    }
    Ok(found.into_values().collect())
}
