//! 对 `cac-berry::dataset` 的更一层封装. 提供批处理默认目录.
//!
//! 每个目录都按相同规则确定: 环境变量非空时取其值, 否则取 `$HOME/dataset/cac` 下的子目录.

use std::env;
use std::path::PathBuf;

/// 读取环境变量 `key`, 为空或不存在时回退到 `$HOME/dataset/cac/{sub}`.
fn env_or_home(key: &str, sub: &str) -> Option<PathBuf> {
    match env::var(key) {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => cac_berry::dataset::home_dataset_dir_with(["cac", sub]),
    }
}

/// 获取原始扫描目录.
///
/// 1. 若环境变量 `$CAC_INPUT_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/cac/input`.
pub fn input_dir_from_env_or_home() -> Option<PathBuf> {
    env_or_home("CAC_INPUT_DIR", "input")
}

/// 获取工作目录.
///
/// 1. 若环境变量 `$CAC_SCRATCH_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/cac/scratch`.
pub fn scratch_dir_from_env_or_home() -> Option<PathBuf> {
    env_or_home("CAC_SCRATCH_DIR", "scratch")
}

/// 获取数据集元数据表路径.
///
/// 1. 若环境变量 `$CAC_METADATA` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/cac/metadata.tsv`.
pub fn metadata_path_from_env_or_home() -> Option<PathBuf> {
    env_or_home("CAC_METADATA", "metadata.tsv")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_home_fallback_layout() {
        if env::var_os("CAC_SCRATCH_DIR").is_some() {
            return;
        }
        if let Some(p) = scratch_dir_from_env_or_home() {
            assert!(p.ends_with("dataset/cac/scratch"));
        }
    }
}
