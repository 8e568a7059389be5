//! 中间产物的持久化存储.
//!
//! 体数据以 npz 归档保存, 包含 `data.npy`, `spacing.npy`, `origin.npy`, `order.npy` 四个条目;
//! 评分记录以 bincode 保存. 所有写入均先写临时文件再重命名,
//! 因此中断的运行不会留下半个产物.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::{arr1, Array1, Array3};
use ndarray_npy::{NpzReader, NpzWriter, ReadableElement, WritableElement};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{LabelVolume, SliceOrder, Volume, VoxelGrid};
use crate::{CacError, CacResult};

/// `path` 对应的临时文件路径, 与 `path` 位于同一目录.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 先写临时文件, 成功后重命名为 `path`.
///
/// `write` 失败时临时文件会被删除, `path` 保持原样.
pub fn write_atomic<P, F>(path: P, write: F) -> CacResult<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<File>) -> CacResult<()>,
{
    let path = path.as_ref();
    let tmp = temp_path(path);
    let res = File::create(&tmp)
        .map_err(CacError::from)
        .and_then(|file| {
            let mut w = BufWriter::new(file);
            write(&mut w)?;
            w.flush()?;
            w.get_ref().sync_all()?;
            Ok(())
        });
    match res {
        Ok(()) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn write_grid_npz<A: WritableElement>(
    w: &mut BufWriter<File>,
    data: &Array3<A>,
    grid: &VoxelGrid,
) -> CacResult<()> {
    let mut npz = NpzWriter::new(w);
    npz.add_array("data.npy", data)?;
    npz.add_array("spacing.npy", &arr1(&grid.spacing()))?;
    npz.add_array("origin.npy", &arr1(&grid.origin()))?;
    npz.add_array("order.npy", &arr1(&[grid.order().code()]))?;
    npz.finish()?;
    Ok(())
}

fn triple(a: &Array1<f64>, field: &str) -> CacResult<[f64; 3]> {
    match a.as_slice() {
        Some(&[z, y, x]) => Ok([z, y, x]),
        _ => Err(CacError::ShapeMismatch(format!(
            "产物字段 `{field}` 应有 3 个分量, 实际为 {}",
            a.len()
        ))),
    }
}

fn read_grid_npz<A: ReadableElement>(path: &Path) -> CacResult<(Array3<A>, VoxelGrid)> {
    let mut npz = NpzReader::new(BufReader::new(File::open(path)?))?;
    let data: Array3<A> = npz.by_name("data.npy")?;
    let spacing: Array1<f64> = npz.by_name("spacing.npy")?;
    let origin: Array1<f64> = npz.by_name("origin.npy")?;
    let order: Array1<u8> = npz.by_name("order.npy")?;

    let order = order
        .get(0)
        .and_then(|c| SliceOrder::from_code(*c))
        .ok_or_else(|| CacError::ShapeMismatch("产物字段 `order` 非法".to_string()))?;
    let grid = VoxelGrid::new(
        triple(&spacing, "spacing")?,
        triple(&origin, "origin")?,
        order,
    )?;
    Ok((data, grid))
}

impl Volume {
    /// 以 npz 格式原子地保存到 `path`.
    pub fn save_npz<P: AsRef<Path>>(&self, path: P) -> CacResult<()> {
        write_atomic(path, |w| write_grid_npz(w, &self.data, &self.grid))
    }

    /// 从 [`Volume::save_npz`] 写出的 npz 文件加载.
    pub fn load_npz<P: AsRef<Path>>(path: P) -> CacResult<Self> {
        let (data, grid) = read_grid_npz(path.as_ref())?;
        Ok(Self { grid, data })
    }
}

impl LabelVolume {
    /// 以 npz 格式原子地保存到 `path`.
    pub fn save_npz<P: AsRef<Path>>(&self, path: P) -> CacResult<()> {
        write_atomic(path, |w| write_grid_npz(w, &self.data, &self.grid))
    }

    /// 从 [`LabelVolume::save_npz`] 写出的 npz 文件加载.
    pub fn load_npz<P: AsRef<Path>>(path: P) -> CacResult<Self> {
        let (data, grid) = read_grid_npz(path.as_ref())?;
        Ok(Self { grid, data })
    }
}

/// 以 bincode 格式原子地保存 `value`.
pub fn save_bincode<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> CacResult<()> {
    write_atomic(path, |w| {
        bincode::serialize_into(w, value)?;
        Ok(())
    })
}

/// 加载 [`save_bincode`] 写出的文件.
pub fn load_bincode<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> CacResult<T> {
    let file = BufReader::new(File::open(path.as_ref())?);
    Ok(bincode::deserialize_from(file)?)
}
