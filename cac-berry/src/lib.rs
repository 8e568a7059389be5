#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 将胸部 CT 扫描转换为冠状动脉钙化 (CAC) 定量评分.
//!
//! 该 crate 只负责学习模型 **以外** 的确定性部分: 重采样, 区域生长,
//! 病灶提取, Agatston/体积/质量评分, 风险分级, 以及批处理编排.
//! 体素分类器 (候选检测与假阳性抑制) 仅以 [`classify::VoxelClassifier`]
//! 能力接口的形式出现.
//!
//! # 注意
//!
//! 1. 所有三维数据均以 `(z, h, w)` 顺序访问, 间距与原点也以 `(z, y, x)` 顺序保存.
//! 2. 数据缺陷 (非法间距, 网格不一致, 缺失元数据等) 以 [`CacError`] 返回,
//!   不会 panic. 程序内部不变量被破坏时才会 panic.
//!
//! # 开发计划
//!
//! ### 体数据与体素网格 ✅
//!
//! `Volume` (HU) 和 `LabelVolume` (钙化类别) 共享同一种 `VoxelGrid`,
//! 配对检查失败时返回 `ShapeMismatch`.
//!
//! 实现位于 `cac-berry/src/data`.
//!
//! ### 加权平均重采样 ✅
//!
//! 按切片重叠长度加权, 模拟厚层采集带来的部分容积效应;
//! 平面内双线性插值; 标签使用最大重叠 / 最近邻, 永远不做平均.
//!
//! 实现位于 `cac-berry/src/resample`.
//!
//! ### 分类器能力接口 ✅
//!
//! 候选检测器和假阳性抑制器两种角色. 离线批处理结果可以通过
//! `PrecomputedLabels` 直接接入.
//!
//! 实现位于 `cac-berry/src/classify.rs`.
//!
//! ### 区域生长 ✅
//!
//! 以分类器阳性体素为种子做 BFS, 以 130 HU 为边界.
//! 竞争体素按种子处理顺序先到先得.
//!
//! 实现位于 `cac-berry/src/post_proc`.
//!
//! ### 病灶提取 ✅
//!
//! 各类别独立的 6-/26-连通分量.
//!
//! 实现位于 `cac-berry/src/lesion`.
//!
//! ### Agatston / 体积 / 质量评分与风险分级 ✅
//!
//! 实现位于 `cac-berry/src/score`.
//!
//! ### 批处理编排 ✅
//!
//! 原子写入中间产物, 断点续跑, 按受试者隔离失败.
//!
//! 实现位于 `cac-berry/src/pipeline`.
//!
//! ### 在原始非重叠切片网格上评分 ⌛️
//!
//! 目前直接在重采样后的 (可能重叠的) 切片网格上评分.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 3D CT 体数据基础结构.
mod data;

mod error;

pub use data::{GridAttr, HuRange, LabelVolume, SliceOrder, Volume, VoxelGrid};

pub use data::artifact;

pub use error::{CacError, CacResult};

pub mod consts;

pub mod classify;

pub mod dataset;

pub mod lesion;

pub mod pipeline;

pub mod post_proc;

pub mod prelude;

pub mod resample;

pub mod score;
