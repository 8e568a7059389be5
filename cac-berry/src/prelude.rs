//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::{CacError, CacResult};
pub use crate::{GridAttr, HuRange, LabelVolume, SliceOrder, Volume, VoxelGrid};

pub use crate::consts::hu::CALCIUM_THRESHOLD;
pub use crate::consts::{label, CalciumClass, Connectivity};

pub use crate::classify::{ClassifierRole, PrecomputedLabels, VoxelClassifier};
pub use crate::dataset::{self, home_dataset_dir_with, Kernel, MetadataTable, Split};
pub use crate::lesion::{Lesion, LesionExtractor};
pub use crate::pipeline::{ArtifactLayout, BatchReport, Pipeline, PipelineConfig, Stage};
pub use crate::post_proc::{RegionGrower, Seed};
pub use crate::resample::{ResampleSpec, VolumeResampler};
pub use crate::score::{RiskBands, RiskCategory, ScoreEngine, ScoreRecord};
