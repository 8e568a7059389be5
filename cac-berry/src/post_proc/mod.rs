//! 后处理流程集合.

mod grow;

pub use grow::{RegionGrower, Seed};
