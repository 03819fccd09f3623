//! Morphmap 基础类型
//!
//! 提供地图引擎各阶段共享的值类型和计算：
//!
//! # 架构设计
//!
//! - `Tile`: 四叉树金字塔中的瓦片地址，按值比较与哈希
//! - `ProjectionModel`: 球面/平面两种投影及其过渡混合
//! - `Frustum`: 从视图投影矩阵提取的六个裁剪平面
//! - `MapConfig`: 可序列化的运行配置
//!
//! # 示例
//!
//! ```rust
//! use morphmap_core::prelude::*;
//!
//! let view = ViewState::from_zoom(3.5);
//! assert_eq!(view.mode, ViewMode::Globe);
//!
//! let tile = Tile::new(1, 1, 1);
//! assert_eq!(tile.parent(), Some(Tile::new(0, 0, 0)));
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod frustum;
pub mod label;
pub mod math;
pub mod perf;
pub mod projection;
pub mod tile;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::buffer::GrowBuffer;
    pub use crate::config::MapConfig;
    pub use crate::error::CoreError;
    pub use crate::frustum::Frustum;
    pub use crate::label::{PointLabel, RoadGlyph, RoadPath, TileContent};
    pub use crate::math::{BoundingBox3, Matrix4, Point2, Point3, Vector2, Vector3};
    pub use crate::projection::{Pan, ProjectionModel, ViewMode, ViewState};
    pub use crate::tile::Tile;
}
