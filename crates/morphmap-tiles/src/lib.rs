//! Morphmap 瓦片管线
//!
//! 每帧依次执行：
//! - `selector`: 视锥裁剪的四叉树遍历，得到可见瓦片集合
//! - `sorter`: 按级别和离中心的距离排序
//! - `placement`: 为缺失的瓦片寻找已驻留的替代瓦片，同时分配图集格子
//! - `retention`: 让刚离开视野的瓦片再保留一段时间

pub mod atlas;
pub mod placement;
pub mod retention;
pub mod selector;
pub mod sorter;
pub mod tile_set;

pub use atlas::{AtlasPacker, AtlasSlot, TileMapping, UvTransform};
pub use placement::{PlaceContext, PlacedTile, PlacementResolver};
pub use retention::{hash_tracked, TileRetentionTracker, TrackedTile};
pub use selector::TileSelector;
pub use sorter::sort_for_rendering;
pub use tile_set::{hash_tiles, TileSetTracker};
