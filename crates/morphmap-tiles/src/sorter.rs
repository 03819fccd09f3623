//! 渲染顺序
//!
//! 先画级别高（面积小）的瓦片，同级别内离中心近的优先。排序是稳定的，
//! 距离相同的瓦片保持集合中的原有顺序，避免帧间闪烁。

use morphmap_core::tile::Tile;
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// 按渲染顺序排列瓦片
pub fn sort_for_rendering(tiles: &BTreeSet<Tile>, center: &Tile) -> Vec<Tile> {
    let mut sorted: Vec<Tile> = tiles.iter().copied().collect();
    sorted.sort_by_key(|t| (Reverse(t.z), t.manhattan_distance(center)));
    sorted
}
