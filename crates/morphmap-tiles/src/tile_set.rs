//! 瓦片集合的变化检测

use morphmap_core::tile::Tile;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// 有序瓦片序列的哈希，包含粗粒度标记
pub fn hash_tiles<'a>(tiles: impl IntoIterator<Item = &'a Tile>) -> u64 {
    let mut hasher = DefaultHasher::new();
    let mut count = 0usize;
    for tile in tiles {
        tile.hash(&mut hasher);
        tile.is_coarse.hash(&mut hasher);
        count += 1;
    }
    count.hash(&mut hasher);
    hasher.finish()
}

/// 记住上一帧的可见集合
#[derive(Debug, Clone, Default)]
pub struct TileSetTracker {
    tiles: Vec<Tile>,
    hash: Option<u64>,
}

impl TileSetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录新的集合，返回是否与上一次不同
    pub fn update(&mut self, tiles: &[Tile]) -> bool {
        let hash = hash_tiles(tiles);
        let changed = self.hash != Some(hash);
        if changed {
            self.tiles.clear();
            self.tiles.extend_from_slice(tiles);
            self.hash = Some(hash);
        }
        changed
    }

    /// 上一次记录的集合
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn hash(&self) -> Option<u64> {
        self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_detection() {
        let mut tracker = TileSetTracker::new();
        let a = [Tile::new(0, 0, 1), Tile::new(1, 0, 1)];
        assert!(tracker.update(&a));
        assert!(!tracker.update(&a));
        assert_eq!(tracker.tiles(), &a);

        // 只改变粗粒度标记也算变化
        let b = [Tile::new(0, 0, 1).into_coarse(), Tile::new(1, 0, 1)];
        assert!(tracker.update(&b));
        assert_ne!(hash_tiles(&a), hash_tiles(&b));
    }
}
