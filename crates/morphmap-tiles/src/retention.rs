//! 瓦片保留追踪
//!
//! 每个瓦片的状态：可见 → 保留 → 过期。刚离开视野的瓦片在 `hold_seconds`
//! 内仍然输出（标记为保留），让标注和几何有时间淡出。

use crate::tile_set::hash_tiles;
use morphmap_core::tile::Tile;
use std::cmp::Reverse;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// 追踪输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedTile {
    pub tile: Tile,
    /// false 表示当前可见，true 表示处于保留期
    pub is_retained: bool,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    tile: Tile,
    last_seen: f64,
    is_retained: bool,
}

/// 瓦片保留追踪器
#[derive(Debug, Clone)]
pub struct TileRetentionTracker {
    hold_seconds: f64,
    entries: HashMap<Tile, Entry>,
}

impl TileRetentionTracker {
    pub fn new(hold_seconds: f64) -> Self {
        Self {
            hold_seconds,
            entries: HashMap::new(),
        }
    }

    /// 用当前可见瓦片更新状态
    ///
    /// 输出先是可见瓦片（保持输入顺序），再是保留瓦片，
    /// 按最近一次可见时间倒序，然后按级别倒序、`x`、`y`、`loop` 正序。
    pub fn update(&mut self, visible: &[Tile], now: f64) -> Vec<TrackedTile> {
        let mut visible_set = HashSet::with_capacity(visible.len());
        let mut result = Vec::with_capacity(self.entries.len().max(visible.len()));

        for tile in visible {
            if !visible_set.insert(*tile) {
                continue;
            }
            self.entries.insert(
                *tile,
                Entry {
                    tile: *tile,
                    last_seen: now,
                    is_retained: false,
                },
            );
            result.push(TrackedTile {
                tile: *tile,
                is_retained: false,
            });
        }

        let hold = self.hold_seconds;
        self.entries
            .retain(|tile, entry| visible_set.contains(tile) || now - entry.last_seen <= hold);

        let mut retained: Vec<Entry> = self
            .entries
            .values_mut()
            .filter(|e| !visible_set.contains(&e.tile))
            .map(|e| {
                e.is_retained = true;
                *e
            })
            .collect();
        retained.sort_by(|a, b| {
            b.last_seen
                .total_cmp(&a.last_seen)
                .then_with(|| (Reverse(a.tile.z), a.tile.x, a.tile.y, a.tile.loop_index).cmp(&(
                    Reverse(b.tile.z),
                    b.tile.x,
                    b.tile.y,
                    b.tile.loop_index,
                )))
        });

        result.extend(retained.into_iter().map(|e| TrackedTile {
            tile: e.tile,
            is_retained: e.is_retained,
        }));
        result
    }

    /// 当前追踪的瓦片数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// 追踪结果的哈希，包含粗粒度标记和保留标记
pub fn hash_tracked(tracked: &[TrackedTile]) -> u64 {
    let mut hasher = DefaultHasher::new();
    hash_tiles(tracked.iter().map(|t| &t.tile)).hash(&mut hasher);
    for t in tracked {
        t.is_retained.hash(&mut hasher);
    }
    hasher.finish()
}
