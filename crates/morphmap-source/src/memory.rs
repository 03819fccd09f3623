//! 内存瓦片缓存
//!
//! 按字节预算淘汰最久未使用的瓦片。环绕副本共享同一份内容，
//! 缓存键忽略 `loop_index` 和粗瓦片标记。

use morphmap_core::label::TileContent;
use morphmap_core::tile::Tile;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    content: Arc<TileContent>,
    bytes: usize,
    last_used: u64,
}

/// 驻留瓦片缓存
#[derive(Debug, Clone)]
pub struct MemoryTileCache {
    entries: HashMap<Tile, Entry>,
    budget_bytes: usize,
    total_bytes: usize,
    clock: u64,
}

fn storage_key(tile: &Tile) -> Tile {
    Tile::new(tile.x, tile.y, tile.z)
}

impl MemoryTileCache {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            budget_bytes,
            total_bytes: 0,
            clock: 0,
        }
    }

    /// 是否已驻留，不更新使用时间
    pub fn contains(&self, tile: &Tile) -> bool {
        self.entries.contains_key(&storage_key(tile))
    }

    /// 读取并标记为最近使用
    pub fn get(&mut self, tile: &Tile) -> Option<Arc<TileContent>> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(&storage_key(tile)).map(|e| {
            e.last_used = clock;
            e.content.clone()
        })
    }

    /// 把本帧绘制的瓦片标记为最近使用，未驻留的忽略
    pub fn touch(&mut self, tiles: &[Tile]) {
        for tile in tiles {
            self.clock += 1;
            let clock = self.clock;
            if let Some(entry) = self.entries.get_mut(&storage_key(tile)) {
                entry.last_used = clock;
            }
        }
    }

    /// 写入瓦片，超出预算时淘汰最久未使用的其他瓦片
    pub fn insert(&mut self, content: Arc<TileContent>) {
        let key = storage_key(&content.tile);
        let bytes = content.byte_size();
        self.clock += 1;
        if let Some(old) = self.entries.insert(
            key,
            Entry {
                content,
                bytes,
                last_used: self.clock,
            },
        ) {
            self.total_bytes -= old.bytes;
        }
        self.total_bytes += bytes;
        self.evict(&key);
    }

    fn evict(&mut self, keep: &Tile) {
        while self.total_bytes > self.budget_bytes {
            let victim = self
                .entries
                .iter()
                .filter(|(k, _)| *k != keep)
                .min_by_key(|(k, e)| (e.last_used, **k))
                .map(|(k, _)| *k);
            let Some(victim) = victim else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                self.total_bytes -= entry.bytes;
                debug!("淘汰瓦片 {} ({} 字节)", victim, entry.bytes);
            }
        }
    }

    /// 一组瓦片及其驻留情况的哈希，请求集合或驻留情况变化时变化
    pub fn residency_hash(&self, tiles: &[Tile]) -> u64 {
        let mut hasher = DefaultHasher::new();
        for tile in tiles {
            tile.hash(&mut hasher);
            self.contains(tile).hash(&mut hasher);
        }
        hasher.finish()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }
}
