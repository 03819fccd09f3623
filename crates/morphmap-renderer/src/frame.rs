//! 帧上下文
//!
//! 跨帧的去抖状态集中在这里：可见集合、驻留哈希、追踪哈希、缩放分桶和瓦片单位/像素比。
//! 每一项都只在变化时触发对应的重算。

use morphmap_core::tile::Tile;
use morphmap_tiles::{sort_for_rendering, PlaceContext, TileSetTracker};
use std::collections::BTreeSet;

/// 本帧需要的标注重建
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelWork {
    /// 全量重建
    pub rebuild_all: bool,
    /// 只重建道路标注实例
    pub rebuild_roads: bool,
    /// 本帧使用的瓦片单位/像素比
    pub tile_units_per_pixel: f64,
}

/// 帧上下文
#[derive(Debug, Clone)]
pub struct FrameContext {
    visible: TileSetTracker,
    sorted: Vec<Tile>,
    storage_hash: Option<u64>,
    placement: PlaceContext,
    tracked_hash: Option<u64>,
    zoom_bucket: Option<i64>,
    tile_units_per_pixel: f64,
    epsilon: f64,
}

impl FrameContext {
    /// `epsilon` 为触发道路标注重建的瓦片单位/像素比变化阈值
    pub fn new(epsilon: f64) -> Self {
        Self {
            visible: TileSetTracker::new(),
            sorted: Vec::new(),
            storage_hash: None,
            placement: PlaceContext::empty(),
            tracked_hash: None,
            zoom_bucket: None,
            tile_units_per_pixel: 0.0,
            epsilon,
        }
    }

    /// 记录本帧可见集合，只有集合变化时才重新排序
    pub fn update_visible(&mut self, visible: &BTreeSet<Tile>, center: &Tile) -> bool {
        let tiles: Vec<Tile> = visible.iter().copied().collect();
        let changed = self.visible.update(&tiles);
        if changed {
            self.sorted = sort_for_rendering(visible, center);
        }
        changed
    }

    /// 按渲染顺序排好的可见瓦片
    pub fn sorted_tiles(&self) -> &[Tile] {
        &self.sorted
    }

    /// 记录驻留哈希，返回是否变化
    pub fn storage_changed(&mut self, hash: u64) -> bool {
        let changed = self.storage_hash != Some(hash);
        self.storage_hash = Some(hash);
        changed
    }

    /// 强制下一帧重新放置
    pub fn invalidate_storage(&mut self) {
        self.storage_hash = None;
    }

    pub fn placement(&self) -> &PlaceContext {
        &self.placement
    }

    pub fn set_placement(&mut self, placement: PlaceContext) {
        self.placement = placement;
    }

    /// 决定本帧的标注重建工作，并记住本次的判断依据
    ///
    /// 追踪哈希变化时全量重建；缩放跨过四分之一级的分桶，
    /// 或瓦片单位/像素比变化超过阈值时只重建道路标注。
    /// 比值无效时沿用上一次的值。
    pub fn decide_label_work(&mut self, tracked_hash: u64, zoom: f64, tile_units_per_pixel: Option<f64>) -> LabelWork {
        let tupp = tile_units_per_pixel
            .filter(|v| *v > 0.0 && v.is_finite())
            .unwrap_or(self.tile_units_per_pixel);
        let bucket = (zoom * 4.0).floor() as i64;

        let rebuild_all = self.tracked_hash != Some(tracked_hash);
        let rebuild_roads = rebuild_all
            || self.zoom_bucket != Some(bucket)
            || (tupp - self.tile_units_per_pixel).abs() > self.epsilon;

        if rebuild_all {
            self.tracked_hash = Some(tracked_hash);
        }
        if rebuild_roads {
            self.zoom_bucket = Some(bucket);
            self.tile_units_per_pixel = tupp;
        }

        LabelWork {
            rebuild_all,
            rebuild_roads,
            tile_units_per_pixel: tupp,
        }
    }

    pub fn tile_units_per_pixel(&self) -> f64 {
        self.tile_units_per_pixel
    }
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new(1e-4)
    }
}
