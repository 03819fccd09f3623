//! 瓦片放置
//!
//! 决定每个需要显示的瓦片用哪份驻留数据来画：
//! - 数据已驻留：画它自己
//! - 数据缺失且放大了：先找上一帧中完整覆盖它的粗瓦片，找不到再用它内部的细瓦片
//! - 数据缺失且缩小了：只用它内部的细瓦片
//!
//! 每个放置都占一个图集格子，图集满了就停止。同一个目标只放置一次。

use crate::atlas::{AtlasPacker, AtlasSlot, UvTransform};
use morphmap_core::tile::Tile;
use std::collections::HashSet;
use tracing::debug;

/// 一次放置：用 `source` 的数据画在 `target` 的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedTile {
    pub source: Tile,
    pub target: Tile,
    pub slot: AtlasSlot,
}

impl PlacedTile {
    /// 是否使用了替代数据
    pub fn is_replacement(&self) -> bool {
        self.source != self.target
    }

    /// 源数据到目标位置的坐标变换
    pub fn uv_transform(&self) -> UvTransform {
        UvTransform::for_substitute(&self.source, &self.target)
    }
}

/// 一帧的放置结果，下一帧用来寻找替代
#[derive(Debug, Clone, Default)]
pub struct PlaceContext {
    placed: Vec<PlacedTile>,
    zoom: u8,
}

impl PlaceContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn placed(&self) -> &[PlacedTile] {
        &self.placed
    }

    /// 生成本结果时的目标级别
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// 被使用的源瓦片，按首次出现的顺序去重
    pub fn source_tiles(&self) -> Vec<Tile> {
        let mut seen = HashSet::new();
        self.placed
            .iter()
            .map(|p| p.source)
            .filter(|t| seen.insert(*t))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Search {
    Found,
    NotFound,
    AtlasFull,
}

/// 放置求解器
#[derive(Debug, Clone, Default)]
pub struct PlacementResolver {
    verbose: bool,
}

impl PlacementResolver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 按渲染顺序为所需瓦片求放置
    ///
    /// `is_resident` 判断瓦片数据是否已在缓存中。
    pub fn resolve(
        &self,
        needed: &[Tile],
        is_resident: impl Fn(&Tile) -> bool,
        zoom: u8,
        previous: &PlaceContext,
        packer: &mut AtlasPacker,
    ) -> PlaceContext {
        packer.begin_frame();
        let mut placed = Vec::with_capacity(needed.len());
        let mut targets = HashSet::with_capacity(needed.len());
        let zoomed_in = zoom >= previous.zoom;

        for tile in needed {
            if targets.contains(tile) {
                continue;
            }

            if is_resident(tile) {
                let Some(slot) = packer.allocate() else {
                    break;
                };
                targets.insert(*tile);
                placed.push(PlacedTile {
                    source: *tile,
                    target: *tile,
                    slot,
                });
                continue;
            }

            let mut search = Search::NotFound;
            if zoomed_in {
                search = Self::full_replacement(tile, previous, packer, &mut targets, &mut placed);
            }
            if search == Search::NotFound {
                search = Self::partial_replacement(tile, previous, packer, &mut targets, &mut placed);
            }
            if search == Search::AtlasFull {
                break;
            }
            if self.verbose && search == Search::NotFound {
                debug!(tile = %tile, "no substitute for missing tile");
            }
        }

        if packer.is_exhausted() {
            debug!(placed = placed.len(), needed = needed.len(), "atlas full, remaining tiles dropped");
        }

        PlaceContext { placed, zoom }
    }

    /// 上一帧中完整覆盖目标的一个粗瓦片
    fn full_replacement(
        tile: &Tile,
        previous: &PlaceContext,
        packer: &mut AtlasPacker,
        targets: &mut HashSet<Tile>,
        placed: &mut Vec<PlacedTile>,
    ) -> Search {
        let Some(prev) = previous.placed.iter().find(|p| p.source.covers(tile)) else {
            return Search::NotFound;
        };
        let Some(slot) = packer.allocate() else {
            return Search::AtlasFull;
        };
        targets.insert(*tile);
        placed.push(PlacedTile {
            source: prev.source,
            target: *tile,
            slot,
        });
        Search::Found
    }

    /// 上一帧中位于目标内部的细瓦片，各自画在原来的位置
    fn partial_replacement(
        tile: &Tile,
        previous: &PlaceContext,
        packer: &mut AtlasPacker,
        targets: &mut HashSet<Tile>,
        placed: &mut Vec<PlacedTile>,
    ) -> Search {
        let mut found = false;
        for prev in previous.placed.iter().filter(|p| tile.covers(&p.source)) {
            if targets.contains(&prev.source) {
                continue;
            }
            let Some(slot) = packer.allocate() else {
                return Search::AtlasFull;
            };
            targets.insert(prev.source);
            placed.push(PlacedTile {
                source: prev.source,
                target: prev.source,
                slot,
            });
            found = true;
        }
        if found {
            Search::Found
        } else {
            Search::NotFound
        }
    }
}
