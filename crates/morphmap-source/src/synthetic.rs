//! 本地合成瓦片
//!
//! 每个瓦片生成固定的几何规模、若干点标注和一条横穿瓦片的道路。
//! 区域标注的键只取决于上两级的祖先，相邻瓦片会产生同键标注。

use crate::error::SourceError;
use crate::provider::TileFetcher;
use futures::future::BoxFuture;
use futures::FutureExt;
use morphmap_core::label::{PointLabel, RoadGlyph, RoadPath, TileContent};
use morphmap_core::math::{Point2, Vector2};
use morphmap_core::tile::{Tile, TILE_EXTENT};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// 合成数据源
#[derive(Debug, Clone)]
pub struct SyntheticTileSource {
    /// 每个瓦片的点标注数
    pub points_per_tile: u32,
    /// 模拟网络延迟
    pub latency: Duration,
    /// 字形步进（像素）
    pub glyph_advance_px: f64,
}

impl Default for SyntheticTileSource {
    fn default() -> Self {
        Self {
            points_per_tile: 4,
            latency: Duration::from_millis(2),
            glyph_advance_px: 9.0,
        }
    }
}

fn hash_of(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl SyntheticTileSource {
    /// 生成瓦片内容
    pub fn generate(&self, tile: &Tile) -> TileContent {
        let tile = Tile::new(tile.x, tile.y, tile.z);
        let seed = hash_of(("tile", tile.z, tile.x, tile.y));
        let mut content = TileContent::empty(tile);
        content.vertex_count = 256 + (seed % 256) as u32;
        content.index_count = content.vertex_count * 3;

        for i in 0..self.points_per_tile {
            let h = hash_of((seed, i));
            let x = (h % 4000) as f64 + 48.0;
            let y = ((h >> 16) % 4000) as f64 + 48.0;
            let text = format!("P{}-{}-{}-{}", tile.z, tile.x, tile.y, i);
            content.points.push(self.point(hash_of(("point", seed, i)), text, x, y));
        }

        // 区域标注
        let region = tile.parent_at(tile.z.saturating_sub(2)).unwrap_or(Tile::ROOT);
        let text = format!("R{}-{}-{}", region.z, region.x, region.y);
        content.points.push(self.point(
            hash_of(("region", region.z, region.x, region.y)),
            text,
            TILE_EXTENT / 2.0,
            TILE_EXTENT / 2.0,
        ));

        let name = format!("Road {}", seed % 97);
        let y = 512.0 + (seed % 3072) as f64;
        content.roads.push(RoadPath {
            key: hash_of(("road", seed)),
            points: vec![
                Point2::new(0.0, y),
                Point2::new(TILE_EXTENT / 2.0, y + 256.0),
                Point2::new(TILE_EXTENT, y),
            ],
            glyphs: name
                .chars()
                .map(|c| {
                    if c.is_whitespace() {
                        RoadGlyph {
                            advance_px: self.glyph_advance_px / 2.0,
                            size_px: Vector2::zeros(),
                        }
                    } else {
                        RoadGlyph {
                            advance_px: self.glyph_advance_px,
                            size_px: Vector2::new(self.glyph_advance_px, 14.0),
                        }
                    }
                })
                .collect(),
            text: name,
        });
        content
    }

    fn point(&self, key: u64, text: String, x: f64, y: f64) -> PointLabel {
        let width = text.chars().count() as f64 * self.glyph_advance_px;
        PointLabel {
            key,
            vertex_count: text.chars().count() as u32 * 4,
            text,
            anchor: Point2::new(x, y),
            size_px: Vector2::new(width, 16.0),
        }
    }
}

impl TileFetcher for SyntheticTileSource {
    fn fetch(&self, tile: Tile) -> BoxFuture<'static, Result<Vec<u8>, SourceError>> {
        let latency = self.latency;
        let content = self.generate(&tile);
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok::<_, SourceError>(serde_json::to_vec(&content)?)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_content() {
        let source = SyntheticTileSource::default();
        let a = source.generate(&Tile::new(3, 5, 4));
        let b = source.generate(&Tile::new(3, 5, 4).with_loop(2));
        assert_eq!(a.points.len(), 5);
        assert_eq!(a.vertex_count, b.vertex_count);
        assert_eq!(a.points[0].key, b.points[0].key);
        assert!(a.has_labels());
        assert!(a.roads[0].arc_length() > TILE_EXTENT);
    }

    #[test]
    fn test_region_label_shared_by_siblings() {
        let source = SyntheticTileSource::default();
        let a = source.generate(&Tile::new(4, 4, 4));
        let b = source.generate(&Tile::new(5, 5, 4));
        let c = source.generate(&Tile::new(12, 4, 4));
        let region = |content: &TileContent| content.points.last().map(|p| p.key);
        assert_eq!(region(&a), region(&b));
        assert_ne!(region(&a), region(&c));
    }
}
