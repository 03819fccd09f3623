//! 瓦片携带的标注数据
//!
//! 由外部解码器产出，坐标使用瓦片内 4096 单位，`y` 向下。

use crate::math::{Point2, Vector2};
use crate::tile::{Tile, TILE_EXTENT};
use serde::{Deserialize, Serialize};

/// 点标注
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLabel {
    /// 由内容推出的稳定身份键
    pub key: u64,

    /// 标注文字
    pub text: String,

    /// 锚点（瓦片单位）
    pub anchor: Point2,

    /// 文字包围尺寸（像素）
    pub size_px: Vector2,

    /// 文字网格的顶点数
    pub vertex_count: u32,
}

impl PointLabel {
    /// 瓦片内归一化坐标
    pub fn anchor_uv(&self) -> Point2 {
        Point2::new(self.anchor.x / TILE_EXTENT, self.anchor.y / TILE_EXTENT)
    }
}

/// 道路标注中的单个字形
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RoadGlyph {
    /// 水平步进（像素），缺失字形为 0
    pub advance_px: f64,

    /// 字形尺寸（像素）
    pub size_px: Vector2,
}

impl RoadGlyph {
    /// 缺失字形的占位
    pub fn placeholder() -> Self {
        Self::default()
    }
}

/// 沿折线排布的道路标注
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadPath {
    pub key: u64,
    pub text: String,

    /// 折线点（瓦片单位）
    pub points: Vec<Point2>,

    pub glyphs: Vec<RoadGlyph>,
}

impl RoadPath {
    /// 整条标注的像素宽度
    pub fn label_width_px(&self) -> f64 {
        self.glyphs.iter().map(|g| g.advance_px).sum()
    }

    /// 折线弧长（瓦片单位）
    pub fn arc_length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// 弧长位置对应的线段序号和段内参数
    pub fn locate(&self, distance: f64) -> Option<(usize, f64)> {
        let mut walked = 0.0;
        let last = self.points.len().checked_sub(2)?;
        for (i, w) in self.points.windows(2).enumerate() {
            let len = (w[1] - w[0]).norm();
            if distance <= walked + len || i == last {
                let t = if len > 0.0 { ((distance - walked) / len).clamp(0.0, 1.0) } else { 0.0 };
                return Some((i, t));
            }
            walked += len;
        }
        None
    }
}

/// 驻留瓦片的内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileContent {
    pub tile: Tile,

    /// 几何顶点数
    pub vertex_count: u32,

    /// 几何索引数
    pub index_count: u32,

    pub points: Vec<PointLabel>,

    pub roads: Vec<RoadPath>,
}

impl TileContent {
    /// 空内容
    pub fn empty(tile: Tile) -> Self {
        Self {
            tile,
            vertex_count: 0,
            index_count: 0,
            points: Vec::new(),
            roads: Vec::new(),
        }
    }

    /// 估算内存占用（字节），用于缓存预算
    pub fn byte_size(&self) -> usize {
        let geometry = self.vertex_count as usize * 16 + self.index_count as usize * 4;
        let points: usize = self
            .points
            .iter()
            .map(|p| std::mem::size_of::<PointLabel>() + p.text.len())
            .sum();
        let roads: usize = self
            .roads
            .iter()
            .map(|r| {
                std::mem::size_of::<RoadPath>()
                    + r.text.len()
                    + r.points.len() * std::mem::size_of::<Point2>()
                    + r.glyphs.len() * std::mem::size_of::<RoadGlyph>()
            })
            .sum();
        std::mem::size_of::<Self>() + geometry + points + roads
    }

    /// 是否带有标注
    pub fn has_labels(&self) -> bool {
        !self.points.is_empty() || !self.roads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::approx_eq;

    fn road() -> RoadPath {
        RoadPath {
            key: 7,
            text: "Main".into(),
            points: vec![Point2::new(0.0, 0.0), Point2::new(300.0, 0.0), Point2::new(300.0, 400.0)],
            glyphs: vec![
                RoadGlyph {
                    advance_px: 8.0,
                    size_px: Vector2::new(8.0, 12.0),
                },
                RoadGlyph::placeholder(),
            ],
        }
    }

    #[test]
    fn test_road_metrics() {
        let road = road();
        assert!(approx_eq(road.arc_length(), 700.0));
        assert!(approx_eq(road.label_width_px(), 8.0));
    }

    #[test]
    fn test_locate() {
        let road = road();
        let (seg, t) = road.locate(150.0).unwrap();
        assert_eq!(seg, 0);
        assert!(approx_eq(t, 0.5));

        let (seg, t) = road.locate(500.0).unwrap();
        assert_eq!(seg, 1);
        assert!(approx_eq(t, 0.5));

        let single = RoadPath {
            points: vec![Point2::origin()],
            ..road
        };
        assert!(single.locate(0.0).is_none());
    }

    #[test]
    fn test_byte_size_grows_with_content() {
        let tile = Tile::new(0, 0, 0);
        let empty = TileContent::empty(tile);
        let mut full = empty.clone();
        full.vertex_count = 100;
        full.roads.push(road());
        assert!(full.byte_size() > empty.byte_size() + 1600);
        assert!(full.has_labels());
        assert!(!empty.has_labels());
    }
}
