//! 标注缓存
//!
//! 把标注瓦片中的点标注和道路标注拍平成连续数组，供逐帧的投影、碰撞和淡入淡出使用。
//! 同一个标识键在多个瓦片中出现时，只有第一次出现有效，其余标记为重复。
//! 重建前按键记录旧的动画状态，重建后原样恢复，保证 alpha 连续。

use crate::anchors::{center_out_ranks, compute_anchors};
use crate::fade::LabelState;
use crate::key::instance_key;
use crate::screen::TilePoint;
use morphmap_core::buffer::GrowBuffer;
use morphmap_core::config::LabelConfig;
use morphmap_core::label::TileContent;
use morphmap_core::math::{Point2, Vector2};
use morphmap_core::tile::{Tile, TILE_EXTENT};
use morphmap_tiles::TrackedTile;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// 一个标注瓦片及其内容
#[derive(Debug, Clone)]
pub struct LabelSource {
    pub tracked: TrackedTile,
    pub content: Arc<TileContent>,
}

/// 每个标注实例的运行时状态
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabelRuntime {
    pub key: u64,
    pub state: LabelState,
    /// 同键的前一次出现已经占用了该标注
    pub duplicate: bool,
    /// 来自保留期瓦片，只淡出不参与碰撞
    pub is_retained: bool,
}

/// 点标注输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointInput {
    pub point: TilePoint,
    /// 碰撞尺寸（像素）
    pub size_px: Vector2,
}

/// 一个点标注在标注顶点缓冲区中的范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawLabelRange {
    pub label_index: u32,
    pub vertex_start: u32,
    pub vertex_count: u32,
}

/// 道路折线
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathInput {
    pub key: u64,
    pub tile_index: u32,
    pub point_start: u32,
    pub point_count: u32,
    /// 弧长（瓦片单位）
    pub arc_length: f64,
    pub label_width_px: f64,
    pub glyph_start: u32,
    pub glyph_count: u32,
    pub is_retained: bool,
}

/// 道路标注的单个字形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathGlyph {
    pub advance_px: f64,
    pub size_px: Vector2,
}

/// 沿一条道路放置的一个标注实例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadInstance {
    pub key: u64,
    pub path_index: u32,
    /// 锚点所在线段，相对于折线起点
    pub segment: u32,
    /// 锚点在线段内的参数
    pub t: f64,
    pub glyph_start: u32,
    pub glyph_count: u32,
}

/// 字形放置输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadGlyphInput {
    pub instance_index: u32,
    /// 字形中心相对锚点的带符号偏移（像素）
    pub offset_px: f64,
    pub size_px: Vector2,
}

/// 标注缓存
#[derive(Debug, Default)]
pub struct LabelCache {
    config: LabelConfig,

    /// 标注瓦片表，`tile_index` 指向这里
    tiles: Vec<Tile>,

    points: GrowBuffer<PointInput>,
    draw_ranges: GrowBuffer<DrawLabelRange>,
    point_runtime: GrowBuffer<LabelRuntime>,

    path_points: GrowBuffer<TilePoint>,
    paths: GrowBuffer<PathInput>,
    path_glyphs: GrowBuffer<PathGlyph>,

    instances: GrowBuffer<RoadInstance>,
    road_glyphs: GrowBuffer<RoadGlyphInput>,
    road_runtime: GrowBuffer<LabelRuntime>,

    tile_units_per_pixel: f64,
    rebuild_count: u64,
    road_rebuild_count: u64,
}

impl LabelCache {
    pub fn new(config: LabelConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// 全量重建
    ///
    /// 粗瓦片只用于占位绘制，不提供标注。
    pub fn rebuild(&mut self, sources: &[LabelSource], tile_units_per_pixel: f64) {
        let previous = capture_states(&self.point_runtime);

        let mut tiles = Vec::new();
        let mut points = Vec::new();
        let mut ranges = Vec::new();
        let mut runtime = Vec::new();
        let mut path_points = Vec::new();
        let mut paths = Vec::new();
        let mut path_glyphs = Vec::new();
        let mut seen = HashSet::new();
        let mut vertex_start = 0u32;

        for source in sources.iter().filter(|s| !s.tracked.tile.is_coarse) {
            let tile_index = tiles.len() as u32;
            tiles.push(source.tracked.tile);
            let is_retained = source.tracked.is_retained;

            for label in &source.content.points {
                let duplicate = !seen.insert(label.key);
                let state = if duplicate {
                    LabelState::default()
                } else {
                    previous.get(&label.key).copied().unwrap_or_default()
                };
                ranges.push(DrawLabelRange {
                    label_index: points.len() as u32,
                    vertex_start,
                    vertex_count: label.vertex_count,
                });
                vertex_start += label.vertex_count;
                points.push(PointInput {
                    point: TilePoint {
                        uv: label.anchor_uv(),
                        tile_index,
                    },
                    size_px: label.size_px,
                });
                runtime.push(LabelRuntime {
                    key: label.key,
                    state,
                    duplicate,
                    is_retained,
                });
            }

            for road in source.content.roads.iter().filter(|r| r.points.len() >= 2) {
                paths.push(PathInput {
                    key: road.key,
                    tile_index,
                    point_start: path_points.len() as u32,
                    point_count: road.points.len() as u32,
                    arc_length: road.arc_length(),
                    label_width_px: road.label_width_px(),
                    glyph_start: path_glyphs.len() as u32,
                    glyph_count: road.glyphs.len() as u32,
                    is_retained,
                });
                path_points.extend(road.points.iter().map(|p| TilePoint {
                    uv: Point2::new(p.x / TILE_EXTENT, p.y / TILE_EXTENT),
                    tile_index,
                }));
                path_glyphs.extend(road.glyphs.iter().map(|g| PathGlyph {
                    advance_px: g.advance_px,
                    size_px: g.size_px,
                }));
            }
        }

        self.tiles = tiles;
        self.points.replace_with(points);
        self.draw_ranges.replace_with(ranges);
        self.point_runtime.replace_with(runtime);
        self.path_points.replace_with(path_points);
        self.paths.replace_with(paths);
        self.path_glyphs.replace_with(path_glyphs);
        self.rebuild_count += 1;

        self.rebuild_road_instances(tile_units_per_pixel);

        debug!(
            "标注重建: {} 个瓦片, {} 个点标注, {} 条道路, {} 个道路实例",
            self.tiles.len(),
            self.points.len(),
            self.paths.len(),
            self.instances.len()
        );
    }

    /// 只重建道路标注实例
    ///
    /// 锚点间距和标注宽度以像素给出，按当前的瓦片单位/像素比换算。
    /// 比值无效（非正数或非有限值）时沿用上一次的值。
    pub fn rebuild_road_instances(&mut self, tile_units_per_pixel: f64) {
        if tile_units_per_pixel > 0.0 && tile_units_per_pixel.is_finite() {
            self.tile_units_per_pixel = tile_units_per_pixel;
        }
        let tupp = self.tile_units_per_pixel;
        let previous = capture_states(&self.road_runtime);

        let mut instances = Vec::new();
        let mut glyphs = Vec::new();
        let mut runtime = Vec::new();
        let mut seen = HashSet::new();

        if tupp > 0.0 {
            for (path_index, path) in self.paths.iter().enumerate() {
                let width = path.label_width_px * tupp;
                if !(width > 0.0) || width > path.arc_length {
                    continue;
                }
                let repeat = self.config.road_repeat_distance_px * tupp;
                let anchors = compute_anchors(path.arc_length, width, repeat, self.config.max_road_instances);
                let start = path.point_start as usize;
                let points = &self.path_points[start..start + path.point_count as usize];
                let path_glyphs =
                    &self.path_glyphs[path.glyph_start as usize..(path.glyph_start + path.glyph_count) as usize];

                let ranks = center_out_ranks(&anchors, path.arc_length);
                for (anchor, rank) in anchors.into_iter().zip(ranks) {
                    let Some((segment, t)) = locate(points, anchor) else {
                        continue;
                    };
                    let key = instance_key(path.key, rank);
                    let duplicate = !seen.insert(key);
                    let state = if duplicate {
                        LabelState::default()
                    } else {
                        previous.get(&key).copied().unwrap_or_default()
                    };

                    let instance_index = instances.len() as u32;
                    let glyph_start = glyphs.len() as u32;
                    let mut pen = -path.label_width_px / 2.0;
                    for glyph in path_glyphs {
                        glyphs.push(RoadGlyphInput {
                            instance_index,
                            offset_px: pen + glyph.advance_px / 2.0,
                            size_px: glyph.size_px,
                        });
                        pen += glyph.advance_px;
                    }
                    instances.push(RoadInstance {
                        key,
                        path_index: path_index as u32,
                        segment: segment as u32,
                        t,
                        glyph_start,
                        glyph_count: path.glyph_count,
                    });
                    runtime.push(LabelRuntime {
                        key,
                        state,
                        duplicate,
                        is_retained: path.is_retained,
                    });
                }
            }
        }

        self.instances.replace_with(instances);
        self.road_glyphs.replace_with(glyphs);
        self.road_runtime.replace_with(runtime);
        self.road_rebuild_count += 1;
    }

    pub fn config(&self) -> &LabelConfig {
        &self.config
    }

    /// 标注瓦片表
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn points(&self) -> &[PointInput] {
        &self.points
    }

    pub fn draw_ranges(&self) -> &[DrawLabelRange] {
        &self.draw_ranges
    }

    pub fn point_runtime(&self) -> &[LabelRuntime] {
        &self.point_runtime
    }

    pub fn point_runtime_mut(&mut self) -> &mut [LabelRuntime] {
        &mut self.point_runtime
    }

    pub fn path_points(&self) -> &[TilePoint] {
        &self.path_points
    }

    pub fn paths(&self) -> &[PathInput] {
        &self.paths
    }

    pub fn instances(&self) -> &[RoadInstance] {
        &self.instances
    }

    pub fn road_glyphs(&self) -> &[RoadGlyphInput] {
        &self.road_glyphs
    }

    pub fn road_runtime(&self) -> &[LabelRuntime] {
        &self.road_runtime
    }

    pub fn road_runtime_mut(&mut self) -> &mut [LabelRuntime] {
        &mut self.road_runtime
    }

    /// 最近一次使用的瓦片单位/像素比
    pub fn tile_units_per_pixel(&self) -> f64 {
        self.tile_units_per_pixel
    }

    /// 全量重建次数
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }

    /// 道路实例重建次数（包含全量重建触发的）
    pub fn road_rebuild_count(&self) -> u64 {
        self.road_rebuild_count
    }

    /// 顶点缓冲区版本之和，任一数组重新分配后变化
    pub fn buffer_version(&self) -> u64 {
        self.points.version()
            + self.point_runtime.version()
            + self.path_points.version()
            + self.road_glyphs.version()
            + self.road_runtime.version()
    }
}

fn capture_states(runtime: &[LabelRuntime]) -> HashMap<u64, LabelState> {
    runtime
        .iter()
        .filter(|r| !r.duplicate)
        .map(|r| (r.key, r.state))
        .collect()
}

/// 弧长（瓦片单位）在折线上的位置
fn locate(points: &[TilePoint], distance: f64) -> Option<(usize, f64)> {
    let last = points.len().checked_sub(2)?;
    let mut walked = 0.0;
    for (i, w) in points.windows(2).enumerate() {
        let len = (w[1].uv - w[0].uv).norm() * TILE_EXTENT;
        if distance <= walked + len || i == last {
            let t = if len > 0.0 {
                ((distance - walked) / len).clamp(0.0, 1.0)
            } else {
                0.0
            };
            return Some((i, t));
        }
        walked += len;
    }
    None
}
