//! 道路标注逐字形放置
//!
//! 锚点由缓存给出（线段序号 + 段内参数），每个字形从锚点沿屏幕折线走过自己的带符号偏移。
//! 锚点所在线段在屏幕上指向左侧时整体翻转，保证文字朝上。

use crate::cache::{LabelCache, LabelRuntime, RoadInstance};
use crate::screen::ScreenPoint;
use morphmap_core::math::{Point2, Vector2};
use rayon::prelude::*;
use std::f64::consts::PI;

/// 单个字形的屏幕放置
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlyphPlacement {
    /// 字形中心（像素）
    pub position: Point2,
    /// 切线角度（弧度）
    pub angle: f64,
    pub visible: bool,
}

impl GlyphPlacement {
    pub const HIDDEN: GlyphPlacement = GlyphPlacement {
        position: Point2::new(0.0, 0.0),
        angle: 0.0,
        visible: false,
    };
}

/// 放置缓存中全部道路字形
///
/// `projected_path` 与 `cache.path_points()` 一一对应。
pub fn place_glyphs(cache: &LabelCache, projected_path: &[ScreenPoint], viewport: Vector2) -> Vec<GlyphPlacement> {
    let instances = cache.instances();
    let paths = cache.paths();
    cache
        .road_glyphs()
        .par_iter()
        .map(|glyph| {
            let Some(instance) = instances.get(glyph.instance_index as usize) else {
                return GlyphPlacement::HIDDEN;
            };
            let Some(path) = paths.get(instance.path_index as usize) else {
                return GlyphPlacement::HIDDEN;
            };
            let start = path.point_start as usize;
            let end = start + path.point_count as usize;
            match projected_path.get(start..end) {
                Some(points) => place_glyph(points, instance, glyph.offset_px, viewport),
                None => GlyphPlacement::HIDDEN,
            }
        })
        .collect()
}

/// 在一条已投影的折线上放置单个字形
pub fn place_glyph(points: &[ScreenPoint], instance: &RoadInstance, offset_px: f64, viewport: Vector2) -> GlyphPlacement {
    let segment = instance.segment as usize;
    let (Some(a), Some(b)) = (points.get(segment), points.get(segment + 1)) else {
        return GlyphPlacement::HIDDEN;
    };
    if !a.projected || !b.projected {
        return GlyphPlacement::HIDDEN;
    }

    let flipped = b.position.x - a.position.x < 0.0;
    let offset = if flipped { -offset_px } else { offset_px };

    let Some((position, landed)) = walk(points, segment, instance.t, offset) else {
        return GlyphPlacement::HIDDEN;
    };
    let d = points[landed + 1].position - points[landed].position;
    let mut angle = d.y.atan2(d.x);
    if flipped {
        angle += PI;
    }
    let on_screen =
        position.x >= 0.0 && position.x <= viewport.x && position.y >= 0.0 && position.y <= viewport.y;

    GlyphPlacement {
        position,
        angle,
        visible: on_screen,
    }
}

/// 从线段 `segment` 的参数 `t` 处沿折线走 `offset` 像素
///
/// 走出折线两端或经过未投影的点时返回 `None`。
fn walk(points: &[ScreenPoint], segment: usize, t: f64, offset: f64) -> Option<(Point2, usize)> {
    let segment_len = |i: usize| -> Option<f64> {
        let (a, b) = (points.get(i)?, points.get(i + 1)?);
        (a.projected && b.projected).then(|| (b.position - a.position).norm())
    };
    let at = |i: usize, u: f64| points[i].position + (points[i + 1].position - points[i].position) * u;

    let mut i = segment;
    if offset >= 0.0 {
        // 到当前线段起点的距离
        let mut remaining = offset + t * segment_len(i)?;
        loop {
            let len = segment_len(i)?;
            if remaining <= len {
                let u = if len > 0.0 { remaining / len } else { 0.0 };
                return Some((at(i, u), i));
            }
            remaining -= len;
            i += 1;
        }
    } else {
        // 到当前线段终点的距离
        let mut remaining = -offset + (1.0 - t) * segment_len(i)?;
        loop {
            let len = segment_len(i)?;
            if remaining <= len {
                let u = if len > 0.0 { 1.0 - remaining / len } else { 1.0 };
                return Some((at(i, u), i));
            }
            remaining -= len;
            i = i.checked_sub(1)?;
        }
    }
}

/// 实例可见性：全部字形可见才可见，重复和保留实例始终不可见
pub fn reduce_instance_visibility(
    instances: &[RoadInstance],
    glyph_visible: &[bool],
    runtime: &[LabelRuntime],
) -> Vec<bool> {
    instances
        .par_iter()
        .zip(runtime.par_iter())
        .map(|(instance, r)| {
            if r.duplicate || r.is_retained || instance.glyph_count == 0 {
                return false;
            }
            let start = instance.glyph_start as usize;
            glyph_visible
                .get(start..start + instance.glyph_count as usize)
                .is_some_and(|range| range.iter().all(|&v| v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(x: f64, y: f64) -> ScreenPoint {
        ScreenPoint {
            position: Point2::new(x, y),
            depth: 0.5,
            projected: true,
            visible: true,
        }
    }

    fn instance(segment: u32, t: f64) -> RoadInstance {
        RoadInstance {
            key: 1,
            path_index: 0,
            segment,
            t,
            glyph_start: 0,
            glyph_count: 3,
        }
    }

    const VIEWPORT: Vector2 = Vector2::new(1000.0, 1000.0);

    #[test]
    fn test_walk_across_segments() {
        let points = [sp(100.0, 100.0), sp(200.0, 100.0), sp(200.0, 200.0)];
        let anchor = instance(0, 0.5);

        let p = place_glyph(&points, &anchor, 0.0, VIEWPORT);
        assert!(p.visible);
        assert_eq!(p.position, Point2::new(150.0, 100.0));
        assert_eq!(p.angle, 0.0);

        // 越过拐点进入第二段
        let p = place_glyph(&points, &anchor, 80.0, VIEWPORT);
        assert!((p.position - Point2::new(200.0, 130.0)).norm() < 1e-9);
        assert!((p.angle - PI / 2.0).abs() < 1e-9);

        let p = place_glyph(&points, &anchor, -40.0, VIEWPORT);
        assert!((p.position - Point2::new(110.0, 100.0)).norm() < 1e-9);

        // 走出两端
        assert!(!place_glyph(&points, &anchor, -60.0, VIEWPORT).visible);
        assert!(!place_glyph(&points, &anchor, 200.0, VIEWPORT).visible);
    }

    #[test]
    fn test_leftward_path_is_flipped() {
        let points = [sp(300.0, 100.0), sp(100.0, 100.0)];
        let anchor = instance(0, 0.5);
        let first = place_glyph(&points, &anchor, -50.0, VIEWPORT);
        let last = place_glyph(&points, &anchor, 50.0, VIEWPORT);
        // 第一个字形仍在屏幕左侧
        assert!((first.position.x - 150.0).abs() < 1e-9);
        assert!((last.position.x - 250.0).abs() < 1e-9);
        assert!((first.angle - 2.0 * PI).abs() < 1e-9 || first.angle.abs() < 1e-9);
    }

    #[test]
    fn test_hidden_points_and_viewport() {
        let mut points = [sp(100.0, 100.0), sp(200.0, 100.0), sp(300.0, 100.0)];
        points[2].projected = false;
        let anchor = instance(0, 0.5);
        assert!(place_glyph(&points, &anchor, 0.0, VIEWPORT).visible);
        assert!(!place_glyph(&points, &anchor, 80.0, VIEWPORT).visible);

        let offscreen = [sp(-100.0, 100.0), sp(100.0, 100.0)];
        assert!(!place_glyph(&offscreen, &anchor, -50.0, VIEWPORT).visible);
        assert!(place_glyph(&offscreen, &anchor, 50.0, VIEWPORT).visible);
    }

    #[test]
    fn test_reduce_instance_visibility() {
        let instances = [
            RoadInstance {
                glyph_start: 0,
                glyph_count: 2,
                ..instance(0, 0.5)
            },
            RoadInstance {
                glyph_start: 2,
                glyph_count: 2,
                ..instance(0, 0.5)
            },
            RoadInstance {
                glyph_start: 4,
                glyph_count: 1,
                ..instance(0, 0.5)
            },
        ];
        let glyphs = [true, true, true, false, true];
        let mut runtime = [LabelRuntime::default(); 3];
        assert_eq!(
            reduce_instance_visibility(&instances, &glyphs, &runtime),
            vec![true, false, true]
        );
        runtime[2].duplicate = true;
        assert_eq!(
            reduce_instance_visibility(&instances, &glyphs, &runtime),
            vec![true, false, false]
        );
    }
}
