//! 屏幕空间碰撞
//!
//! 每个标注只和序号更小的候选标注比较，结果与执行顺序无关，可以整体并行。
//! 候选标注指在屏幕内、非重复、非保留的标注。

use crate::cache::{LabelRuntime, PointInput, RoadGlyphInput};
use crate::road::GlyphPlacement;
use crate::screen::ScreenPoint;
use morphmap_core::math::{Point2, Vector2};
use parry2d::bounding_volume::{Aabb, BoundingSphere, BoundingVolume};
use parry2d::math::{Point as PPoint, Vector as PVector};
use parry2d::query::PointQuery;
use rayon::prelude::*;

/// 碰撞形状（像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScreenShape {
    Rect { center: Point2, half_extents: Vector2 },
    Circle { center: Point2, radius: f64 },
}

impl ScreenShape {
    /// 以中心和整体尺寸构造矩形
    pub fn rect(center: Point2, size: Vector2) -> Self {
        ScreenShape::Rect {
            center,
            half_extents: size / 2.0,
        }
    }

    /// 字形用外接圆
    pub fn circle(center: Point2, size: Vector2) -> Self {
        ScreenShape::Circle {
            center,
            radius: size.x.max(size.y) / 2.0,
        }
    }

    pub fn center(&self) -> Point2 {
        match *self {
            ScreenShape::Rect { center, .. } | ScreenShape::Circle { center, .. } => center,
        }
    }

    /// 两个形状是否重叠，边界相切不算
    pub fn intersects(&self, other: &ScreenShape) -> bool {
        match (self, other) {
            (ScreenShape::Rect { .. }, ScreenShape::Rect { .. }) => {
                let (a, b) = (self.aabb(), other.aabb());
                a.intersects(&b) && overlap_area(&a, &b) > 0.0
            }
            (ScreenShape::Circle { center: c1, radius: r1 }, ScreenShape::Circle { center: c2, radius: r2 }) => {
                let a = BoundingSphere::new(to_parry(c1), *r1 as f32);
                let b = BoundingSphere::new(to_parry(c2), *r2 as f32);
                a.intersects(&b) && (c1 - c2).norm() < r1 + r2
            }
            (ScreenShape::Rect { .. }, ScreenShape::Circle { center, radius })
            | (ScreenShape::Circle { center, radius }, ScreenShape::Rect { .. }) => {
                let rect = if matches!(self, ScreenShape::Rect { .. }) { self } else { other };
                let distance = rect.aabb().distance_to_local_point(&to_parry(center), true);
                (distance as f64) < *radius
            }
        }
    }

    fn aabb(&self) -> Aabb {
        match *self {
            ScreenShape::Rect { center, half_extents } => {
                let c = to_parry(&center);
                let h = PVector::new(half_extents.x as f32, half_extents.y as f32);
                Aabb::new(c - h, c + h)
            }
            ScreenShape::Circle { center, radius } => {
                let c = to_parry(&center);
                let r = radius as f32;
                Aabb::new(c - PVector::new(r, r), c + PVector::new(r, r))
            }
        }
    }
}

fn to_parry(p: &Point2) -> PPoint<f32> {
    PPoint::new(p.x as f32, p.y as f32)
}

fn overlap_area(a: &Aabb, b: &Aabb) -> f32 {
    let w = a.maxs.x.min(b.maxs.x) - a.mins.x.max(b.mins.x);
    let h = a.maxs.y.min(b.maxs.y) - a.mins.y.max(b.mins.y);
    w.max(0.0) * h.max(0.0)
}

/// 点标注的屏幕形状
pub fn point_shapes(points: &[PointInput], screen: &[ScreenPoint]) -> Vec<ScreenShape> {
    points
        .par_iter()
        .zip(screen.par_iter())
        .map(|(input, p)| ScreenShape::rect(p.position, input.size_px))
        .collect()
}

fn is_candidate(screen_visible: bool, runtime: &LabelRuntime) -> bool {
    screen_visible && !runtime.duplicate && !runtime.is_retained
}

/// 点标注碰撞，返回每个标注的期望可见性
pub fn resolve_points(shapes: &[ScreenShape], screen: &[ScreenPoint], runtime: &[LabelRuntime]) -> Vec<bool> {
    let candidates: Vec<bool> = screen
        .iter()
        .zip(runtime)
        .map(|(p, r)| is_candidate(p.visible, r))
        .collect();

    (0..shapes.len())
        .into_par_iter()
        .map(|i| {
            candidates[i]
                && !(0..i).any(|j| candidates[j] && shapes[j].intersects(&shapes[i]))
        })
        .collect()
}

/// 道路字形碰撞
///
/// 字形被可见的点标注或序号更小的道路实例的候选字形挡住时隐藏。
/// 同一实例内的字形互不比较。
pub fn resolve_glyphs(
    glyphs: &[RoadGlyphInput],
    placements: &[GlyphPlacement],
    road_runtime: &[LabelRuntime],
    point_shapes: &[ScreenShape],
    point_visible: &[bool],
) -> Vec<bool> {
    let shapes: Vec<ScreenShape> = glyphs
        .iter()
        .zip(placements)
        .map(|(g, p)| ScreenShape::circle(p.position, g.size_px))
        .collect();
    let candidates: Vec<bool> = glyphs
        .iter()
        .zip(placements)
        .map(|(g, p)| {
            road_runtime
                .get(g.instance_index as usize)
                .is_some_and(|r| is_candidate(p.visible, r))
        })
        .collect();
    let blockers: Vec<&ScreenShape> = point_shapes
        .iter()
        .zip(point_visible)
        .filter_map(|(s, &visible)| visible.then_some(s))
        .collect();

    (0..glyphs.len())
        .into_par_iter()
        .map(|i| {
            if !candidates[i] {
                return false;
            }
            let shape = &shapes[i];
            if blockers.iter().any(|b| b.intersects(shape)) {
                return false;
            }
            let instance = glyphs[i].instance_index;
            !(0..i).any(|j| {
                candidates[j] && glyphs[j].instance_index < instance && shapes[j].intersects(shape)
            })
        })
        .collect()
}
