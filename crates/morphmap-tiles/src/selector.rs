//! 可见瓦片选择
//!
//! 从根瓦片开始用显式栈做四叉树下降：
//! 1. 在瓦片上取 `n×n` 网格采样点并映射到当前投影的世界空间
//! 2. 采样点包围盒与六个视锥平面测试，完全在外侧则剪枝
//! 3. 球面模式下再做背面剔除
//! 4. 到达目标级别后按离中心瓦片的距离决定保留、换成父瓦片或丢弃
//!
//! 平面模式对水平方向 `-1, 0, +1` 三个环绕副本各做一遍。

use morphmap_core::config::SelectionConfig;
use morphmap_core::frustum::Frustum;
use morphmap_core::math::{BoundingBox3, Point3};
use morphmap_core::projection::{ProjectionModel, ViewMode};
use morphmap_core::tile::Tile;
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::debug;

/// 平面模式下遍历的环绕副本
pub const FLAT_LOOPS: [i32; 3] = [-1, 0, 1];

/// 到达目标级别的瓦片如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LodDecision {
    /// 原样输出
    Keep,
    /// 换成上一级父瓦片
    Coarse(Tile),
    /// 太远，丢弃
    Discard,
}

/// 可见瓦片选择器
#[derive(Debug, Clone)]
pub struct TileSelector {
    config: SelectionConfig,
}

impl TileSelector {
    /// 创建选择器
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// 当前参数
    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// 计算当前相机下应显示的瓦片集合
    ///
    /// 结果只由输入决定，不保留跨帧状态。
    pub fn select(&self, frustum: &Frustum, eye: &Point3, projection: &ProjectionModel) -> BTreeSet<Tile> {
        let zoom = projection.view.tile_zoom();
        let center = projection.center_tile(zoom);

        let tiles = match projection.mode() {
            ViewMode::Globe => self.select_loop(frustum, eye, projection, zoom, &center, 0),
            ViewMode::Flat => FLAT_LOOPS
                .par_iter()
                .map(|&loop_index| self.select_loop(frustum, eye, projection, zoom, &center, loop_index))
                .reduce(BTreeSet::new, |mut a, mut b| {
                    a.append(&mut b);
                    a
                }),
        };

        debug!(zoom, center = %center, count = tiles.len(), "selected tiles");
        tiles
    }

    fn select_loop(
        &self,
        frustum: &Frustum,
        eye: &Point3,
        projection: &ProjectionModel,
        zoom: u8,
        center: &Tile,
        loop_index: i32,
    ) -> BTreeSet<Tile> {
        let mut result = BTreeSet::new();
        let mut stack = vec![Tile::ROOT.with_loop(loop_index)];
        let wrap_x = projection.mode() == ViewMode::Globe;

        while let Some(tile) = stack.pop() {
            let samples = self.footprint(&tile, projection);
            let bbox = BoundingBox3::from_points(samples.iter().copied());
            if !frustum.intersects_aabb(&bbox) {
                continue;
            }

            if projection.mode() == ViewMode::Globe && self.faces_away(&samples, eye, projection) {
                continue;
            }

            if tile.z >= zoom {
                match self.classify(&tile, center, wrap_x) {
                    LodDecision::Keep => {
                        result.insert(tile);
                    }
                    LodDecision::Coarse(parent) => {
                        result.insert(parent);
                    }
                    LodDecision::Discard => {}
                }
                continue;
            }

            stack.extend(tile.children());
        }

        result
    }

    /// 瓦片上的采样点（世界坐标）
    pub fn footprint(&self, tile: &Tile, projection: &ProjectionModel) -> Vec<Point3> {
        let n = self.config.sample_grid.max(2);
        let step = 1.0 / (n - 1) as f64;
        let mut points = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                points.push(projection.world_position(tile, i as f64 * step, j as f64 * step));
            }
        }
        points
    }

    /// 采样点是否全部位于球的背面
    pub fn faces_away(&self, samples: &[Point3], eye: &Point3, projection: &ProjectionModel) -> bool {
        let Some(eye_dir) = projection.globe_normal(eye) else {
            return false;
        };
        let max_dot = samples
            .iter()
            .filter_map(|p| projection.globe_normal(p))
            .map(|n| n.dot(&eye_dir))
            .fold(f64::NEG_INFINITY, f64::max);
        max_dot <= self.config.backface_threshold
    }

    /// 按切比雪夫距离决定细节级别
    pub fn classify(&self, tile: &Tile, center: &Tile, wrap_x: bool) -> LodDecision {
        let distance = tile.chebyshev_distance(center, wrap_x);
        if distance > self.config.far_cutoff {
            LodDecision::Discard
        } else if distance > self.config.detail_cutoff {
            match tile.parent() {
                Some(parent) => LodDecision::Coarse(parent.into_coarse()),
                None => LodDecision::Keep,
            }
        } else {
            LodDecision::Keep
        }
    }
}

impl Default for TileSelector {
    fn default() -> Self {
        Self::new(SelectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morphmap_core::math::{Matrix4, Vector3};
    use morphmap_core::projection::{Pan, ViewState};

    fn frustum_from(eye: Point3) -> Frustum {
        let view = Matrix4::look_at_rh(&eye, &Point3::origin(), &Vector3::y());
        let proj = Matrix4::new_perspective(1.0, std::f64::consts::FRAC_PI_4, 0.1, 10.0);
        Frustum::from_view_projection(&(proj * view)).unwrap()
    }

    fn globe(zoom: f64, lat: f64, lon: f64) -> ProjectionModel {
        ProjectionModel::new(
            ViewState::from_zoom(zoom),
            Pan::globe_from_lat_lon(lat, lon),
            Pan::flat_from_lat_lon(lat, lon),
        )
    }

    #[test]
    fn test_root_view() {
        let eye = Point3::new(0.0, 0.0, 1.0);
        let tiles = TileSelector::default().select(&frustum_from(eye), &eye, &globe(0.0, 0.0, 0.0));
        assert_eq!(tiles.into_iter().collect::<Vec<_>>(), vec![Tile::ROOT]);
    }

    #[test]
    fn test_deterministic() {
        let eye = Point3::new(0.0, 0.0, 0.75);
        let frustum = frustum_from(eye);
        let projection = globe(3.5, 48.0, 11.0);
        let selector = TileSelector::default();

        let first = selector.select(&frustum, &eye, &projection);
        let second = selector.select(&frustum, &eye, &projection);
        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert!(first.iter().all(|t| t.z == 3 || (t.z == 2 && t.is_coarse)));
        assert!(first.contains(&projection.center_tile(3)));
    }

    #[test]
    fn test_backface() {
        let eye = Point3::new(0.0, 0.0, 1.0);
        let projection = globe(3.0, 0.0, 0.0);
        let selector = TileSelector::default();

        let back = selector.footprint(&Tile::new(0, 3, 3), &projection);
        assert!(selector.faces_away(&back, &eye, &projection));
        let front = selector.footprint(&Tile::new(3, 3, 3), &projection);
        assert!(!selector.faces_away(&front, &eye, &projection));

        // 阈值高于 1 时所有瓦片都被当作背面
        let strict = TileSelector::new(SelectionConfig {
            backface_threshold: 1.1,
            ..SelectionConfig::default()
        });
        assert!(strict.select(&frustum_from(eye), &eye, &projection).is_empty());
    }

    #[test]
    fn test_classify() {
        let selector = TileSelector::default();
        let center = Tile::new(10, 10, 5);
        assert_eq!(selector.classify(&Tile::new(12, 8, 5), &center, false), LodDecision::Keep);

        let far = Tile::new(13, 10, 5);
        match selector.classify(&far, &center, false) {
            LodDecision::Coarse(parent) => {
                assert_eq!(parent, Tile::new(6, 5, 4));
                assert!(parent.is_coarse);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(selector.classify(&Tile::new(26, 10, 5), &center, false), LodDecision::Discard);
        // 球面模式水平环绕
        assert_eq!(selector.classify(&Tile::new(31, 10, 5), &Tile::new(0, 10, 5), true), LodDecision::Keep);
    }

    #[test]
    fn test_flat_wraparound() {
        let eye = Point3::new(0.0, 0.0, 0.75);
        let projection = ProjectionModel::new(ViewState::from_zoom(7.5), Pan::ZERO, Pan::new(-0.999, 0.0));
        let tiles = TileSelector::default().select(&frustum_from(eye), &eye, &projection);

        assert!(tiles.iter().any(|t| t.loop_index == 0 && t.x == 127));
        assert!(tiles.iter().any(|t| t.loop_index == 1 && t.x == 0));
        assert!(tiles.iter().all(|t| t.loop_index != -1));
    }
}
