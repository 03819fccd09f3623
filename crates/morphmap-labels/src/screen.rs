//! 屏幕投影
//!
//! 瓦片局部坐标经当前投影变到世界空间，再经视图投影矩阵变到像素坐标。
//! 像素坐标原点在视口左下角，`y` 向上。

use morphmap_core::error::CoreError;
use morphmap_core::math::{Matrix4, Point2, Point3, Vector2, Vector3};
use morphmap_core::projection::{FlatTileOrigin, ProjectionModel, ViewMode};
use morphmap_core::tile::{Tile, TILE_EXTENT};
use rayon::prelude::*;

/// 瓦片上的一个点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePoint {
    /// 瓦片内归一化坐标，`v` 向下
    pub uv: Point2,
    /// 在标注瓦片表中的序号
    pub tile_index: u32,
}

/// 投影结果
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScreenPoint {
    /// 像素坐标
    pub position: Point2,
    /// 裁剪空间深度 `z / w`
    pub depth: f64,
    /// 在相机前方且不在球背面，`position` 有意义
    pub projected: bool,
    /// 已投影且落在视口内
    pub visible: bool,
}

impl ScreenPoint {
    pub const HIDDEN: ScreenPoint = ScreenPoint {
        position: Point2::new(0.0, 0.0),
        depth: 0.0,
        projected: false,
        visible: false,
    };
}

/// 一帧的投影器
#[derive(Debug, Clone)]
pub struct ScreenProjector {
    view_proj: Matrix4,
    viewport: Vector2,
    projection: ProjectionModel,
    eye_dir: Option<Vector3>,
    tiles: Vec<Tile>,
    flat_origins: Vec<FlatTileOrigin>,
}

impl ScreenProjector {
    /// 创建投影器，相机或视口退化时返回错误
    pub fn new(
        view_proj: Matrix4,
        viewport: Vector2,
        projection: ProjectionModel,
        eye: &Point3,
        tiles: &[Tile],
    ) -> Result<Self, CoreError> {
        if !(viewport.x > 0.0 && viewport.y > 0.0) {
            return Err(CoreError::DegenerateCamera(format!(
                "viewport {}x{}",
                viewport.x, viewport.y
            )));
        }
        if view_proj.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::DegenerateCamera("non-finite view projection".into()));
        }

        let flat_origins = match projection.mode() {
            ViewMode::Flat => tiles.iter().map(|t| projection.flat_tile_origin(t)).collect(),
            ViewMode::Globe => Vec::new(),
        };
        Ok(Self {
            view_proj,
            viewport,
            projection,
            eye_dir: projection.globe_normal(eye),
            tiles: tiles.to_vec(),
            flat_origins,
        })
    }

    /// 平面模式下每个标注瓦片的原点
    pub fn flat_origins(&self) -> &[FlatTileOrigin] {
        &self.flat_origins
    }

    pub fn viewport(&self) -> Vector2 {
        self.viewport
    }

    /// 世界坐标转像素
    pub fn project_world(&self, world: &Point3) -> ScreenPoint {
        let clip = self.view_proj * world.to_homogeneous();
        if !(clip.w > 0.0) {
            return ScreenPoint::HIDDEN;
        }
        let ndc = Point2::new(clip.x / clip.w, clip.y / clip.w);
        let position = Point2::new(
            (ndc.x * 0.5 + 0.5) * self.viewport.x,
            (ndc.y * 0.5 + 0.5) * self.viewport.y,
        );
        ScreenPoint {
            position,
            depth: clip.z / clip.w,
            projected: true,
            visible: ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0,
        }
    }

    /// 瓦片局部坐标转像素
    pub fn project(&self, point: &TilePoint) -> ScreenPoint {
        let index = point.tile_index as usize;
        let world = match self.projection.mode() {
            ViewMode::Flat => match self.flat_origins.get(index) {
                Some(origin) => origin.position(point.uv.x, point.uv.y),
                None => return ScreenPoint::HIDDEN,
            },
            ViewMode::Globe => {
                let Some(tile) = self.tiles.get(index) else {
                    return ScreenPoint::HIDDEN;
                };
                let world = self.projection.world_position(tile, point.uv.x, point.uv.y);
                if self.on_far_side(&world) {
                    return ScreenPoint::HIDDEN;
                }
                world
            }
        };
        self.project_world(&world)
    }

    fn on_far_side(&self, world: &Point3) -> bool {
        match (self.eye_dir, self.projection.globe_normal(world)) {
            (Some(eye), Some(normal)) => normal.dot(&eye) < 0.0,
            _ => false,
        }
    }

    /// 并行投影一组点，输出与输入一一对应
    pub fn project_all(&self, points: &[TilePoint]) -> Vec<ScreenPoint> {
        points.par_iter().map(|p| self.project(p)).collect()
    }

    /// 屏幕上一个像素对应多少瓦片单位
    pub fn tile_units_per_pixel(&self, zoom: u8) -> Option<f64> {
        tile_units_per_pixel(&self.view_proj, self.viewport, self.projection.view.map_size, zoom)
    }
}

fn to_pixels(view_proj: &Matrix4, viewport: Vector2, world: &Point3) -> Option<Point2> {
    let clip = view_proj * world.to_homogeneous();
    if !(clip.w > 0.0) {
        return None;
    }
    Some(Point2::new(
        (clip.x / clip.w * 0.5 + 0.5) * viewport.x,
        (clip.y / clip.w * 0.5 + 0.5) * viewport.y,
    ))
}

/// 屏幕上一个像素对应多少瓦片单位（4096 单位制）
///
/// 用原点和 x 方向单位长度点的投影估算，无法估算时返回 `None`。
pub fn tile_units_per_pixel(view_proj: &Matrix4, viewport: Vector2, map_size: f64, zoom: u8) -> Option<f64> {
    if !(viewport.x > 0.0 && viewport.y > 0.0) {
        return None;
    }
    let p0 = to_pixels(view_proj, viewport, &Point3::origin())?;
    let p1 = to_pixels(view_proj, viewport, &Point3::new(1.0, 0.0, 0.0))?;
    let pixels_per_world = (p1 - p0).norm();
    let tile_world = map_size / Tile::tiles_per_axis(zoom) as f64;
    if !(pixels_per_world > 0.0 && tile_world > 0.0) {
        return None;
    }
    let tile_units_per_world = TILE_EXTENT / tile_world;
    Some(tile_units_per_world / pixels_per_world)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use morphmap_core::projection::{Pan, ViewState};

    pub(crate) fn view_proj(eye_z: f64) -> Matrix4 {
        let eye = Point3::new(0.0, 0.0, eye_z);
        let view = Matrix4::look_at_rh(&eye, &Point3::origin(), &Vector3::y());
        let proj = Matrix4::new_perspective(1.0, std::f64::consts::FRAC_PI_4, 0.1, 10.0);
        proj * view
    }

    pub(crate) fn globe_projector(zoom: f64, tiles: &[Tile]) -> ScreenProjector {
        let projection = ProjectionModel::new(ViewState::from_zoom(zoom), Pan::ZERO, Pan::ZERO);
        ScreenProjector::new(
            view_proj(1.0),
            Vector2::new(800.0, 800.0),
            projection,
            &Point3::new(0.0, 0.0, 1.0),
            tiles,
        )
        .unwrap()
    }

    #[test]
    fn test_center_projects_to_viewport_center() {
        let projector = globe_projector(0.0, &[Tile::ROOT]);
        let p = projector.project(&TilePoint {
            uv: Point2::new(0.5, 0.5),
            tile_index: 0,
        });
        assert!(p.visible);
        assert!((p.position.x - 400.0).abs() < 1e-6);
        assert!((p.position.y - 400.0).abs() < 1e-6);
    }

    #[test]
    fn test_far_side_hidden() {
        let projector = globe_projector(0.0, &[Tile::ROOT]);
        let back = projector.project(&TilePoint {
            uv: Point2::new(0.02, 0.5),
            tile_index: 0,
        });
        assert!(!back.visible);
        assert!(!back.projected);

        let missing = projector.project(&TilePoint {
            uv: Point2::new(0.5, 0.5),
            tile_index: 7,
        });
        assert_eq!(missing, ScreenPoint::HIDDEN);
    }

    #[test]
    fn test_behind_camera_and_offscreen() {
        let projector = globe_projector(0.0, &[Tile::ROOT]);
        assert!(!projector.project_world(&Point3::new(0.0, 0.0, 2.0)).projected);
        let side = projector.project_world(&Point3::new(3.0, 0.0, 0.0));
        assert!(side.projected);
        assert!(!side.visible);
    }

    #[test]
    fn test_degenerate_inputs() {
        let projection = ProjectionModel::new(ViewState::from_zoom(1.0), Pan::ZERO, Pan::ZERO);
        let eye = Point3::new(0.0, 0.0, 1.0);
        assert!(ScreenProjector::new(view_proj(1.0), Vector2::new(0.0, 600.0), projection, &eye, &[]).is_err());
        let mut m = view_proj(1.0);
        m[(1, 1)] = f64::INFINITY;
        assert!(ScreenProjector::new(m, Vector2::new(800.0, 600.0), projection, &eye, &[]).is_err());
    }

    #[test]
    fn test_flat_uses_origin_table() {
        let tile = Tile::new(64, 64, 7);
        let projection = ProjectionModel::new(ViewState::from_zoom(7.0), Pan::ZERO, Pan::ZERO);
        let projector = ScreenProjector::new(
            view_proj(1.0),
            Vector2::new(800.0, 800.0),
            projection,
            &Point3::new(0.0, 0.0, 1.0),
            &[tile],
        )
        .unwrap();
        assert_eq!(projector.flat_origins().len(), 1);

        // (64, 64) 的左上角就是地图中心
        let p = projector.project(&TilePoint {
            uv: Point2::new(0.0, 0.0),
            tile_index: 0,
        });
        assert!((p.position.x - 400.0).abs() < 1e-6);
        assert!((p.position.y - 400.0).abs() < 1e-6);
    }

    #[test]
    fn test_tile_units_per_pixel() {
        let projector = globe_projector(0.0, &[]);
        let tupp = projector.tile_units_per_pixel(0).unwrap();
        // 透视下 1 世界单位在 800 像素视口中约 966 像素，根瓦片宽 2π·0.14
        let pixels_per_world = 400.0 / (std::f64::consts::FRAC_PI_8).tan();
        let expected = 4096.0 / (2.0 * std::f64::consts::PI * 0.14) / pixels_per_world;
        assert!((tupp - expected).abs() / expected < 1e-6);
    }
}
