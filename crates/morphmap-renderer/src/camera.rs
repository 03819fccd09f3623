//! 地图相机
//!
//! 相机始终看向原点，地图本身按平移量旋转（球面）或平移（平面）。
//! 缩放的整数部分决定球半径，小数部分把相机从 `z = 1` 推近到 `z = 0.5`。

use crate::vertex::CameraUniform;
use morphmap_core::error::CoreError;
use morphmap_core::frustum::Frustum;
use morphmap_core::math::{wrap_unit, Matrix4, Point3, UnitQuaternion, Vector2, Vector3};
use morphmap_core::projection::{Pan, ProjectionModel, ViewMode, ViewState};
use morphmap_core::tile::Tile;
use morphmap_labels::screen::tile_units_per_pixel;
use std::f64::consts::FRAC_PI_4;
use tracing::debug;

/// 最大缩放级别
pub const MAX_ZOOM: f64 = 20.0;

/// 手势缩放系数
const ZOOM_FACTOR: f64 = 0.4;

/// 视场角
const FOV_Y: f64 = FRAC_PI_4;
const Z_NEAR: f64 = 0.1;
const Z_FAR: f64 = 10.0;

/// 地图相机
#[derive(Debug, Clone)]
pub struct MapCamera {
    /// 绕 z 轴的偏航（弧度）
    pub yaw: f64,

    /// 俯仰（弧度），0 为正视
    pitch: f64,

    /// 连续缩放级别
    zoom: f64,

    pub globe_pan: Pan,
    pub flat_pan: Pan,

    /// 视口尺寸（像素）
    viewport: Vector2,

    max_pitch: f64,

    /// 上一次同步时的投影方式
    mode: ViewMode,
}

impl MapCamera {
    pub fn new(viewport_width: u32, viewport_height: u32, max_pitch: f64) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            zoom: 0.0,
            globe_pan: Pan::ZERO,
            flat_pan: Pan::ZERO,
            viewport: Vector2::new(viewport_width as f64, viewport_height as f64),
            max_pitch,
            mode: ViewMode::Globe,
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = Vector2::new(width as f64, height as f64);
    }

    pub fn viewport(&self) -> Vector2 {
        self.viewport
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// 设置缩放级别，限制在 `[0, 20]`
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.clamp(0.0, MAX_ZOOM);
    }

    /// 按手势缩放比例调整
    pub fn zoom_by(&mut self, scale: f64) {
        self.set_zoom(self.zoom + (scale - 1.0) * ZOOM_FACTOR);
    }

    pub fn rotate_yaw(&mut self, delta: f64) {
        self.yaw += delta;
    }

    /// 设置俯仰，限制在 `[0, max_pitch]`
    pub fn set_pitch(&mut self, pitch: f64) {
        self.pitch = pitch.clamp(0.0, self.max_pitch);
    }

    /// 按屏幕拖动量平移
    ///
    /// 拖动方向随偏航旋转，灵敏度随缩放级别指数下降。
    /// 两种模式的平移量同时更新，`x` 环绕，`y` 截断到 `[-1, 1]`。
    pub fn pan(&mut self, delta_x: f64, delta_y: f64) {
        let sensitivity = 0.05 / 2f64.powf(self.zoom);
        let speed = 0.5;
        let (sin, cos) = (-self.yaw).sin_cos();
        let forward = Vector2::new(-sin, cos);
        let right = Vector2::new(forward.y, -forward.x);
        let delta = (forward * delta_y + right * delta_x) * speed * sensitivity;

        for pan in [&mut self.globe_pan, &mut self.flat_pan] {
            pan.x = wrap_unit(pan.x + delta.x);
            pan.y = (pan.y + delta.y).clamp(-1.0, 1.0);
        }
    }

    /// 把画面中心移到指定经纬度（度）
    pub fn set_lat_lon(&mut self, lat_deg: f64, lon_deg: f64) {
        self.globe_pan = Pan::globe_from_lat_lon(lat_deg, lon_deg);
        self.flat_pan = Pan::flat_from_lat_lon(lat_deg, lon_deg);
    }

    /// 画面中心的经纬度（度）
    pub fn lat_lon(&self) -> (f64, f64) {
        match self.mode {
            ViewMode::Globe => self.globe_pan.globe_lat_lon(),
            ViewMode::Flat => self.flat_pan.flat_lat_lon(),
        }
    }

    /// 按当前缩放计算投影参数，投影方式变化时换算平移量
    pub fn sync_mode(&mut self) -> ViewState {
        let view = ViewState::from_zoom(self.zoom);
        if view.mode != self.mode {
            match view.mode {
                ViewMode::Flat => self.flat_pan = self.globe_pan.globe_to_flat(),
                ViewMode::Globe => self.globe_pan = self.flat_pan.flat_to_globe(),
            }
            debug!("投影切换: {:?} -> {:?}", self.mode, view.mode);
            self.mode = view.mode;
        }
        view
    }

    /// 当前投影模型
    pub fn projection_model(&self) -> ProjectionModel {
        ProjectionModel::new(ViewState::from_zoom(self.zoom), self.globe_pan, self.flat_pan)
    }

    fn orientation(&self) -> UnitQuaternion {
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.yaw);
        let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), self.pitch);
        yaw * pitch
    }

    /// 相机位置
    pub fn eye(&self) -> Point3 {
        let distance = 1.0 - self.zoom.fract() * 0.5;
        self.orientation() * Point3::new(0.0, 0.0, distance)
    }

    pub fn up(&self) -> Vector3 {
        self.orientation() * Vector3::y()
    }

    pub fn view_matrix(&self) -> Matrix4 {
        Matrix4::look_at_rh(&self.eye(), &Point3::origin(), &self.up())
    }

    pub fn projection_matrix(&self) -> Matrix4 {
        let aspect = if self.viewport.y > 0.0 {
            self.viewport.x / self.viewport.y
        } else {
            1.0
        };
        Matrix4::new_perspective(aspect, FOV_Y, Z_NEAR, Z_FAR)
    }

    pub fn view_projection(&self) -> Matrix4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// 视锥，相机退化时返回错误
    pub fn frustum(&self) -> Result<Frustum, CoreError> {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// 画面中心所在的瓦片
    pub fn center_tile(&self, z: u8) -> Tile {
        self.projection_model().center_tile(z)
    }

    /// 当前整数级别下一个像素对应的瓦片单位
    pub fn tile_units_per_pixel(&self) -> Option<f64> {
        let view = ViewState::from_zoom(self.zoom);
        tile_units_per_pixel(&self.view_projection(), self.viewport, view.map_size, view.tile_zoom())
    }

    /// GPU 相机数据
    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform::new(&self.view_projection(), &self.eye())
    }
}

impl Default for MapCamera {
    fn default() -> Self {
        Self::new(800, 600, std::f64::consts::PI / 2.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morphmap_core::math::approx_eq;

    #[test]
    fn test_eye_follows_zoom_fraction() {
        let mut camera = MapCamera::default();
        camera.set_zoom(3.5);
        assert!((camera.eye() - Point3::new(0.0, 0.0, 0.75)).norm() < 1e-12);

        camera.set_zoom(25.0);
        assert_eq!(camera.zoom(), MAX_ZOOM);
        camera.zoom_by(0.0);
        assert!(approx_eq(camera.zoom(), MAX_ZOOM - ZOOM_FACTOR));
    }

    #[test]
    fn test_pitch_limits() {
        let mut camera = MapCamera::default();
        camera.set_pitch(3.0);
        assert!(approx_eq(camera.pitch(), std::f64::consts::PI / 2.3));
        camera.set_pitch(-1.0);
        assert_eq!(camera.pitch(), 0.0);

        camera.set_pitch(0.5);
        // 俯仰后相机从下方斜视原点
        let eye = camera.eye();
        assert!(eye.y < 0.0 && eye.z > 0.0);
        assert!(camera.frustum().is_ok());
    }

    #[test]
    fn test_pan_wraps_and_clamps() {
        let mut camera = MapCamera::default();
        for _ in 0..100 {
            camera.pan(0.0, 10.0);
        }
        assert_eq!(camera.globe_pan.y, 1.0);
        assert_eq!(camera.flat_pan.y, 1.0);

        let mut camera = MapCamera::default();
        camera.pan(50.0, 0.0);
        // 1.25 环绕到 -0.75
        assert!(approx_eq(camera.globe_pan.x, -0.75));
        assert!(approx_eq(camera.flat_pan.x, -0.75));
    }

    #[test]
    fn test_mode_switch_converts_pan() {
        let mut camera = MapCamera::default();
        camera.set_lat_lon(55.75, 37.62);
        let globe = camera.globe_pan;
        assert_eq!(camera.sync_mode().mode, ViewMode::Globe);

        // 平移量被重新计算，而不是沿用 set_lat_lon 写入的平面值
        camera.flat_pan = Pan::ZERO;
        camera.set_zoom(7.5);
        let view = camera.sync_mode();
        assert_eq!(view.mode, ViewMode::Flat);
        assert_eq!(camera.mode(), ViewMode::Flat);
        let (lat, lon) = camera.lat_lon();
        assert!((lat - 55.75).abs() < 1e-9);
        assert!((lon - 37.62).abs() < 1e-9);

        camera.set_zoom(2.0);
        camera.globe_pan = Pan::ZERO;
        camera.sync_mode();
        assert!((camera.globe_pan.x - globe.x).abs() < 1e-12);
        assert!((camera.globe_pan.y - globe.y).abs() < 1e-9);
    }

    #[test]
    fn test_center_tile_and_scale() {
        let mut camera = MapCamera::default();
        camera.set_lat_lon(55.75, 37.62);
        camera.set_zoom(10.0);
        camera.sync_mode();
        assert_eq!(camera.center_tile(10), Tile::new(619, 320, 10));

        let coarse = {
            let mut c = MapCamera::default();
            c.set_zoom(10.0);
            c.tile_units_per_pixel().unwrap()
        };
        let fine = {
            let mut c = MapCamera::default();
            c.set_zoom(10.9);
            c.tile_units_per_pixel().unwrap()
        };
        // 同一整数级别内越靠近越精细
        assert!(fine < coarse);
    }
}
