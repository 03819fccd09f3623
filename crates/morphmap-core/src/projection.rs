//! 投影模型
//!
//! 在三种坐标之间换算：
//! - 地理坐标（经纬度）
//! - 瓦片金字塔坐标（瓦片 + 瓦片内 `u, v`）
//! - 渲染空间（球面或平面，缩放在 6 到 7 级之间由球面过渡到平面）

use crate::math::{lerp, Point3, Vector3};
use crate::tile::Tile;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// 墨卡托投影可表示的最大纬度（弧度），`2·atan(e^π) − π/2`
pub const MAX_LATITUDE: f64 = 1.484_422_229_745_332_4;

/// 开始向平面过渡的缩放级别
pub const TRANSITION_START_ZOOM: f64 = 6.0;

/// 过渡持续的缩放跨度
pub const TRANSITION_SPAN: f64 = 1.0;

/// 最低缩放级别下的球半径
pub const BASE_GLOBE_RADIUS: f64 = 0.14;

/// 渲染投影方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewMode {
    /// 球面（可能正在向平面过渡）
    Globe,
    /// 平面，水平方向无缝环绕
    Flat,
}

/// 由缩放级别推出的投影参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// 连续缩放级别
    pub zoom: f64,

    /// 球面到平面的过渡系数，0 为纯球面，1 为纯平面
    pub transition: f64,

    /// 球半径（世界单位）
    pub radius: f64,

    /// 平面地图边长，等于球的周长
    pub map_size: f64,

    /// 当前投影方式
    pub mode: ViewMode,
}

impl ViewState {
    /// 根据缩放级别计算投影参数
    pub fn from_zoom(zoom: f64) -> Self {
        let world_scale = 2f64.powf(zoom.floor());
        let transition = ((zoom - TRANSITION_START_ZOOM) / TRANSITION_SPAN).clamp(0.0, 1.0);
        let radius = BASE_GLOBE_RADIUS * world_scale;
        let mode = if transition >= 1.0 { ViewMode::Flat } else { ViewMode::Globe };
        Self {
            zoom,
            transition,
            radius,
            map_size: 2.0 * PI * radius,
            mode,
        }
    }

    /// 当前帧选瓦片使用的整数级别
    pub fn tile_zoom(&self) -> u8 {
        self.zoom.floor().clamp(0.0, u8::MAX as f64) as u8
    }
}

/// 平移量，两个分量都在 `[-1, 1]`
///
/// 球面模式下 `x` 是经度比例（乘 π），`y` 是纬度比例（乘最大纬度）；
/// 平面模式下 `x`、`y` 是以半幅地图为单位的偏移，`y` 为墨卡托坐标除以 π。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pan {
    pub x: f64,
    pub y: f64,
}

impl Pan {
    pub const ZERO: Pan = Pan { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 由经纬度（度）得到球面平移
    pub fn globe_from_lat_lon(lat_deg: f64, lon_deg: f64) -> Self {
        Self {
            x: -(lon_deg / 180.0),
            y: lat_deg / MAX_LATITUDE.to_degrees(),
        }
    }

    /// 由经纬度（度）得到平面平移
    pub fn flat_from_lat_lon(lat_deg: f64, lon_deg: f64) -> Self {
        Self {
            x: -(lon_deg / 180.0),
            y: mercator_y_norm(lat_deg.to_radians()),
        }
    }

    /// 把球面平移换算成平面平移，保持画面中心的地理位置
    pub fn globe_to_flat(self) -> Self {
        let (lat, lon) = self.globe_lat_lon();
        Self::flat_from_lat_lon(lat, lon)
    }

    /// 把平面平移换算成球面平移
    pub fn flat_to_globe(self) -> Self {
        let (lat, lon) = self.flat_lat_lon();
        Self::globe_from_lat_lon(lat, lon)
    }

    /// 作为球面平移时画面中心的经纬度（度）
    pub fn globe_lat_lon(&self) -> (f64, f64) {
        ((self.y * MAX_LATITUDE).to_degrees(), -self.x * 180.0)
    }

    /// 作为平面平移时画面中心的经纬度（度）
    pub fn flat_lat_lon(&self) -> (f64, f64) {
        (lat_from_mercator_y_norm(self.y).to_degrees(), -self.x * 180.0)
    }
}

/// 平面模式下单个瓦片的原点和边长
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatTileOrigin {
    /// 瓦片左下角 x
    pub origin_x: f64,
    /// 瓦片左下角 y
    pub origin_y: f64,
    /// 瓦片边长
    pub tile_size: f64,
}

impl FlatTileOrigin {
    /// 瓦片内 `(u, v)`（`v` 向下）对应的平面坐标
    pub fn position(&self, u: f64, v: f64) -> Point3 {
        Point3::new(
            self.origin_x + u * self.tile_size,
            self.origin_y + (1.0 - v) * self.tile_size,
            0.0,
        )
    }
}

/// 当前帧的投影模型
#[derive(Debug, Clone, Copy)]
pub struct ProjectionModel {
    pub view: ViewState,
    pub globe_pan: Pan,
    pub flat_pan: Pan,
}

impl ProjectionModel {
    /// 创建投影模型
    pub fn new(view: ViewState, globe_pan: Pan, flat_pan: Pan) -> Self {
        Self {
            view,
            globe_pan,
            flat_pan,
        }
    }

    /// 当前投影方式
    pub fn mode(&self) -> ViewMode {
        self.view.mode
    }

    /// 球心位置，球面的正前方点位于原点
    pub fn globe_center(&self) -> Point3 {
        Point3::new(0.0, 0.0, -self.view.radius)
    }

    /// 未旋转的球面点
    pub fn sphere_point(&self, tile: &Tile, u: f64, v: f64) -> Point3 {
        let n = Tile::tiles_per_axis(tile.z) as f64;
        let uv_x = (tile.x as f64 + u) / n;
        let merc_v = (tile.y as f64 + v) / n;
        let lat = (PI * (1.0 - 2.0 * merc_v)).sinh().atan();
        let lon = 2.0 * PI * uv_x - PI;
        let r = self.view.radius;
        Point3::new(r * lat.cos() * lon.sin(), r * lat.sin(), r * lat.cos() * lon.cos())
    }

    /// 按平移量旋转后的球面位置
    pub fn globe_position(&self, tile: &Tile, u: f64, v: f64) -> Point3 {
        let p = self.sphere_point(tile, u, v);
        let a = self.globe_pan.x * PI;
        let b = self.globe_pan.y * MAX_LATITUDE;

        // 先绕 y 轴转经度
        let x1 = p.x * a.cos() + p.z * a.sin();
        let z1 = -p.x * a.sin() + p.z * a.cos();
        // 再绕 x 轴转纬度
        let y2 = p.y * b.cos() - z1 * b.sin();
        let z2 = p.y * b.sin() + z1 * b.cos();

        Point3::new(x1, y2, z2) + self.globe_center().coords
    }

    /// 平面位置，包含环绕副本的偏移
    pub fn flat_position(&self, tile: &Tile, u: f64, v: f64) -> Point3 {
        self.flat_tile_origin(tile).position(u, v)
    }

    /// 瓦片在平面上的原点
    pub fn flat_tile_origin(&self, tile: &Tile) -> FlatTileOrigin {
        let map_size = self.view.map_size;
        let half = map_size / 2.0;
        let n = Tile::tiles_per_axis(tile.z);
        let tile_size = map_size / n as f64;
        FlatTileOrigin {
            origin_x: tile.x as f64 * tile_size - half
                + self.flat_pan.x * half
                + tile.loop_index as f64 * map_size,
            origin_y: (n - tile.y - 1) as f64 * tile_size - half - self.flat_pan.y * half,
            tile_size,
        }
    }

    /// 当前投影下的世界坐标
    pub fn world_position(&self, tile: &Tile, u: f64, v: f64) -> Point3 {
        match self.view.mode {
            ViewMode::Flat => self.flat_position(tile, u, v),
            ViewMode::Globe => {
                let t = self.view.transition;
                let globe = self.globe_position(tile, u, v);
                if t <= 0.0 {
                    return globe;
                }
                let flat = self.flat_position(tile, u, v);
                Point3::new(
                    lerp(globe.x, flat.x, t),
                    lerp(globe.y, flat.y, t),
                    lerp(globe.z, flat.z, t),
                )
            }
        }
    }

    /// 从球心指向某点的单位方向，用于背面剔除
    pub fn globe_normal(&self, world: &Point3) -> Option<Vector3> {
        (world - self.globe_center()).try_normalize(f64::EPSILON)
    }

    /// 画面中心所在的瓦片
    pub fn center_tile(&self, z: u8) -> Tile {
        let (lat, lon) = match self.view.mode {
            ViewMode::Globe => self.globe_pan.globe_lat_lon(),
            ViewMode::Flat => self.flat_pan.flat_lat_lon(),
        };
        let max_deg = MAX_LATITUDE.to_degrees() - 1e-9;
        let lon = (lon + 180.0).rem_euclid(360.0) - 180.0;
        Tile::from_lon_lat(lon, lat.clamp(-max_deg, max_deg), z)
    }
}

/// 纬度（弧度）转归一化墨卡托 y（`[-1, 1]`）
pub fn mercator_y_norm(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    (FRAC_PI_4 + lat / 2.0).tan().ln() / PI
}

/// 归一化墨卡托 y 转纬度（弧度）
pub fn lat_from_mercator_y_norm(y: f64) -> f64 {
    2.0 * (y * PI).exp().atan() - FRAC_PI_2
}
