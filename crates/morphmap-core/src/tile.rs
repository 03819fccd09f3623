//! 瓦片金字塔地址
//!
//! 采用 slippy 约定：第 `z` 级每轴 `2^z` 个瓦片，`y` 向下增长。
//! 平面模式下同一个瓦片会以不同的 `loop_index` 在水平方向重复出现。

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::f64::consts::PI;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 瓦片内部坐标范围（矢量瓦片单位）
pub const TILE_EXTENT: f64 = 4096.0;

/// 四叉树金字塔中的一个瓦片
///
/// 身份由 `(x, y, z, loop_index)` 决定，`is_coarse` 只是标记，
/// 不参与比较、哈希和排序。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,

    /// 平面模式下的水平环绕副本编号
    #[serde(default)]
    pub loop_index: i32,

    /// 远处的目标瓦片被替换成了上一级父瓦片
    #[serde(default)]
    pub is_coarse: bool,
}

impl Tile {
    /// 根瓦片 `(0, 0, 0)`
    pub const ROOT: Tile = Tile {
        x: 0,
        y: 0,
        z: 0,
        loop_index: 0,
        is_coarse: false,
    };

    /// 创建新的瓦片
    pub const fn new(x: u32, y: u32, z: u8) -> Self {
        Self {
            x,
            y,
            z,
            loop_index: 0,
            is_coarse: false,
        }
    }

    /// 设置环绕副本编号
    pub fn with_loop(mut self, loop_index: i32) -> Self {
        self.loop_index = loop_index;
        self
    }

    /// 标记为粗粒度替代瓦片
    pub fn into_coarse(mut self) -> Self {
        self.is_coarse = true;
        self
    }

    /// 第 `z` 级每轴瓦片数
    #[inline]
    pub fn tiles_per_axis(z: u8) -> u32 {
        1u32 << z
    }

    /// 坐标是否落在本级范围内
    pub fn is_valid(&self) -> bool {
        let n = Self::tiles_per_axis(self.z);
        self.x < n && self.y < n
    }

    /// 上一级父瓦片
    pub fn parent(&self) -> Option<Tile> {
        self.z.checked_sub(1).and_then(|z| self.parent_at(z))
    }

    /// 指定级别上的祖先瓦片（同级返回自身）
    pub fn parent_at(&self, z: u8) -> Option<Tile> {
        if z > self.z {
            return None;
        }
        let shift = self.z - z;
        Some(Tile::new(self.x >> shift, self.y >> shift, z).with_loop(self.loop_index))
    }

    /// 下一级的四个子瓦片
    pub fn children(&self) -> [Tile; 4] {
        let (x, y, z) = (self.x * 2, self.y * 2, self.z + 1);
        [
            Tile::new(x, y, z).with_loop(self.loop_index),
            Tile::new(x + 1, y, z).with_loop(self.loop_index),
            Tile::new(x, y + 1, z).with_loop(self.loop_index),
            Tile::new(x + 1, y + 1, z).with_loop(self.loop_index),
        ]
    }

    /// 当前瓦片是否完整覆盖另一个更深的瓦片
    pub fn covers(&self, other: &Tile) -> bool {
        if self.z >= other.z || self.loop_index != other.loop_index {
            return false;
        }
        other.parent_at(self.z).is_some_and(|p| p.x == self.x && p.y == self.y)
    }

    /// 到另一个同级瓦片的切比雪夫距离
    ///
    /// `wrap_x` 为真时水平方向按环绕取最短距离（球面模式），
    /// 否则用 `x + loop_index * 2^z` 作为全局列号（平面模式）。
    pub fn chebyshev_distance(&self, other: &Tile, wrap_x: bool) -> u32 {
        let n = Self::tiles_per_axis(self.z) as i64;
        let dx = if wrap_x {
            let d = (self.x as i64 - other.x as i64).abs() % n;
            d.min(n - d)
        } else {
            let a = self.x as i64 + self.loop_index as i64 * n;
            let b = other.x as i64 + other.loop_index as i64 * n;
            (a - b).abs()
        };
        let dy = (self.y as i64 - other.y as i64).abs();
        dx.max(dy) as u32
    }

    /// 到中心瓦片的曼哈顿距离
    ///
    /// 中心先换算到本瓦片的级别，水平方向使用带环绕副本的全局列号。
    pub fn manhattan_distance(&self, center: &Tile) -> u32 {
        let c = if center.z > self.z {
            center.parent_at(self.z).unwrap_or(*center)
        } else {
            *center
        };
        let n = Self::tiles_per_axis(self.z) as i64;
        let column = |t: &Tile| t.x as i64 + t.loop_index as i64 * n;
        let dx = (column(self) - column(&c)).abs();
        let dy = (self.y as i64 - c.y as i64).abs();
        (dx + dy) as u32
    }

    /// 瓦片西边界经度（度）
    pub fn west_lon(&self) -> f64 {
        tile_x_to_lon(self.x as f64, self.z)
    }

    /// 瓦片北边界纬度（度）
    pub fn north_lat(&self) -> f64 {
        tile_y_to_lat(self.y as f64, self.z)
    }

    /// 经纬度范围 `(west, south, east, north)`
    pub fn lon_lat_bounds(&self) -> (f64, f64, f64, f64) {
        (
            self.west_lon(),
            tile_y_to_lat(self.y as f64 + 1.0, self.z),
            tile_x_to_lon(self.x as f64 + 1.0, self.z),
            self.north_lat(),
        )
    }

    /// 包含指定经纬度的瓦片
    pub fn from_lon_lat(lon: f64, lat: f64, z: u8) -> Tile {
        let n = Self::tiles_per_axis(z);
        let fx = (lon + 180.0) / 360.0 * n as f64;
        let lat_rad = lat.to_radians();
        let fy = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n as f64;
        let clamp = |v: f64| (v.floor().max(0.0) as u32).min(n - 1);
        Tile::new(clamp(fx), clamp(fy), z)
    }
}

/// 瓦片列坐标转经度（度）
pub fn tile_x_to_lon(x: f64, z: u8) -> f64 {
    x / Tile::tiles_per_axis(z) as f64 * 360.0 - 180.0
}

/// 瓦片行坐标转纬度（度）
pub fn tile_y_to_lat(y: f64, z: u8) -> f64 {
    let n = PI * (1.0 - 2.0 * y / Tile::tiles_per_axis(z) as f64);
    n.sinh().atan().to_degrees()
}

impl PartialEq for Tile {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y && self.z == other.z && self.loop_index == other.loop_index
    }
}

impl Eq for Tile {}

impl Hash for Tile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.hash(state);
        self.y.hash(state);
        self.z.hash(state);
        self.loop_index.hash(state);
    }
}

impl Ord for Tile {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.z, self.x, self.y, self.loop_index).cmp(&(other.z, other.x, other.y, other.loop_index))
    }
}

impl PartialOrd for Tile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)?;
        if self.loop_index != 0 {
            write!(f, "@{}", self.loop_index)?;
        }
        if self.is_coarse {
            write!(f, "*")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::approx_eq_eps;
    use std::collections::HashSet;

    #[test]
    fn test_identity_ignores_coarse_flag() {
        let a = Tile::new(3, 4, 5);
        let b = Tile::new(3, 4, 5).into_coarse();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
        assert!(set.insert(a.with_loop(1)));
    }

    #[test]
    fn test_parent_and_cover() {
        let tile = Tile::new(5, 6, 4);
        assert_eq!(tile.parent(), Some(Tile::new(2, 3, 3)));
        assert_eq!(tile.parent_at(1), Some(Tile::new(0, 0, 1)));
        assert_eq!(Tile::ROOT.parent(), None);

        assert!(Tile::new(2, 3, 3).covers(&tile));
        assert!(!tile.covers(&tile));
        assert!(!Tile::new(2, 3, 3).with_loop(1).covers(&tile));
        assert!(tile.children().iter().all(|c| tile.covers(c)));
    }

    #[test]
    fn test_distances() {
        let center = Tile::new(0, 3, 3);
        // 水平方向环绕后只差一列
        assert_eq!(Tile::new(7, 3, 3).chebyshev_distance(&center, true), 1);
        assert_eq!(Tile::new(7, 3, 3).chebyshev_distance(&center, false), 7);
        assert_eq!(
            Tile::new(7, 3, 3).with_loop(-1).chebyshev_distance(&center, false),
            1
        );
        assert_eq!(Tile::new(2, 5, 3).manhattan_distance(&center), 4);
        assert_eq!(Tile::new(1, 1, 2).manhattan_distance(&center), 1);
        assert_eq!(Tile::new(7, 3, 3).with_loop(-1).manhattan_distance(&center), 1);
    }

    #[test]
    fn test_lon_lat() {
        let (west, south, east, north) = Tile::ROOT.lon_lat_bounds();
        assert!(approx_eq_eps(west, -180.0, 1e-9));
        assert!(approx_eq_eps(east, 180.0, 1e-9));
        assert!(approx_eq_eps(north, 85.0511287798, 1e-6));
        assert!(approx_eq_eps(south, -85.0511287798, 1e-6));

        let moscow = Tile::from_lon_lat(37.618423, 55.751244, 10);
        assert_eq!(moscow, Tile::new(619, 320, 10));
    }

    #[test]
    fn test_ordering_is_by_zoom_first() {
        let mut tiles = vec![Tile::new(0, 0, 2), Tile::new(1, 0, 1), Tile::new(0, 1, 1)];
        tiles.sort();
        assert_eq!(tiles[0], Tile::new(0, 1, 1));
        assert_eq!(tiles[2], Tile::new(0, 0, 2));
    }
}
