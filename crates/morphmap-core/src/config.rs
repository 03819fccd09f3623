//! 运行配置
//!
//! 所有可调参数都集中在 `MapConfig` 中，可从 JSON 加载，缺省字段取默认值。
//!
//! ```json
//! {
//!   "tile_hold_seconds": 3.0,
//!   "selection": { "far_cutoff": 15 },
//!   "fetch": { "max_concurrent_fetches": 2 }
//! }
//! ```

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 瓦片选择参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// 每个瓦片上采样网格的边长
    pub sample_grid: usize,

    /// 背面剔除阈值，最大点积不超过该值时剔除
    pub backface_threshold: f64,

    /// 超过该切比雪夫距离时改用上一级父瓦片
    pub detail_cutoff: u32,

    /// 超过该切比雪夫距离时直接丢弃
    pub far_cutoff: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            sample_grid: 5,
            backface_threshold: -0.3,
            detail_cutoff: 2,
            far_cutoff: 15,
        }
    }
}

/// 图集打包方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackingMode {
    /// 按深度分桶，每个深度有固定容量
    DepthBudget,
    /// 旧模式：空闲格子低于阈值时把格子边长减半
    Legacy,
}

/// 图集参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// 图集纹理边长（像素）
    pub texture_size: u32,

    /// 四叉树最大深度
    pub max_depth: u8,

    /// 深度 1..=max_depth 的容量
    pub capacities: Vec<u32>,

    pub mode: PackingMode,

    /// 旧模式下的起始深度
    pub legacy_start_depth: u8,

    /// 旧模式下空闲格子少于该值时切换到更深一级
    pub legacy_free_threshold: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            texture_size: 4096,
            max_depth: 4,
            capacities: vec![1, 8, 5, 44],
            mode: PackingMode::DepthBudget,
            legacy_start_depth: 1,
            legacy_free_threshold: 1,
        }
    }
}

/// 标注参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// 淡入淡出时长（秒）
    pub fade_duration: f64,

    /// 每条道路最多的标注实例数
    pub max_road_instances: usize,

    /// 同一道路相邻两个实例之间的最小间隔（像素）
    pub road_repeat_distance_px: f64,

    /// 瓦片单位/像素比变化超过该值时重建道路标注
    pub tile_units_per_pixel_epsilon: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            fade_duration: 0.25,
            max_road_instances: 12,
            road_repeat_distance_px: 100.0,
            tile_units_per_pixel_epsilon: 1e-4,
        }
    }
}

/// 瓦片拉取与缓存参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// 同时进行的拉取任务上限
    pub max_concurrent_fetches: usize,

    /// 等待队列容量
    pub fifo_capacity: usize,

    /// 内存缓存上限（字节）
    pub max_cached_tile_bytes: usize,

    /// 磁盘缓存路径，为空时不使用磁盘缓存
    pub disk_cache_path: Option<PathBuf>,

    /// 启动时清空磁盘缓存
    pub clear_disk_cache: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 1,
            fifo_capacity: 50,
            max_cached_tile_bytes: 500 * 1024 * 1024,
            disk_cache_path: None,
            clear_disk_cache: false,
        }
    }
}

/// 地图配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// 最大俯仰角（弧度）
    pub max_pitch: f64,

    /// 每帧都重绘，而不是只在相机变化时重绘
    pub continuous_redraw: bool,

    /// 离开视野的瓦片保留时长（秒）
    pub tile_hold_seconds: f64,

    /// 允许同时排队的帧数
    pub frames_in_flight: usize,

    /// 输出逐帧渲染日志
    pub debug_render_logging: bool,

    /// 输出瓦片组装日志
    pub debug_assembling_map: bool,

    pub selection: SelectionConfig,
    pub atlas: AtlasConfig,
    pub labels: LabelConfig,
    pub fetch: FetchConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            max_pitch: std::f64::consts::PI / 2.3,
            continuous_redraw: false,
            tile_hold_seconds: 3.0,
            frames_in_flight: 3,
            debug_render_logging: false,
            debug_assembling_map: false,
            selection: SelectionConfig::default(),
            atlas: AtlasConfig::default(),
            labels: LabelConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl MapConfig {
    /// 从 JSON 字符串解析并校验
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let config: MapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// 序列化为格式化的 JSON
    pub fn to_json_string(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |msg: &str| Err(CoreError::InvalidConfig(msg.to_string()));

        if self.selection.sample_grid < 2 {
            return invalid("selection.sample_grid must be at least 2");
        }
        if self.selection.detail_cutoff > self.selection.far_cutoff {
            return invalid("selection.detail_cutoff must not exceed far_cutoff");
        }
        if self.atlas.max_depth == 0 || self.atlas.max_depth > 16 {
            return invalid("atlas.max_depth must be in 1..=16");
        }
        if self.atlas.capacities.len() != self.atlas.max_depth as usize {
            return invalid("atlas.capacities must list one capacity per depth");
        }
        // 以最深一级的格子为单位累计面积
        let max_depth = self.atlas.max_depth as u32;
        let mut area = 0u64;
        for (i, &cap) in self.atlas.capacities.iter().enumerate() {
            let depth = i as u32 + 1;
            if cap == 0 || cap as u64 > 1u64 << (2 * depth) {
                return invalid("atlas capacity must be positive and fit its depth");
            }
            area += (cap as u64) << (2 * (max_depth - depth));
        }
        if area > 1u64 << (2 * max_depth) {
            return invalid("atlas capacities exceed the texture area");
        }
        if !self.atlas.texture_size.is_power_of_two() {
            return invalid("atlas.texture_size must be a power of two");
        }
        if self.labels.fade_duration <= 0.0 || self.tile_hold_seconds < 0.0 {
            return invalid("durations must be positive");
        }
        if self.labels.max_road_instances == 0 {
            return invalid("labels.max_road_instances must be positive");
        }
        if self.fetch.max_concurrent_fetches == 0 || self.fetch.fifo_capacity == 0 {
            return invalid("fetch limits must be positive");
        }
        if self.frames_in_flight == 0 {
            return invalid("frames_in_flight must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.atlas.capacities, vec![1, 8, 5, 44]);
        assert_eq!(config.fetch.fifo_capacity, 50);
        assert_eq!(config.selection.far_cutoff, 15);
    }

    #[test]
    fn test_partial_json() {
        let config = MapConfig::from_json_str(
            r#"{ "tile_hold_seconds": 1.5, "selection": { "far_cutoff": 9 }, "atlas": { "mode": "legacy" } }"#,
        )
        .unwrap();
        assert_eq!(config.tile_hold_seconds, 1.5);
        assert_eq!(config.selection.far_cutoff, 9);
        assert_eq!(config.selection.detail_cutoff, 2);
        assert_eq!(config.atlas.mode, PackingMode::Legacy);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(MapConfig::from_json_str(r#"{ "atlas": { "capacities": [1, 8] } }"#).is_err());
        assert!(MapConfig::from_json_str(r#"{ "labels": { "fade_duration": 0.0 } }"#).is_err());
        assert!(MapConfig::from_json_str(r#"{ "atlas": { "capacities": [5, 8, 5, 44] } }"#).is_err());
        assert!(MapConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_capacities_must_fit_texture() {
        // 16 + 16·4 + 64 个最深格子，超过 64
        let over = r#"{ "atlas": { "max_depth": 3, "capacities": [1, 16, 64] } }"#;
        assert!(MapConfig::from_json_str(over).is_err());
        // 16 + 8·4 + 16 恰好铺满
        let exact = r#"{ "atlas": { "max_depth": 3, "capacities": [1, 8, 16] } }"#;
        assert!(MapConfig::from_json_str(exact).is_ok());
        assert!(MapConfig::from_json_str(r#"{ "atlas": { "max_depth": 20 } }"#).is_err());
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("morphmap-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("map.json");
        let mut config = MapConfig::default();
        config.fetch.max_concurrent_fetches = 4;
        std::fs::write(&path, config.to_json_string().unwrap()).unwrap();

        let loaded = MapConfig::load(&path).unwrap();
        assert_eq!(loaded.fetch.max_concurrent_fetches, 4);
        std::fs::remove_dir_all(&dir).ok();
    }
}
