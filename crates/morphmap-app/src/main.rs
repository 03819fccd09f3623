//! Morphmap 无界面驱动程序
//!
//! 用合成瓦片源跑一段脚本化的相机飞行：从整球视图推近到城市级别的平面地图，
//! 再拉远回到球面。每帧执行完整管线，并把缺失的瓦片交给拉取调度器。
//!
//! 用法：`morphmap [config.json]`

use anyhow::{Context, Result};
use morphmap_core::config::MapConfig;
use morphmap_core::math::lerp;
use morphmap_renderer::{FrameOutcome, FrameOutput, FramePipeline, MapCamera};
use morphmap_source::{FetchScheduler, JsonTileDecoder, MemoryTileCache, SyntheticTileSource};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// 模拟帧率
const FRAME_SECONDS: f64 = 1.0 / 60.0;

/// 飞行路线上的关键帧
#[derive(Debug, Clone, Copy)]
struct Waypoint {
    lat: f64,
    lon: f64,
    zoom: f64,
    yaw: f64,
    pitch: f64,
    /// 从上一个关键帧飞到这里的帧数
    frames: u32,
}

const FLIGHT: &[Waypoint] = &[
    Waypoint { lat: 20.0, lon: 0.0, zoom: 0.0, yaw: 0.0, pitch: 0.0, frames: 1 },
    Waypoint { lat: 48.85, lon: 2.35, zoom: 4.0, yaw: 0.0, pitch: 0.0, frames: 120 },
    Waypoint { lat: 55.75, lon: 37.62, zoom: 7.5, yaw: 0.3, pitch: 0.4, frames: 180 },
    Waypoint { lat: 55.75, lon: 37.62, zoom: 11.0, yaw: 0.6, pitch: 0.6, frames: 120 },
    Waypoint { lat: 40.71, lon: -74.0, zoom: 2.0, yaw: 0.0, pitch: 0.0, frames: 180 },
    // 悬停，等待拉取和淡入完成
    Waypoint { lat: 40.71, lon: -74.0, zoom: 2.0, yaw: 0.0, pitch: 0.0, frames: 90 },
];

fn load_config() -> Result<MapConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            MapConfig::load(Path::new(&path)).with_context(|| format!("加载配置 {path}"))
        }
        None => Ok(MapConfig::default()),
    }
}

fn apply(camera: &mut MapCamera, from: &Waypoint, to: &Waypoint, t: f64) {
    // 经度走近路
    let mut dlon = to.lon - from.lon;
    if dlon > 180.0 {
        dlon -= 360.0;
    } else if dlon < -180.0 {
        dlon += 360.0;
    }
    camera.set_lat_lon(lerp(from.lat, to.lat, t), from.lon + dlon * t);
    camera.set_zoom(lerp(from.zoom, to.zoom, t));
    camera.yaw = lerp(from.yaw, to.yaw, t);
    camera.set_pitch(lerp(from.pitch, to.pitch, t));
}

/// 相机状态快照，用于判断是否需要重绘
fn camera_key(camera: &MapCamera) -> [f64; 5] {
    let (lat, lon) = camera.lat_lon();
    [lat, lon, camera.zoom(), camera.yaw, camera.pitch()]
}

/// 还有标注在淡入淡出
fn fading(output: &FrameOutput) -> bool {
    output
        .labels
        .iter()
        .map(|l| l.alpha)
        .chain(output.glyphs.iter().map(|g| g.alpha))
        .any(|a| a > 0.0 && a < 1.0)
}

fn report(frame: u64, output: &FrameOutput, cache: &MemoryTileCache, scheduler: &FetchScheduler) {
    info!(
        frame,
        zoom = output.view.zoom,
        mode = ?output.view.mode,
        tiles = output.tiles.len(),
        missing = output.missing.len(),
        labels = output.labels.len(),
        glyphs = output.glyphs.len(),
        rebuild = output.work.rebuild_all,
        cached = cache.len(),
        pending = scheduler.outstanding(),
        "frame"
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;

    // 初始化日志
    let level = if config.debug_render_logging { Level::DEBUG } else { Level::INFO };
    tracing::subscriber::set_global_default(FmtSubscriber::builder().with_max_level(level).finish())?;

    info!("Starting Morphmap...");

    let disk = FetchScheduler::open_disk_cache(&config.fetch)?;
    let scheduler = FetchScheduler::new(
        &config.fetch,
        Arc::new(SyntheticTileSource::default()),
        Arc::new(JsonTileDecoder),
        disk,
        tokio::runtime::Handle::current(),
    );
    let mut cache = MemoryTileCache::new(config.fetch.max_cached_tile_bytes);
    let frames_in_flight = config.frames_in_flight.max(1);
    let continuous_redraw = config.continuous_redraw;
    let mut camera = MapCamera::new(1280, 800, config.max_pitch);
    let mut pipeline = FramePipeline::new(config);

    // 模拟 GPU 尚未完成的帧
    let mut in_flight: VecDeque<FrameOutput> = VecDeque::new();
    let mut frame = 0u64;
    let mut last_camera: Option<[f64; 5]> = None;
    let mut animating = false;
    let mut idle_frames = 0u64;

    for pair in FLIGHT.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        for step in 0..=to.frames {
            let t = step as f64 / to.frames.max(1) as f64;
            apply(&mut camera, from, to, t);
            let now = frame as f64 * FRAME_SECONDS;

            let arrived = scheduler.drain_ready(&mut cache);
            let key = camera_key(&camera);
            let moved = last_camera != Some(key);
            if !continuous_redraw && !moved && arrived == 0 && !animating && scheduler.outstanding() == 0 {
                idle_frames += 1;
                frame += 1;
                tokio::time::sleep(Duration::from_secs_f64(FRAME_SECONDS)).await;
                continue;
            }
            last_camera = Some(key);

            match pipeline.run_frame(&mut camera, &mut cache, now) {
                FrameOutcome::Rendered(output) => {
                    animating = fading(&output);
                    scheduler.request(&output.missing, &cache);
                    if frame % 30 == 0 {
                        report(frame, &output, &cache, &scheduler);
                    }
                    in_flight.push_back(output);
                    if in_flight.len() >= frames_in_flight {
                        in_flight.pop_front();
                    }
                }
                FrameOutcome::Skipped(reason) => info!(frame, ?reason, "frame skipped"),
            }

            frame += 1;
            tokio::time::sleep(Duration::from_secs_f64(FRAME_SECONDS)).await;
        }
    }

    let stats = pipeline.stats();
    info!(
        frames = stats.frame_count.load(Ordering::Relaxed),
        skipped = stats.skipped_frames.load(Ordering::Relaxed),
        avg_ms = stats.avg_frame_ms(),
        label_rebuilds = stats.label_rebuilds.load(Ordering::Relaxed),
        road_rebuilds = stats.road_rebuilds.load(Ordering::Relaxed),
        dropped_tiles = stats.dropped_tiles.load(Ordering::Relaxed),
        idle_frames,
        failed_fetches = scheduler.failed_count(),
        "flight finished"
    );

    Ok(())
}
