//! 帧内性能统计
//!
//! `PerfTimer` 记录单个阶段的耗时，`PerfStats` 用原子计数器累积整体数据，
//! 可在拉取线程和渲染线程之间共享。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::warn;

/// 单帧预算（毫秒）
pub const FRAME_BUDGET_MS: f64 = 16.0;

/// 性能计时器
#[derive(Debug)]
pub struct PerfTimer {
    name: &'static str,
    start: Instant,
}

impl PerfTimer {
    /// 开始计时
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// 结束计时并返回毫秒数
    pub fn stop(self) -> f64 {
        let ms = self.start.elapsed().as_secs_f64() * 1000.0;
        if ms > FRAME_BUDGET_MS {
            warn!(stage = self.name, elapsed_ms = ms, "stage exceeded frame budget");
        }
        ms
    }
}

/// 性能统计
#[derive(Debug, Default)]
pub struct PerfStats {
    /// 帧计数
    pub frame_count: AtomicU64,
    /// 跳过的帧数
    pub skipped_frames: AtomicU64,
    /// 总帧时间（微秒）
    pub total_frame_us: AtomicU64,
    /// 最大帧时间（微秒）
    pub max_frame_us: AtomicU64,
    /// 标注全量重建次数
    pub label_rebuilds: AtomicU64,
    /// 道路标注重建次数
    pub road_rebuilds: AtomicU64,
    /// 因图集满而丢弃的瓦片数
    pub dropped_tiles: AtomicU64,
}

impl PerfStats {
    /// 创建新的统计实例
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一帧
    pub fn record_frame(&self, frame_us: u64) {
        self.frame_count.fetch_add(1, Ordering::Relaxed);
        self.total_frame_us.fetch_add(frame_us, Ordering::Relaxed);
        self.max_frame_us.fetch_max(frame_us, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self, full: bool, roads: bool) {
        if full {
            self.label_rebuilds.fetch_add(1, Ordering::Relaxed);
        }
        if full || roads {
            self.road_rebuilds.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dropped(&self, count: u64) {
        self.dropped_tiles.fetch_add(count, Ordering::Relaxed);
    }

    /// 获取平均帧时间（毫秒）
    pub fn avg_frame_ms(&self) -> f64 {
        let count = self.frame_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total_us = self.total_frame_us.load(Ordering::Relaxed);
        (total_us as f64 / count as f64) / 1000.0
    }

    /// 重置统计
    pub fn reset(&self) {
        for counter in [
            &self.frame_count,
            &self.skipped_frames,
            &self.total_frame_us,
            &self.max_frame_us,
            &self.label_rebuilds,
            &self.road_rebuilds,
            &self.dropped_tiles,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
