//! 逐帧管线
//!
//! 各阶段严格按顺序执行，阶段内部的逐元素计算用 rayon 并行。
//! 帧结果持有一个节流令牌，调用方消费完结果（提交 GPU）后丢弃它即可归还。

use crate::camera::MapCamera;
use crate::frame::{FrameContext, LabelWork};
use crate::throttle::{FrameThrottle, FrameToken};
use crate::vertex::{CameraUniform, LabelRuntimeGpu, RoadGlyphPlacementGpu, ScreenPointGpu, TileMappingGpu};
use morphmap_core::config::MapConfig;
use morphmap_core::perf::{PerfStats, PerfTimer};
use morphmap_core::projection::ViewState;
use morphmap_core::tile::Tile;
use morphmap_labels::cache::DrawLabelRange;
use morphmap_labels::collision::{point_shapes, resolve_glyphs, resolve_points};
use morphmap_labels::fade::update_states;
use morphmap_labels::road::{place_glyphs, reduce_instance_visibility, GlyphPlacement};
use morphmap_labels::screen::TilePoint;
use morphmap_labels::{LabelCache, LabelSource, ScreenPoint, ScreenProjector};
use morphmap_source::MemoryTileCache;
use morphmap_tiles::{
    hash_tracked, AtlasPacker, PlacedTile, PlacementResolver, TileMapping, TileRetentionTracker, TileSelector,
    TrackedTile,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// 跳帧原因
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// 在途帧已满
    Throttled,
    /// 相机矩阵退化
    DegenerateCamera(String),
}

/// 一个瓦片的绘制命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileDraw {
    pub placed: PlacedTile,
    pub mapping: TileMapping,
}

/// 一个点标注的绘制命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelDraw {
    pub range: DrawLabelRange,
    pub screen: ScreenPoint,
    pub alpha: f64,
}

/// 一个道路字形的绘制命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphDraw {
    pub instance_index: u32,
    pub placement: GlyphPlacement,
    pub alpha: f64,
}

/// 一帧的产出
#[derive(Debug)]
pub struct FrameOutput {
    pub view: ViewState,
    pub camera: CameraUniform,
    pub tiles: Vec<TileDraw>,
    pub labels: Vec<LabelDraw>,
    pub glyphs: Vec<GlyphDraw>,
    /// 本帧执行的标注重建
    pub work: LabelWork,
    /// 可见但未驻留、需要拉取的瓦片
    pub missing: Vec<Tile>,
    /// 保留追踪输出
    pub tracked: Vec<TrackedTile>,
    token: FrameToken,
}

impl FrameOutput {
    /// 多重缓冲下标
    pub fn slot(&self) -> usize {
        self.token.slot()
    }

    pub fn tile_mappings(&self) -> Vec<TileMappingGpu> {
        self.tiles.iter().map(|t| TileMappingGpu::from(&t.mapping)).collect()
    }

    pub fn glyph_records(&self) -> Vec<RoadGlyphPlacementGpu> {
        self.glyphs.iter().map(|g| RoadGlyphPlacementGpu::from(&g.placement)).collect()
    }
}

/// 帧结果
#[derive(Debug)]
pub enum FrameOutcome {
    Rendered(FrameOutput),
    Skipped(SkipReason),
}

/// 逐帧管线
pub struct FramePipeline {
    config: MapConfig,
    selector: TileSelector,
    resolver: PlacementResolver,
    packer: AtlasPacker,
    retention: TileRetentionTracker,
    labels: LabelCache,
    context: FrameContext,
    throttle: FrameThrottle,
    stats: Arc<PerfStats>,
    point_screen: Vec<ScreenPoint>,
}

impl FramePipeline {
    pub fn new(config: MapConfig) -> Self {
        Self {
            selector: TileSelector::new(config.selection.clone()),
            resolver: PlacementResolver::new(config.debug_assembling_map),
            packer: AtlasPacker::new(config.atlas.clone()),
            retention: TileRetentionTracker::new(config.tile_hold_seconds),
            labels: LabelCache::new(config.labels.clone()),
            context: FrameContext::new(config.labels.tile_units_per_pixel_epsilon),
            throttle: FrameThrottle::new(config.frames_in_flight),
            stats: Arc::new(PerfStats::new()),
            point_screen: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<PerfStats> {
        Arc::clone(&self.stats)
    }

    pub fn labels(&self) -> &LabelCache {
        &self.labels
    }

    pub fn context(&self) -> &FrameContext {
        &self.context
    }

    /// 运行一帧
    ///
    /// `now` 为单调递增的秒数，驱动保留期和淡入淡出。
    pub fn run_frame(&mut self, camera: &mut MapCamera, cache: &mut MemoryTileCache, now: f64) -> FrameOutcome {
        let Some(token) = self.throttle.try_acquire() else {
            self.stats.record_skipped();
            return FrameOutcome::Skipped(SkipReason::Throttled);
        };
        let started = Instant::now();

        let view = camera.sync_mode();
        let projection = camera.projection_model();
        let view_proj = camera.view_projection();
        let eye = camera.eye();
        let frustum = match camera.frustum() {
            Ok(frustum) => frustum,
            Err(e) => {
                warn!("跳过本帧: {}", e);
                self.stats.record_skipped();
                return FrameOutcome::Skipped(SkipReason::DegenerateCamera(e.to_string()));
            }
        };

        // 选择与排序
        let timer = PerfTimer::start("select");
        let zoom = view.tile_zoom();
        let selected = self.selector.select(&frustum, &eye, &projection);
        let center = projection.center_tile(zoom);
        if self.context.update_visible(&selected, &center) && self.config.debug_render_logging {
            debug!("可见集合变化: {} 个瓦片, 中心 {}", selected.len(), center);
        }
        timer.stop();
        let sorted = self.context.sorted_tiles().to_vec();

        // 放置
        let storage_hash = cache.residency_hash(&sorted);
        if self.context.storage_changed(storage_hash) {
            let placement =
                self.resolver
                    .resolve(&sorted, |t| cache.contains(t), zoom, self.context.placement(), &mut self.packer);
            let dropped = self.packer.dropped();
            if dropped > 0 {
                self.stats.record_dropped(dropped as u64);
                if self.config.debug_render_logging {
                    debug!("图集已满，丢弃 {} 个瓦片", dropped);
                }
            }
            self.context.set_placement(placement);
        }
        let placement = self.context.placement().clone();
        let drawn = placement.source_tiles();
        cache.touch(&drawn);

        // 保留与标注重建
        let tracked = self.retention.update(&drawn, now);
        let tracked_hash = hash_tracked(&tracked);
        let work = self
            .context
            .decide_label_work(tracked_hash, view.zoom, camera.tile_units_per_pixel());
        if work.rebuild_all {
            let timer = PerfTimer::start("label_rebuild");
            let sources: Vec<LabelSource> = tracked
                .iter()
                .filter(|t| !t.tile.is_coarse)
                .filter_map(|t| {
                    cache.get(&t.tile).map(|content| LabelSource {
                        tracked: *t,
                        content,
                    })
                })
                .collect();
            self.labels.rebuild(&sources, work.tile_units_per_pixel);
            timer.stop();
        } else if work.rebuild_roads {
            self.labels.rebuild_road_instances(work.tile_units_per_pixel);
        }
        self.stats.record_rebuild(work.rebuild_all, work.rebuild_roads);

        // 屏幕空间
        let projector = match ScreenProjector::new(view_proj, camera.viewport(), projection, &eye, self.labels.tiles()) {
            Ok(projector) => projector,
            Err(e) => {
                warn!("跳过本帧: {}", e);
                self.stats.record_skipped();
                return FrameOutcome::Skipped(SkipReason::DegenerateCamera(e.to_string()));
            }
        };
        let timer = PerfTimer::start("labels");
        let fade = self.config.labels.fade_duration;

        let points: Vec<TilePoint> = self.labels.points().iter().map(|p| p.point).collect();
        self.point_screen = projector.project_all(&points);
        let shapes = point_shapes(self.labels.points(), &self.point_screen);
        let point_desired = resolve_points(&shapes, &self.point_screen, self.labels.point_runtime());
        update_states(self.labels.point_runtime_mut(), &point_desired, now, fade);

        let path_screen = projector.project_all(self.labels.path_points());
        let placements = place_glyphs(&self.labels, &path_screen, camera.viewport());
        let glyph_visible = resolve_glyphs(
            self.labels.road_glyphs(),
            &placements,
            self.labels.road_runtime(),
            &shapes,
            &point_desired,
        );
        let instance_visible =
            reduce_instance_visibility(self.labels.instances(), &glyph_visible, self.labels.road_runtime());
        update_states(self.labels.road_runtime_mut(), &instance_visible, now, fade);
        timer.stop();

        // 输出
        let texture_size = self.packer.texture_size();
        let tiles = placement
            .placed()
            .iter()
            .map(|p| TileDraw {
                placed: *p,
                mapping: TileMapping::new(&p.slot, p.target, texture_size),
            })
            .collect();

        let labels = self
            .labels
            .draw_ranges()
            .iter()
            .zip(self.labels.point_runtime())
            .zip(&self.point_screen)
            .filter(|((_, r), _)| r.state.alpha > 0.0)
            .map(|((range, r), screen)| LabelDraw {
                range: *range,
                screen: *screen,
                alpha: r.state.alpha,
            })
            .collect();

        let road_runtime = self.labels.road_runtime();
        let glyphs = self
            .labels
            .road_glyphs()
            .iter()
            .zip(&placements)
            .filter_map(|(glyph, placement)| {
                let alpha = road_runtime.get(glyph.instance_index as usize)?.state.alpha;
                (alpha > 0.0).then_some(GlyphDraw {
                    instance_index: glyph.instance_index,
                    placement: *placement,
                    alpha,
                })
            })
            .collect();

        let missing: Vec<Tile> = sorted.iter().filter(|t| !cache.contains(t)).copied().collect();

        self.stats.record_frame(started.elapsed().as_micros() as u64);
        if self.config.debug_render_logging {
            debug!(
                "帧完成: {} 个瓦片放置, {} 个缺失, 标注 {}/{}, 道路实例 {}",
                placement.placed().len(),
                missing.len(),
                self.labels.points().len(),
                self.labels.tiles().len(),
                self.labels.instances().len()
            );
        }

        FrameOutcome::Rendered(FrameOutput {
            view,
            camera: camera.to_uniform(),
            tiles,
            labels,
            glyphs,
            work,
            missing,
            tracked,
            token,
        })
    }

    /// 上一帧点标注的屏幕位置
    pub fn screen_points(&self) -> Vec<ScreenPointGpu> {
        self.point_screen.iter().map(ScreenPointGpu::from).collect()
    }

    /// 点标注运行时状态
    pub fn label_runtime_records(&self) -> Vec<LabelRuntimeGpu> {
        self.labels.point_runtime().iter().map(LabelRuntimeGpu::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morphmap_core::label::TileContent;
    use morphmap_source::SyntheticTileSource;

    fn filled_cache(max_zoom: u8) -> MemoryTileCache {
        let source = SyntheticTileSource::default();
        let mut cache = MemoryTileCache::new(usize::MAX);
        for z in 0..=max_zoom {
            let n = Tile::tiles_per_axis(z);
            for x in 0..n {
                for y in 0..n {
                    cache.insert(Arc::new(source.generate(&Tile::new(x, y, z))));
                }
            }
        }
        cache
    }

    fn rendered(outcome: FrameOutcome) -> FrameOutput {
        match outcome {
            FrameOutcome::Rendered(output) => output,
            FrameOutcome::Skipped(reason) => panic!("frame skipped: {reason:?}"),
        }
    }

    #[test]
    fn test_root_view() {
        let mut pipeline = FramePipeline::new(MapConfig::default());
        let mut camera = MapCamera::default();
        let mut cache = filled_cache(0);

        let output = rendered(pipeline.run_frame(&mut camera, &mut cache, 0.0));
        assert_eq!(pipeline.context().sorted_tiles(), &[Tile::ROOT]);
        assert_eq!(output.tiles.len(), 1);
        assert_eq!(output.tiles[0].placed.source, Tile::ROOT);
        assert!(output.missing.is_empty());
        assert!(output.work.rebuild_all);
    }

    #[test]
    fn test_labels_fade_in_and_cache_is_stable() {
        let mut pipeline = FramePipeline::new(MapConfig::default());
        let mut camera = MapCamera::default();
        camera.set_zoom(2.0);
        let mut cache = filled_cache(2);

        let first = rendered(pipeline.run_frame(&mut camera, &mut cache, 0.0));
        assert!(first.work.rebuild_all);
        assert!(first.labels.is_empty());
        drop(first);
        let rebuilds = pipeline.labels().rebuild_count();
        assert!(!pipeline.labels().points().is_empty());

        let second = rendered(pipeline.run_frame(&mut camera, &mut cache, 1.0));
        assert!(!second.work.rebuild_all);
        assert!(!second.work.rebuild_roads);
        assert_eq!(pipeline.labels().rebuild_count(), rebuilds);
        assert!(!second.labels.is_empty());
        assert!(second.labels.iter().all(|l| l.alpha == 1.0 && l.screen.visible));
    }

    #[test]
    fn test_missing_tiles_reported() {
        let mut pipeline = FramePipeline::new(MapConfig::default());
        let mut camera = MapCamera::default();
        let mut cache = filled_cache(0);
        drop(rendered(pipeline.run_frame(&mut camera, &mut cache, 0.0)));

        camera.set_zoom(1.0);
        let output = rendered(pipeline.run_frame(&mut camera, &mut cache, 0.1));
        assert!(!output.missing.is_empty());
        assert!(!output.tiles.is_empty());
        assert!(output.missing.iter().all(|t| t.z == 1));
        // 缺失的瓦片由根瓦片替代
        assert!(output.tiles.iter().all(|t| t.placed.source == Tile::ROOT));
    }

    #[test]
    fn test_drawn_tiles_kept_resident() {
        let size = TileContent::empty(Tile::ROOT).byte_size();
        let mut pipeline = FramePipeline::new(MapConfig::default());
        let mut camera = MapCamera::default();
        let mut cache = MemoryTileCache::new(size * 2);
        cache.insert(Arc::new(TileContent::empty(Tile::ROOT)));
        drop(rendered(pipeline.run_frame(&mut camera, &mut cache, 0.0)));

        // 根瓦片之后写入的瓦片不可见，下一帧没有重建标注
        let hidden = Tile::new(0, 0, 1);
        cache.insert(Arc::new(TileContent::empty(hidden)));
        let output = rendered(pipeline.run_frame(&mut camera, &mut cache, 0.1));
        assert!(!output.work.rebuild_all);
        drop(output);

        cache.insert(Arc::new(TileContent::empty(Tile::new(1, 1, 1))));
        assert!(cache.contains(&Tile::ROOT));
        assert!(!cache.contains(&hidden));

        let output = rendered(pipeline.run_frame(&mut camera, &mut cache, 0.2));
        assert!(output.missing.is_empty());
        assert_eq!(output.tiles[0].placed.source, Tile::ROOT);
    }

    #[test]
    fn test_frames_in_flight_bound() {
        let config = MapConfig {
            frames_in_flight: 2,
            ..MapConfig::default()
        };
        let mut pipeline = FramePipeline::new(config);
        let mut camera = MapCamera::default();
        let mut cache = filled_cache(0);

        let a = rendered(pipeline.run_frame(&mut camera, &mut cache, 0.0));
        let b = rendered(pipeline.run_frame(&mut camera, &mut cache, 0.1));
        assert_ne!(a.slot(), b.slot());
        assert!(matches!(
            pipeline.run_frame(&mut camera, &mut cache, 0.2),
            FrameOutcome::Skipped(SkipReason::Throttled)
        ));
        drop(a);
        assert!(matches!(
            pipeline.run_frame(&mut camera, &mut cache, 0.3),
            FrameOutcome::Rendered(_)
        ));
        assert_eq!(pipeline.stats().skipped_frames.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_degenerate_viewport_skipped() {
        let mut pipeline = FramePipeline::new(MapConfig::default());
        let mut camera = MapCamera::default();
        camera.set_viewport(0, 0);
        let mut cache = filled_cache(0);
        assert!(matches!(
            pipeline.run_frame(&mut camera, &mut cache, 0.0),
            FrameOutcome::Skipped(SkipReason::DegenerateCamera(_))
        ));
    }
}
