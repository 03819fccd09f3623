//! 瓦片拉取调度
//!
//! - 每次提交新的请求集合时清空等待队列，按请求顺序重新填充，超出容量的丢弃
//! - 同时运行的拉取任务不超过 `max_concurrent_fetches`
//! - 完成的瓦片通过 crossbeam 通道交给渲染端，渲染端在帧开始时取出并写入内存缓存
//! - 失败的瓦片只移出在途集合，不自动重试；之后的请求集合里再出现时重新拉取

use crate::disk::DiskTileCache;
use crate::error::SourceError;
use crate::memory::MemoryTileCache;
use crate::provider::{TileDecoder, TileFetcher};
use crossbeam::channel::{unbounded, Receiver, Sender};
use morphmap_core::config::FetchConfig;
use morphmap_core::label::TileContent;
use morphmap_core::tile::Tile;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// 拉取结果
#[derive(Debug)]
pub enum FetchEvent {
    Ready(Arc<TileContent>),
    Failed { tile: Tile, error: SourceError },
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Tile>,
    in_flight: HashSet<Tile>,
    failed: usize,
}

struct Shared {
    fetcher: Arc<dyn TileFetcher>,
    decoder: Arc<dyn TileDecoder>,
    disk: Option<Arc<Mutex<DiskTileCache>>>,
    fifo_capacity: usize,
    permits: Arc<Semaphore>,
    state: Mutex<QueueState>,
    ready: Sender<FetchEvent>,
    runtime: Handle,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn storage_key(tile: &Tile) -> Tile {
    Tile::new(tile.x, tile.y, tile.z)
}

impl Shared {
    /// 在有空闲许可时启动等待中的任务
    fn pump(self: &Arc<Self>) {
        loop {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                return;
            };
            let tile = {
                let mut state = lock(&self.state);
                let Some(tile) = state.pending.pop_front() else {
                    return;
                };
                state.in_flight.insert(tile);
                tile
            };

            let shared = Arc::clone(self);
            self.runtime.spawn(async move {
                let event = match shared.load(tile).await {
                    Ok(content) => FetchEvent::Ready(Arc::new(content)),
                    Err(error) => {
                        warn!("瓦片 {} 加载失败: {}", tile, error);
                        FetchEvent::Failed { tile, error }
                    }
                };
                {
                    let mut state = lock(&shared.state);
                    state.in_flight.remove(&tile);
                    if matches!(event, FetchEvent::Failed { .. }) {
                        state.failed += 1;
                    }
                }
                // 接收端关闭说明渲染端已经退出
                let _ = shared.ready.send(event);
                drop(permit);
                shared.pump();
            });
        }
    }

    async fn load(&self, tile: Tile) -> Result<TileContent, SourceError> {
        if let Some(bytes) = self.read_disk(tile).await? {
            debug!("瓦片 {} 命中磁盘缓存", tile);
            return self.decoder.decode(&tile, &bytes);
        }

        let bytes = self.fetcher.fetch(tile).await?;
        let content = self.decoder.decode(&tile, &bytes)?;
        self.write_disk(tile, bytes).await?;
        Ok(content)
    }

    async fn read_disk(&self, tile: Tile) -> Result<Option<Vec<u8>>, SourceError> {
        let Some(disk) = self.disk.clone() else {
            return Ok(None);
        };
        tokio::task::spawn_blocking(move || {
            let disk = lock(disk.as_ref());
            disk.get(&tile)
        })
        .await
        .map_err(|e| SourceError::Task(e.to_string()))?
    }

    async fn write_disk(&self, tile: Tile, bytes: Vec<u8>) -> Result<(), SourceError> {
        let Some(disk) = self.disk.clone() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || {
            let disk = lock(disk.as_ref());
            disk.put(&tile, &bytes)
        })
        .await
        .map_err(|e| SourceError::Task(e.to_string()))?
    }
}

/// 拉取调度器
pub struct FetchScheduler {
    shared: Arc<Shared>,
    ready: Receiver<FetchEvent>,
}

impl FetchScheduler {
    /// 创建调度器，任务在 `runtime` 上运行
    pub fn new(
        config: &FetchConfig,
        fetcher: Arc<dyn TileFetcher>,
        decoder: Arc<dyn TileDecoder>,
        disk: Option<DiskTileCache>,
        runtime: Handle,
    ) -> Self {
        let (tx, rx) = unbounded();
        let shared = Shared {
            fetcher,
            decoder,
            disk: disk.map(|d| Arc::new(Mutex::new(d))),
            fifo_capacity: config.fifo_capacity,
            permits: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            state: Mutex::new(QueueState::default()),
            ready: tx,
            runtime,
        };
        Self {
            shared: Arc::new(shared),
            ready: rx,
        }
    }

    /// 按配置打开磁盘缓存，`clear_disk_cache` 为真时先清空
    pub fn open_disk_cache(config: &FetchConfig) -> Result<Option<DiskTileCache>, SourceError> {
        let Some(path) = &config.disk_cache_path else {
            return Ok(None);
        };
        let disk = DiskTileCache::open(path)?;
        if config.clear_disk_cache {
            disk.clear()?;
        }
        Ok(Some(disk))
    }

    /// 提交本帧需要的瓦片
    ///
    /// 已驻留或正在拉取的瓦片跳过。返回进入队列的数量。
    pub fn request(&self, tiles: &[Tile], cache: &MemoryTileCache) -> usize {
        let queued = {
            let mut state = lock(&self.shared.state);
            state.pending.clear();
            let mut seen = HashSet::new();
            for tile in tiles.iter().map(storage_key) {
                if state.pending.len() >= self.shared.fifo_capacity {
                    break;
                }
                if !seen.insert(tile) || cache.contains(&tile) || state.in_flight.contains(&tile) {
                    continue;
                }
                state.pending.push_back(tile);
            }
            state.pending.len()
        };
        self.shared.pump();
        queued
    }

    /// 取出已完成的结果写入内存缓存，返回新驻留的瓦片数
    pub fn drain_ready(&self, cache: &mut MemoryTileCache) -> usize {
        let mut loaded = 0;
        for event in self.ready.try_iter() {
            if let FetchEvent::Ready(content) = event {
                cache.insert(content);
                loaded += 1;
            }
        }
        loaded
    }

    /// 还在等待或运行的瓦片数
    pub fn outstanding(&self) -> usize {
        let state = lock(&self.shared.state);
        state.pending.len() + state.in_flight.len()
    }

    /// 累计失败次数
    pub fn failed_count(&self) -> usize {
        lock(&self.shared.state).failed
    }

    /// 结果通道，供需要阻塞等待的调用方使用
    pub fn events(&self) -> &Receiver<FetchEvent> {
        &self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::JsonTileDecoder;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::time::Duration;

    /// 记录请求顺序，`flaky` 中的瓦片第一次拉取返回错误
    #[derive(Default)]
    struct RecordingFetcher {
        calls: Mutex<Vec<Tile>>,
        flaky: Mutex<HashSet<Tile>>,
    }

    impl TileFetcher for Arc<RecordingFetcher> {
        fn fetch(&self, tile: Tile) -> BoxFuture<'static, Result<Vec<u8>, SourceError>> {
            lock(&self.calls).push(tile);
            let bad = lock(&self.flaky).remove(&tile);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if bad {
                    return Err(SourceError::Fetch {
                        tile,
                        reason: "404".into(),
                    });
                }
                Ok(serde_json::to_vec(&TileContent::empty(tile))?)
            }
            .boxed()
        }
    }

    fn scheduler(fetcher: &Arc<RecordingFetcher>, disk: Option<DiskTileCache>) -> FetchScheduler {
        FetchScheduler::new(
            &FetchConfig::default(),
            Arc::new(fetcher.clone()),
            Arc::new(JsonTileDecoder),
            disk,
            Handle::current(),
        )
    }

    async fn settle(scheduler: &FetchScheduler, cache: &mut MemoryTileCache) {
        for _ in 0..200 {
            scheduler.drain_ready(cache);
            if scheduler.outstanding() == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
                scheduler.drain_ready(cache);
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("scheduler did not settle");
    }

    #[tokio::test]
    async fn test_fetches_all_requested() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let scheduler = scheduler(&fetcher, None);
        let mut cache = MemoryTileCache::new(usize::MAX);

        let tiles = [Tile::new(0, 0, 1), Tile::new(1, 0, 1), Tile::new(0, 0, 1).with_loop(1)];
        assert_eq!(scheduler.request(&tiles, &cache), 2);
        settle(&scheduler, &mut cache).await;

        assert_eq!(cache.len(), 2);
        assert_eq!(*lock(&fetcher.calls), vec![Tile::new(0, 0, 1), Tile::new(1, 0, 1)]);

        // 已驻留的不再拉取
        assert_eq!(scheduler.request(&tiles, &cache), 0);
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_new_request_replaces_queue() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let scheduler = scheduler(&fetcher, None);
        let mut cache = MemoryTileCache::new(usize::MAX);

        let first = [Tile::new(0, 0, 2), Tile::new(1, 0, 2), Tile::new(2, 0, 2)];
        scheduler.request(&first, &cache);
        let second = [Tile::new(3, 3, 2)];
        scheduler.request(&second, &cache);
        settle(&scheduler, &mut cache).await;

        // 第一个瓦片已经在拉取，其余被新的请求集合替换
        assert_eq!(*lock(&fetcher.calls), vec![Tile::new(0, 0, 2), Tile::new(3, 3, 2)]);
    }

    #[tokio::test]
    async fn test_fifo_capacity() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let config = FetchConfig {
            fifo_capacity: 2,
            max_concurrent_fetches: 1,
            ..FetchConfig::default()
        };
        let scheduler = FetchScheduler::new(
            &config,
            Arc::new(fetcher.clone()),
            Arc::new(JsonTileDecoder),
            None,
            Handle::current(),
        );
        let cache = MemoryTileCache::new(usize::MAX);
        let tiles: Vec<Tile> = (0..8).map(|x| Tile::new(x, 0, 3)).collect();
        // 队列满后丢弃，第一个随即出队开始拉取
        assert_eq!(scheduler.request(&tiles, &cache), 2);
        assert_eq!(scheduler.outstanding(), 2);
    }

    #[tokio::test]
    async fn test_failed_tile_refetched_on_later_request() {
        let tile = Tile::new(1, 1, 1);
        let fetcher = Arc::new(RecordingFetcher {
            flaky: Mutex::new([tile].into_iter().collect()),
            ..RecordingFetcher::default()
        });
        let scheduler = scheduler(&fetcher, None);
        let mut cache = MemoryTileCache::new(usize::MAX);

        assert_eq!(scheduler.request(&[tile], &cache), 1);
        settle(&scheduler, &mut cache).await;
        assert!(!cache.contains(&tile));
        assert_eq!(scheduler.failed_count(), 1);
        // 失败后不会自行重试
        assert_eq!(scheduler.outstanding(), 0);
        assert_eq!(lock(&fetcher.calls).len(), 1);

        // 下一帧仍然需要时重新拉取
        assert_eq!(scheduler.request(&[tile], &cache), 1);
        settle(&scheduler, &mut cache).await;
        assert!(cache.contains(&tile));
        assert_eq!(*lock(&fetcher.calls), vec![tile, tile]);
        assert_eq!(scheduler.failed_count(), 1);
    }

    #[tokio::test]
    async fn test_disk_cache_hit() {
        let tile = Tile::new(2, 1, 2);
        let disk = DiskTileCache::open_in_memory().unwrap();
        disk.put(&tile, &serde_json::to_vec(&TileContent::empty(tile)).unwrap()).unwrap();

        let fetcher = Arc::new(RecordingFetcher::default());
        let scheduler = scheduler(&fetcher, Some(disk));
        let mut cache = MemoryTileCache::new(usize::MAX);
        scheduler.request(&[tile], &cache);
        settle(&scheduler, &mut cache).await;

        assert!(cache.contains(&tile));
        assert!(lock(&fetcher.calls).is_empty());
    }
}
