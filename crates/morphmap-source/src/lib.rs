//! Morphmap 瓦片来源
//!
//! 瓦片从远端拉取、解码后进入内存缓存，渲染端只读取已驻留的瓦片：
//! - `memory`: 按字节预算做 LRU 淘汰的内存缓存
//! - `disk`: 基于 SQLite 的磁盘缓存（MBTiles 风格表结构）
//! - `scheduler`: tokio 上的拉取调度，限制并发并通过通道通知就绪
//! - `synthetic`: 按瓦片地址生成内容的本地数据源，用于无网络运行

pub mod disk;
pub mod error;
pub mod memory;
pub mod provider;
pub mod scheduler;
pub mod synthetic;

pub use disk::DiskTileCache;
pub use error::SourceError;
pub use memory::MemoryTileCache;
pub use provider::{JsonTileDecoder, TileDecoder, TileFetcher};
pub use scheduler::{FetchEvent, FetchScheduler};
pub use synthetic::SyntheticTileSource;
