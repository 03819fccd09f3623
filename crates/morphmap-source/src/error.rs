//! 瓦片来源错误定义

use morphmap_core::tile::Tile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fetch failed for {tile}: {reason}")]
    Fetch { tile: Tile, reason: String },

    #[error("Malformed tile {tile}: {reason}")]
    Decode { tile: Tile, reason: String },

    #[error("Scheduler task failed: {0}")]
    Task(String),
}
