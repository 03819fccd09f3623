//! 磁盘瓦片缓存
//!
//! 单个 SQLite 文件，表结构与 MBTiles 相同：
//! 行号使用 TMS 约定（`y` 向上），读写时翻转。

use crate::error::SourceError;
use morphmap_core::tile::Tile;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

/// 当前缓存格式版本
const FORMAT_VERSION: u32 = 1;

fn create_schema(conn: &Connection) -> Result<(), SourceError> {
    conn.execute_batch(
        r#"
        -- 元数据表
        CREATE TABLE IF NOT EXISTS metadata (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- 瓦片表
        CREATE TABLE IF NOT EXISTS tiles (
            zoom_level INTEGER NOT NULL,
            tile_column INTEGER NOT NULL,
            tile_row INTEGER NOT NULL,
            tile_data BLOB NOT NULL,
            PRIMARY KEY (zoom_level, tile_column, tile_row)
        );
        "#,
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO metadata (name, value) VALUES ('format_version', ?)",
        params![FORMAT_VERSION.to_string()],
    )?;
    Ok(())
}

/// XYZ 行号转 TMS 行号
pub fn tms_row(tile: &Tile) -> u32 {
    Tile::tiles_per_axis(tile.z) - 1 - tile.y
}

/// 磁盘缓存
#[derive(Debug)]
pub struct DiskTileCache {
    conn: Connection,
}

impl DiskTileCache {
    /// 打开或创建缓存文件
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let conn = Connection::open(path)?;
        create_schema(&conn)?;
        info!("磁盘瓦片缓存: {}", path.display());
        Ok(Self { conn })
    }

    /// 内存数据库，用于测试
    pub fn open_in_memory() -> Result<Self, SourceError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn get(&self, tile: &Tile) -> Result<Option<Vec<u8>>, SourceError> {
        let data = self
            .conn
            .query_row(
                "SELECT tile_data FROM tiles WHERE zoom_level = ? AND tile_column = ? AND tile_row = ?",
                params![tile.z, tile.x, tms_row(tile)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data)
    }

    pub fn put(&self, tile: &Tile, data: &[u8]) -> Result<(), SourceError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?, ?, ?, ?)",
            params![tile.z, tile.x, tms_row(tile), data],
        )?;
        Ok(())
    }

    /// 删除全部瓦片
    pub fn clear(&self) -> Result<(), SourceError> {
        self.conn.execute("DELETE FROM tiles", [])?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, SourceError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, SourceError> {
        Ok(self.len()? == 0)
    }
}
