//! 拉取与解码的协作接口

use crate::error::SourceError;
use futures::future::BoxFuture;
use morphmap_core::label::TileContent;
use morphmap_core::tile::Tile;

/// 按地址取回瓦片原始字节
pub trait TileFetcher: Send + Sync + 'static {
    fn fetch(&self, tile: Tile) -> BoxFuture<'static, Result<Vec<u8>, SourceError>>;
}

/// 把原始字节解码为瓦片内容
pub trait TileDecoder: Send + Sync + 'static {
    fn decode(&self, tile: &Tile, bytes: &[u8]) -> Result<TileContent, SourceError>;
}

/// 以 JSON 存储的瓦片内容
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTileDecoder;

impl TileDecoder for JsonTileDecoder {
    fn decode(&self, tile: &Tile, bytes: &[u8]) -> Result<TileContent, SourceError> {
        let mut content: TileContent = serde_json::from_slice(bytes)?;
        if content.tile.x != tile.x || content.tile.y != tile.y || content.tile.z != tile.z {
            return Err(SourceError::Decode {
                tile: *tile,
                reason: format!("payload addressed to {}", content.tile),
            });
        }
        content.tile = *tile;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_decoder() {
        let tile = Tile::new(3, 2, 2);
        let bytes = serde_json::to_vec(&TileContent::empty(tile)).unwrap();
        let content = JsonTileDecoder.decode(&tile, &bytes).unwrap();
        assert_eq!(content.tile, tile);

        let other = Tile::new(0, 0, 2);
        assert!(matches!(
            JsonTileDecoder.decode(&other, &bytes),
            Err(SourceError::Decode { .. })
        ));
        assert!(matches!(
            JsonTileDecoder.decode(&tile, b"not json"),
            Err(SourceError::Json(_))
        ));
    }
}
