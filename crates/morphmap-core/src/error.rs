//! 核心错误定义

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Degenerate camera: {0}")]
    DegenerateCamera(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
