//! 渲染管线错误定义

use morphmap_core::error::CoreError;
use morphmap_source::SourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Frame throttle closed")]
    ThrottleClosed,
}
