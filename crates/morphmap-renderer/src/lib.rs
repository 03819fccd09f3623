//! Morphmap 逐帧管线
//!
//! 一帧依次经过：
//!
//! 1. 相机同步投影方式，提取视锥
//! 2. 选择并排序可见瓦片
//! 3. 驻留情况变化时重新放置瓦片、分配图集格子
//! 4. 更新保留追踪，按需重建标注缓存
//! 5. 投影、碰撞、可见性归约、淡入淡出
//!
//! 产出的绘制列表可以直接转换为 `vertex` 中的 GPU 记录。

pub mod camera;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod throttle;
pub mod vertex;

pub use camera::MapCamera;
pub use error::RenderError;
pub use frame::{FrameContext, LabelWork};
pub use pipeline::{FrameOutcome, FrameOutput, FramePipeline, SkipReason};
pub use throttle::{FrameThrottle, FrameToken};
