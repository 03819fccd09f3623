//! Morphmap 标注引擎
//!
//! 把当前放置和保留的瓦片中的标注拍平成数组，并在每帧依次执行：
//!
//! 1. `screen`: 瓦片局部坐标 → 屏幕像素
//! 2. `road`: 道路标注逐字形沿路径放置
//! 3. `collision`: 按数组顺序做两两重叠测试，序号小的优先
//! 4. `road::reduce_instance_visibility`: 一个道路标注实例的所有字形都可见才可见
//! 5. `fade`: 淡入淡出状态机
//!
//! 每个阶段都是对数组逐元素的纯函数，用 rayon 并行执行，结果只取决于数组序号。

pub mod anchors;
pub mod cache;
pub mod collision;
pub mod fade;
pub mod key;
pub mod road;
pub mod screen;

pub use cache::{LabelCache, LabelRuntime, LabelSource};
pub use collision::ScreenShape;
pub use fade::LabelState;
pub use road::GlyphPlacement;
pub use screen::{ScreenPoint, ScreenProjector};
