//! 淡入淡出状态机
//!
//! 两个终态（alpha 为 0 或 1）和两个过渡。期望状态变化时从当前 alpha 重新起步，
//! 之后每次调用只按时间插值，重复调用结果不变。

use crate::cache::LabelRuntime;
use rayon::prelude::*;

/// 单个标注实例的动画状态
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabelState {
    pub alpha: f64,
    /// 目标值，0 或 1
    pub target: f64,
    /// 最近一次改变目标的时间（秒）
    pub change_time: f64,
    /// 改变目标时的 alpha
    pub alpha_start: f64,
}

impl LabelState {
    /// 按期望可见性推进
    pub fn update(&mut self, desired: bool, now: f64, duration: f64) {
        let desired = if desired { 1.0 } else { 0.0 };
        if desired != self.target {
            self.alpha_start = self.alpha;
            self.target = desired;
            self.change_time = now;
        }
        let progress = if duration > 0.0 {
            ((now - self.change_time) / duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.alpha = self.alpha_start + (self.target - self.alpha_start) * progress;
    }

    /// 是否完全不可见且不再变化
    pub fn is_hidden(&self) -> bool {
        self.target == 0.0 && self.alpha == 0.0
    }
}

/// 并行推进一组状态，重复项始终按不可见处理
pub fn update_states(runtime: &mut [LabelRuntime], desired: &[bool], now: f64, duration: f64) {
    runtime
        .par_iter_mut()
        .zip(desired.par_iter())
        .for_each(|(r, &visible)| r.state.update(visible && !r.duplicate, now, duration));
}
