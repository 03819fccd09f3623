//! 帧节流
//!
//! 有界通道里放着固定数量的令牌，开始一帧取走一个，帧结果被消费（GPU 完成）后归还。
//! 令牌用完时新帧直接跳过，不阻塞渲染线程。

use crate::error::RenderError;
use crossbeam::channel::{bounded, Receiver, Sender};

/// 帧令牌，析构时归还
#[derive(Debug)]
pub struct FrameToken {
    slot: usize,
    release: Sender<usize>,
}

impl FrameToken {
    /// 令牌编号，可用作多重缓冲的下标
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl Drop for FrameToken {
    fn drop(&mut self) {
        // 节流器已经销毁时无需归还
        let _ = self.release.try_send(self.slot);
    }
}

/// 帧节流器
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    tokens: Receiver<usize>,
    release: Sender<usize>,
    capacity: usize,
}

impl FrameThrottle {
    /// 最多 `frames_in_flight` 帧同时在途
    pub fn new(frames_in_flight: usize) -> Self {
        let capacity = frames_in_flight.max(1);
        let (release, tokens) = bounded(capacity);
        for slot in 0..capacity {
            // 容量与令牌数相同，不会失败
            let _ = release.try_send(slot);
        }
        Self {
            tokens,
            release,
            capacity,
        }
    }

    /// 尝试开始一帧，没有空闲令牌时返回 `None`
    pub fn try_acquire(&self) -> Option<FrameToken> {
        self.tokens.try_recv().ok().map(|slot| FrameToken {
            slot,
            release: self.release.clone(),
        })
    }

    /// 等待空闲令牌
    pub fn acquire(&self) -> Result<FrameToken, RenderError> {
        let slot = self.tokens.recv().map_err(|_| RenderError::ThrottleClosed)?;
        Ok(FrameToken {
            slot,
            release: self.release.clone(),
        })
    }

    /// 当前空闲令牌数
    pub fn available(&self) -> usize {
        self.tokens.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
