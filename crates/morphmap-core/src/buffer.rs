//! 只增长的逐帧缓冲区
//!
//! 每帧复用同一块存储：
//! - 容量不足时按需扩大
//! - 数据变少时不收缩，下一帧直接复用
//! - 每次重新分配都会递增版本号，调用方据此重建 GPU 侧对象

use std::ops::{Deref, DerefMut};

/// 只增长的缓冲区
#[derive(Debug, Clone)]
pub struct GrowBuffer<T> {
    data: Vec<T>,

    /// 已分配的元素容量
    allocated: usize,

    /// 重新分配次数
    version: u64,
}

impl<T> GrowBuffer<T> {
    /// 创建空缓冲区
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            allocated: 0,
            version: 0,
        }
    }

    /// 确保容量不小于 `needed`，发生重新分配时返回 true
    pub fn ensure_capacity(&mut self, needed: usize) -> bool {
        if self.allocated >= needed {
            return false;
        }
        let target = needed.max(self.allocated * 2);
        self.data.reserve_exact(target - self.data.len());
        self.allocated = target;
        self.version += 1;
        true
    }

    /// 用新的内容替换，不收缩
    pub fn replace_with(&mut self, items: impl IntoIterator<Item = T>) {
        self.data.clear();
        for item in items {
            if self.data.len() == self.allocated {
                self.ensure_capacity(self.allocated + 1);
            }
            self.data.push(item);
        }
    }

    /// 已分配容量
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// 重新分配次数
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl<T> Default for GrowBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for GrowBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for GrowBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_only() {
        let mut buffer: GrowBuffer<u32> = GrowBuffer::new();
        assert!(buffer.ensure_capacity(4));
        assert_eq!(buffer.allocated(), 4);
        assert_eq!(buffer.version(), 1);

        // 容量足够时不重新分配
        assert!(!buffer.ensure_capacity(3));
        assert_eq!(buffer.version(), 1);

        buffer.replace_with([1, 2, 3, 4, 5]);
        assert_eq!(&buffer[..], &[1, 2, 3, 4, 5]);
        assert_eq!(buffer.allocated(), 8);
        assert_eq!(buffer.version(), 2);

        // 数据变少不收缩
        buffer.replace_with([9]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.allocated(), 8);
        assert_eq!(buffer.version(), 2);
    }

    #[test]
    fn test_mutate_in_place() {
        let mut buffer = GrowBuffer::default();
        buffer.ensure_capacity(3);
        buffer.replace_with([0.0f32, 0.0, 0.0]);
        buffer[1] = 2.5;
        buffer.iter_mut().for_each(|v| *v += 1.0);
        assert_eq!(buffer.to_vec(), vec![1.0, 3.5, 1.0]);
        assert_eq!(buffer.version(), 1);
    }
}
