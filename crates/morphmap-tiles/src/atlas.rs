//! 瓦片纹理图集
//!
//! 所有瓦片共享一张正方形纹理，按四叉树划分格子：深度 `d` 的格子边长为
//! `texture_size / 2^d`。每帧重新打包：
//!
//! - 深度分桶模式：每个深度有固定容量（默认 `1, 8, 5, 44`），
//!   总是先用最浅（格子最大）的未满深度，全部满了就丢弃
//! - 旧模式：固定请求某个深度，空闲格子低于阈值后改用更深一级

use morphmap_core::config::{AtlasConfig, PackingMode};
use morphmap_core::math::Point2;
use morphmap_core::tile::{Tile, TILE_EXTENT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// 图集中的格子地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtlasSlot {
    pub depth: u8,
    pub x: u32,
    pub y: u32,
}

impl AtlasSlot {
    /// 该深度每轴格子数
    pub fn cells_per_axis(&self) -> u32 {
        1 << self.depth
    }

    /// 行优先的线性序号
    pub fn position_index(&self) -> u32 {
        self.x + self.y * self.cells_per_axis()
    }

    /// 格子边长（像素）
    pub fn cell_size(&self, texture_size: u32) -> u32 {
        texture_size >> self.depth
    }

    /// 裁剪矩形 `(x, y, width, height)`，原点在纹理左上角
    pub fn scissor_rect(&self, texture_size: u32) -> (u32, u32, u32, u32) {
        let cell = self.cell_size(texture_size);
        let row_from_top = self.cells_per_axis() - 1 - self.y;
        (self.x * cell, row_from_top * cell, cell, cell)
    }
}

#[derive(Debug, Clone)]
struct AtlasNode {
    depth: u8,
    x: u32,
    y: u32,
    placed: bool,
    children: Option<[usize; 4]>,
}

/// 图集四叉树
///
/// 子节点顺序为左下、左上、右上、右下。已放置的节点挡住其下所有更深的格子。
#[derive(Debug, Clone)]
pub struct AtlasTree {
    nodes: Vec<AtlasNode>,
}

impl AtlasTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![AtlasNode {
                depth: 0,
                x: 0,
                y: 0,
                placed: false,
                children: None,
            }],
        }
    }

    /// 清空，保留节点存储
    pub fn reset(&mut self) {
        self.nodes.truncate(1);
        self.nodes[0].placed = false;
        self.nodes[0].children = None;
    }

    /// 在指定深度找第一个空闲格子
    pub fn insert(&mut self, depth: u8) -> Option<AtlasSlot> {
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.placed {
                continue;
            }
            if node.depth == depth {
                if self.subtree_occupied(index) {
                    continue;
                }
                let node = &mut self.nodes[index];
                node.placed = true;
                return Some(AtlasSlot {
                    depth: node.depth,
                    x: node.x,
                    y: node.y,
                });
            }
            if node.depth > depth {
                continue;
            }
            let children = self.ensure_children(index);
            // 逆序压栈，保证按左下、左上、右上、右下的顺序访问
            stack.extend(children.iter().rev());
        }
        None
    }

    /// 指定深度上仍可放置的格子数
    pub fn free_cells(&self, depth: u8) -> u32 {
        let total = 1u64 << (2 * depth as u64);
        let mut used = 0u64;
        let mut blocked = HashSet::new();
        for n in self.nodes.iter().filter(|n| n.placed) {
            if n.depth <= depth {
                used += 1u64 << (2 * (depth - n.depth) as u64);
            } else {
                // 更深的格子占掉它所在的整个浅层格子
                let shift = n.depth - depth;
                blocked.insert((n.x >> shift, n.y >> shift));
            }
        }
        total.saturating_sub(used + blocked.len() as u64) as u32
    }

    fn node_subtree_has_placement(&self, node: &AtlasNode) -> bool {
        let mut stack: Vec<usize> = node.children.map(|c| c.to_vec()).unwrap_or_default();
        while let Some(i) = stack.pop() {
            let n = &self.nodes[i];
            if n.placed {
                return true;
            }
            if let Some(children) = n.children {
                stack.extend(children);
            }
        }
        false
    }

    fn subtree_occupied(&self, index: usize) -> bool {
        self.node_subtree_has_placement(&self.nodes[index])
    }

    fn ensure_children(&mut self, index: usize) -> [usize; 4] {
        if let Some(children) = self.nodes[index].children {
            return children;
        }
        let (depth, x, y) = {
            let n = &self.nodes[index];
            (n.depth + 1, n.x * 2, n.y * 2)
        };
        let base = self.nodes.len();
        for (cx, cy) in [(x, y), (x, y + 1), (x + 1, y + 1), (x + 1, y)] {
            self.nodes.push(AtlasNode {
                depth,
                x: cx,
                y: cy,
                placed: false,
                children: None,
            });
        }
        let children = [base, base + 1, base + 2, base + 3];
        self.nodes[index].children = Some(children);
        children
    }
}

impl Default for AtlasTree {
    fn default() -> Self {
        Self::new()
    }
}

/// 按深度分桶的容量计数
#[derive(Debug, Clone)]
pub struct DepthBudget {
    capacities: Vec<u32>,
    counts: Vec<u32>,
}

impl DepthBudget {
    /// `capacities[i]` 是深度 `i + 1` 的容量
    pub fn new(capacities: &[u32]) -> Self {
        Self {
            capacities: capacities.to_vec(),
            counts: vec![0; capacities.len()],
        }
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    /// 取最浅的未满深度并计数
    pub fn next_depth(&mut self) -> Option<u8> {
        let i = self
            .counts
            .iter()
            .zip(&self.capacities)
            .position(|(count, cap)| count < cap)?;
        self.counts[i] += 1;
        Some(i as u8 + 1)
    }

    /// 撤销一次 `next_depth` 的计数
    pub fn release(&mut self, depth: u8) {
        if let Some(count) = depth.checked_sub(1).and_then(|i| self.counts.get_mut(i as usize)) {
            *count = count.saturating_sub(1);
        }
    }

    /// 指定深度已用数量
    pub fn used(&self, depth: u8) -> u32 {
        depth
            .checked_sub(1)
            .and_then(|i| self.counts.get(i as usize))
            .copied()
            .unwrap_or(0)
    }

    pub fn capacity(&self, depth: u8) -> u32 {
        depth
            .checked_sub(1)
            .and_then(|i| self.capacities.get(i as usize))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_capacity(&self) -> u32 {
        self.capacities.iter().sum()
    }

    pub fn occupied(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn is_full(&self) -> bool {
        self.occupied() >= self.total_capacity()
    }
}

/// 逐帧图集打包器
#[derive(Debug, Clone)]
pub struct AtlasPacker {
    config: AtlasConfig,
    tree: AtlasTree,
    budget: DepthBudget,
    legacy_depth: u8,
    exhausted: bool,
    dropped: u32,
}

impl AtlasPacker {
    pub fn new(config: AtlasConfig) -> Self {
        let budget = DepthBudget::new(&config.capacities);
        let legacy_depth = config.legacy_start_depth.max(1);
        Self {
            config,
            tree: AtlasTree::new(),
            budget,
            legacy_depth,
            exhausted: false,
            dropped: 0,
        }
    }

    /// 开始新的一帧，清空所有占用
    pub fn begin_frame(&mut self) {
        self.tree.reset();
        self.budget.reset();
        self.legacy_depth = self.config.legacy_start_depth.max(1);
        self.exhausted = false;
        self.dropped = 0;
    }

    /// 为一个瓦片分配格子，满了返回 `None` 并计入丢弃数
    pub fn allocate(&mut self) -> Option<AtlasSlot> {
        let slot = match self.config.mode {
            PackingMode::DepthBudget => self.allocate_budgeted(),
            PackingMode::Legacy => self.allocate_legacy(),
        };
        if slot.is_none() {
            self.exhausted = true;
            self.dropped += 1;
        }
        slot
    }

    fn allocate_budgeted(&mut self) -> Option<AtlasSlot> {
        let depth = self.budget.next_depth()?;
        let slot = self.tree.insert(depth);
        if slot.is_none() {
            self.budget.release(depth);
            debug!(depth, "atlas tree has no free cell for budgeted depth");
        }
        slot
    }

    fn allocate_legacy(&mut self) -> Option<AtlasSlot> {
        while self.legacy_depth <= self.config.max_depth {
            if self.tree.free_cells(self.legacy_depth) < self.config.legacy_free_threshold {
                self.legacy_depth += 1;
                continue;
            }
            if let Some(slot) = self.tree.insert(self.legacy_depth) {
                return Some(slot);
            }
            self.legacy_depth += 1;
        }
        None
    }

    /// 当前帧是否已有瓦片因容量不足被丢弃
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// 当前帧被丢弃的瓦片数
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// 深度分桶模式下的占用
    pub fn budget(&self) -> &DepthBudget {
        &self.budget
    }

    pub fn texture_size(&self) -> u32 {
        self.config.texture_size
    }
}

/// 把源瓦片的局部坐标变换到目标瓦片的局部坐标
///
/// 源瓦片比目标粗时放大，比目标细时缩小；坐标单位为 4096，`y` 向下。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub scale: f64,
    pub shift_x: f64,
    pub shift_y: f64,
}

impl UvTransform {
    pub const IDENTITY: UvTransform = UvTransform {
        scale: 1.0,
        shift_x: 0.0,
        shift_y: 0.0,
    };

    /// 用 `source` 的数据绘制 `target` 所需的变换
    pub fn for_substitute(source: &Tile, target: &Tile) -> Self {
        let scale = 2f64.powi(target.z as i32 - source.z as i32);
        let rel_x = target.x as f64 - source.x as f64 * scale;
        let rel_y = target.y as f64 - source.y as f64 * scale;
        Self {
            scale,
            shift_x: -rel_x * TILE_EXTENT,
            shift_y: -rel_y * TILE_EXTENT,
        }
    }

    pub fn apply(&self, p: Point2) -> Point2 {
        Point2::new(p.x * self.scale + self.shift_x, p.y * self.scale + self.shift_y)
    }
}

/// 着色器查找图集用的映射记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileMapping {
    pub position: u32,
    pub texture_size: u32,
    pub cell_size: u32,
    pub tile: Tile,
}

impl TileMapping {
    pub fn new(slot: &AtlasSlot, target: Tile, texture_size: u32) -> Self {
        Self {
            position: slot.position_index(),
            texture_size,
            cell_size: slot.cell_size(texture_size),
            tile: target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morphmap_core::math::approx_eq;

    #[test]
    fn test_tree_order() {
        let mut tree = AtlasTree::new();
        assert_eq!(tree.insert(1), Some(AtlasSlot { depth: 1, x: 0, y: 0 }));
        assert_eq!(tree.insert(1), Some(AtlasSlot { depth: 1, x: 0, y: 1 }));
        assert_eq!(tree.insert(2), Some(AtlasSlot { depth: 2, x: 2, y: 2 }));
        assert_eq!(tree.insert(2), Some(AtlasSlot { depth: 2, x: 2, y: 3 }));
        assert_eq!(tree.insert(1), Some(AtlasSlot { depth: 1, x: 1, y: 0 }));
        assert_eq!(tree.insert(1), None);
        assert_eq!(tree.insert(2), Some(AtlasSlot { depth: 2, x: 3, y: 3 }));

        tree.reset();
        assert_eq!(tree.insert(1), Some(AtlasSlot { depth: 1, x: 0, y: 0 }));
    }

    #[test]
    fn test_budget_fills_whole_texture() {
        let mut packer = AtlasPacker::new(AtlasConfig::default());
        packer.begin_frame();

        let mut slots = Vec::new();
        while let Some(slot) = packer.allocate() {
            slots.push(slot);
        }
        assert_eq!(slots.len(), 58);
        assert_eq!(packer.dropped(), 1);
        assert!(packer.is_exhausted());

        for depth in 1..=4u8 {
            let used = slots.iter().filter(|s| s.depth == depth).count() as u32;
            assert_eq!(used, packer.budget().capacity(depth));
            assert!(packer.budget().used(depth) <= packer.budget().capacity(depth));
        }

        // 所有格子换算到最深一级后互不重叠，恰好铺满
        let mut covered = HashSet::new();
        for slot in &slots {
            let shift = 4 - slot.depth;
            for dx in 0..(1 << shift) {
                for dy in 0..(1 << shift) {
                    assert!(covered.insert(((slot.x << shift) + dx, (slot.y << shift) + dy)));
                }
            }
        }
        assert_eq!(covered.len(), 256);

        packer.begin_frame();
        assert_eq!(packer.allocate(), Some(AtlasSlot { depth: 1, x: 0, y: 0 }));
        assert_eq!(packer.dropped(), 0);
    }

    #[test]
    fn test_failed_insert_not_counted() {
        // 容量之和超出纹理面积，深度 1 占满后深度 2 无处可放
        let mut packer = AtlasPacker::new(AtlasConfig {
            max_depth: 2,
            capacities: vec![4, 16],
            ..AtlasConfig::default()
        });
        packer.begin_frame();

        let depths: Vec<u8> = (0..6).filter_map(|_| packer.allocate()).map(|s| s.depth).collect();
        assert_eq!(depths, vec![1, 1, 1, 1]);
        assert_eq!(packer.dropped(), 2);
        assert_eq!(packer.budget().used(1), 4);
        assert_eq!(packer.budget().used(2), 0);
        assert_eq!(packer.budget().occupied(), 4);
    }

    #[test]
    fn test_legacy_mode_degrades_depth() {
        let mut packer = AtlasPacker::new(AtlasConfig {
            mode: PackingMode::Legacy,
            legacy_start_depth: 1,
            legacy_free_threshold: 2,
            ..AtlasConfig::default()
        });
        packer.begin_frame();

        let depths: Vec<u8> = (0..6).filter_map(|_| packer.allocate()).map(|s| s.depth).collect();
        // 深度 1 剩余不足 2 格后切到深度 2
        assert_eq!(depths, vec![1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_free_cells() {
        let mut tree = AtlasTree::new();
        tree.insert(2);
        assert_eq!(tree.free_cells(1), 3);
        assert_eq!(tree.free_cells(2), 15);
        tree.insert(1);
        assert_eq!(tree.free_cells(1), 2);
        assert_eq!(tree.free_cells(2), 11);
    }

    #[test]
    fn test_slot_geometry() {
        let slot = AtlasSlot { depth: 2, x: 1, y: 3 };
        assert_eq!(slot.position_index(), 13);
        assert_eq!(slot.cell_size(4096), 1024);
        assert_eq!(slot.scissor_rect(4096), (1024, 0, 1024, 1024));

        let mapping = TileMapping::new(&slot, Tile::new(5, 6, 4), 4096);
        assert_eq!(mapping.position, 13);
        assert_eq!(mapping.cell_size, 1024);
    }

    #[test]
    fn test_substitute_transform() {
        assert_eq!(UvTransform::for_substitute(&Tile::new(3, 3, 3), &Tile::new(3, 3, 3)), UvTransform::IDENTITY);

        // 用父瓦片绘制右下角的子瓦片
        let t = UvTransform::for_substitute(&Tile::new(1, 1, 1), &Tile::new(3, 3, 2));
        let p = t.apply(Point2::new(TILE_EXTENT * 0.75, TILE_EXTENT * 0.5));
        assert!(approx_eq(p.x, TILE_EXTENT * 0.5));
        assert!(approx_eq(p.y, 0.0));

        // 用子瓦片绘制父瓦片的一角
        let t = UvTransform::for_substitute(&Tile::new(3, 2, 2), &Tile::new(1, 1, 1));
        assert!(approx_eq(t.scale, 0.5));
        let p = t.apply(Point2::new(0.0, 0.0));
        assert!(approx_eq(p.x, TILE_EXTENT * 0.5));
        assert!(approx_eq(p.y, 0.0));
    }
}
