//! GPU 数据记录
//!
//! 逐帧结果按 `#[repr(C)]` 布局打包，可直接写入 wgpu 缓冲区。

use bytemuck::{Pod, Zeroable};
use morphmap_core::math::{Matrix4, Point3};
use morphmap_labels::road::GlyphPlacement;
use morphmap_labels::{LabelRuntime, ScreenPoint};
use morphmap_tiles::TileMapping;

/// 相机Uniform数据
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    /// 视图投影矩阵（列主序）
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 3],
    pub _padding: f32,
}

impl CameraUniform {
    pub fn new(view_proj: &Matrix4, eye: &Point3) -> Self {
        let mut columns = [[0.0f32; 4]; 4];
        for (c, column) in columns.iter_mut().enumerate() {
            for (r, value) in column.iter_mut().enumerate() {
                *value = view_proj[(r, c)] as f32;
            }
        }
        Self {
            view_proj: columns,
            eye: [eye.x as f32, eye.y as f32, eye.z as f32],
            _padding: 0.0,
        }
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new(&Matrix4::identity(), &Point3::new(0.0, 0.0, 1.0))
    }
}

/// 瓦片在图集中的位置
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TileMappingGpu {
    pub position: u32,
    pub texture_size: u32,
    pub cell_size: u32,
    pub z: u32,
    pub x: u32,
    pub y: u32,
    pub loop_index: i32,
    pub _padding: u32,
}

impl From<&TileMapping> for TileMappingGpu {
    fn from(m: &TileMapping) -> Self {
        Self {
            position: m.position,
            texture_size: m.texture_size,
            cell_size: m.cell_size,
            z: m.tile.z as u32,
            x: m.tile.x,
            y: m.tile.y,
            loop_index: m.tile.loop_index,
            _padding: 0,
        }
    }
}

/// 屏幕投影结果
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ScreenPointGpu {
    pub position: [f32; 2],
    pub depth: f32,
    pub visible: u32,
}

impl From<&ScreenPoint> for ScreenPointGpu {
    fn from(p: &ScreenPoint) -> Self {
        Self {
            position: [p.position.x as f32, p.position.y as f32],
            depth: p.depth as f32,
            visible: p.visible as u32,
        }
    }
}

/// 标注动画状态
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LabelRuntimeGpu {
    pub alpha: f32,
    pub target: f32,
    pub change_time: f32,
    pub alpha_start: f32,
    pub duplicate: u32,
    pub is_retained: u32,
    pub _padding: [u32; 2],
}

impl From<&LabelRuntime> for LabelRuntimeGpu {
    fn from(r: &LabelRuntime) -> Self {
        Self {
            alpha: r.state.alpha as f32,
            target: r.state.target as f32,
            change_time: r.state.change_time as f32,
            alpha_start: r.state.alpha_start as f32,
            duplicate: r.duplicate as u32,
            is_retained: r.is_retained as u32,
            _padding: [0; 2],
        }
    }
}

/// 道路字形放置
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RoadGlyphPlacementGpu {
    pub position: [f32; 2],
    pub angle: f32,
    pub visible: u32,
}

impl From<&GlyphPlacement> for RoadGlyphPlacementGpu {
    fn from(p: &GlyphPlacement) -> Self {
        Self {
            position: [p.position.x as f32, p.position.y as f32],
            angle: p.angle as f32,
            visible: p.visible as u32,
        }
    }
}

/// 标注文字顶点
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LabelVertex {
    /// 相对标注中心的像素偏移
    pub offset: [f32; 2],
    /// 字形纹理坐标
    pub uv: [f32; 2],
    /// 所属标注序号，索引运行时状态和屏幕位置
    pub label_index: u32,
}

impl LabelVertex {
    pub fn new(offset: [f32; 2], uv: [f32; 2], label_index: u32) -> Self {
        Self {
            offset,
            uv,
            label_index,
        }
    }

    /// 顶点缓冲区布局
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LabelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // offset
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // uv
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                // label_index
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Uint32,
                },
            ],
        }
    }
}
