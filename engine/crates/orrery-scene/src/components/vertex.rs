use glam::{Vec2, Vec3};
use orrery_layout_trait::GpuLayout;

/// 顶点：位置 + 纹理坐标
///
/// 在 geometry buffer 中 position 占 16 字节，tex_coords 紧跟其后
#[derive(GpuLayout, Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub position: Vec3,
    pub tex_coords: Vec2,
}

impl Vertex {
    #[inline]
    pub fn new(position: Vec3, tex_coords: Vec2) -> Self {
        Self { position, tex_coords }
    }
}
