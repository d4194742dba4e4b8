//! shader 读取的记录类型
//!
//! 字段顺序即 shader 中的声明顺序，改动时需要同步修改 shader。

use glam::{Mat4, Vec3};
use orrery_layout_trait::GpuLayout;

use crate::components::material::Material;

/// 每个场景对象一条，存放在 draw-info buffer 中
#[derive(GpuLayout, Debug, Clone, Copy, PartialEq, Default)]
pub struct ObjectDrawInfo {
    pub transform: Mat4,
    /// 在 geometry buffer 中的起始顶点
    pub first_vertex_index: u32,
    pub vertex_count: u32,
    pub material_index: u32,
}

/// 每个材质一条，存放在 material buffer 中
///
/// 空出来的槽位写入全零记录
#[derive(GpuLayout, Debug, Clone, Copy, PartialEq, Default)]
pub struct MaterialDrawInfo {
    /// [`Material::KIND_DIELECTRIC`] 或 [`Material::KIND_LAMBERTIAN`]
    pub kind: u32,
    /// 没有纹理时为 -1
    pub texture_index: i32,
    pub refractive_index: f32,
}

impl MaterialDrawInfo {
    pub fn new(material: &Material, texture_index: Option<u32>) -> Self {
        let refractive_index = match material {
            Material::Dielectric { refractive_index } => *refractive_index,
            Material::Lambertian { .. } => 0.0,
        };
        Self {
            kind: material.kind(),
            texture_index: texture_index.map_or(-1, |index| index as i32),
            refractive_index,
        }
    }
}

#[derive(GpuLayout, Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraUniform {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub frame_count: u32,
}

#[cfg(test)]
mod tests {
    use orrery_layout_trait::StrideMode;

    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(ObjectDrawInfo::PACKED_SIZE, 64 + 12);
        assert_eq!(StrideMode::Aligned16.stride_of::<ObjectDrawInfo>(), 80);

        assert_eq!(MaterialDrawInfo::PACKED_SIZE, 12);
        assert_eq!(StrideMode::Packed.stride_of::<MaterialDrawInfo>(), 12);

        assert_eq!(CameraUniform::PACKED_SIZE, 16 * 4 + 4);
    }

    #[test]
    fn test_material_draw_info_from_material() {
        let glass = MaterialDrawInfo::new(&Material::Dielectric { refractive_index: 1.5 }, None);
        assert_eq!(glass.kind, Material::KIND_DIELECTRIC);
        assert_eq!(glass.texture_index, -1);
        assert_eq!(glass.refractive_index, 1.5);
    }

    #[test]
    fn test_draw_info_bytes() {
        let info = ObjectDrawInfo {
            transform: Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0)),
            first_vertex_index: 3,
            vertex_count: 6,
            material_index: 2,
        };
        let mut bytes = vec![0u8; ObjectDrawInfo::PACKED_SIZE];
        info.serialize(&mut bytes, 0);

        let float_at = |i: usize| f32::from_ne_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        assert_eq!([float_at(12), float_at(13), float_at(14)], [4.0, 5.0, 6.0]);
        assert_eq!(&bytes[64..68], &3u32.to_ne_bytes());
        assert_eq!(&bytes[72..76], &2u32.to_ne_bytes());

        assert_eq!(ObjectDrawInfo::deserialize(&bytes, 0), info);
    }
}
