use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use orrery_layout_trait::{GpuLayout, StrideMode, deserialize_slice, serialize_slice, slice_byte_len};

#[derive(GpuLayout, Debug, Clone, Copy, PartialEq)]
struct ThreeFloats {
    a: f32,
    b: f32,
    c: f32,
}

#[derive(GpuLayout, Debug, Clone, Copy, PartialEq)]
struct Vertex {
    position: Vec3,
    tex_coords: Vec2,
}

#[derive(GpuLayout, Debug, Clone, Copy, PartialEq)]
struct DrawInfo {
    transform: Mat4,
    first_vertex_index: u32,
    vertex_count: u32,
    material_index: i32,
}

#[derive(GpuLayout, Debug, Clone, Copy, PartialEq)]
struct Nested {
    color: Vec4,
    vertex: Vertex,
    weight: f32,
}

#[test]
fn test_twelve_byte_struct_alignment() {
    assert_eq!(ThreeFloats::BASE_ALIGNMENT, 16);
    assert_eq!(ThreeFloats::SIZE, 48);
    assert_eq!(ThreeFloats::PACKED_SIZE, 12);
    assert_eq!(StrideMode::Aligned16.stride_of::<ThreeFloats>(), 16);
    assert_eq!(StrideMode::Packed.stride_of::<ThreeFloats>(), 12);
}

#[test]
fn test_struct_constants() {
    assert_eq!(Vertex::BASE_ALIGNMENT, 16);
    assert_eq!(Vertex::PACKED_SIZE, 24);
    assert_eq!(StrideMode::Aligned16.stride_of::<Vertex>(), 32);

    assert_eq!(DrawInfo::BASE_ALIGNMENT, 64);
    assert_eq!(DrawInfo::SIZE, 256);
    assert_eq!(DrawInfo::PACKED_SIZE, 76);
    assert_eq!(StrideMode::Aligned16.stride_of::<DrawInfo>(), 80);

    // 嵌套结构体以自身 SIZE 参与外层计算
    assert_eq!(Vertex::SIZE, 32);
    assert_eq!(Nested::BASE_ALIGNMENT, 32);
    assert_eq!(Nested::PACKED_SIZE, 16 + Vertex::SIZE + 4);
}

#[test]
fn test_fields_advance_by_member_size() {
    let v = Vertex {
        position: Vec3::new(1.0, 2.0, 3.0),
        tex_coords: Vec2::new(0.25, 0.75),
    };
    let mut buf = vec![0u8; Vertex::PACKED_SIZE];
    v.serialize(&mut buf, 0);

    let floats: [f32; 6] = bytemuck::pod_read_unaligned(&buf);
    assert_eq!(floats, [1.0, 2.0, 3.0, 0.0, 0.25, 0.75]);
}

#[test]
fn test_round_trip_nested() {
    let value = Nested {
        color: Vec4::new(0.1, 0.2, 0.3, 0.4),
        vertex: Vertex {
            position: Vec3::new(-1.0, 0.5, 9.0),
            tex_coords: Vec2::new(1.0, 0.0),
        },
        weight: 3.5,
    };
    let mut buf = vec![0u8; 8 + Nested::PACKED_SIZE];
    value.serialize(&mut buf, 8);
    assert_eq!(Nested::deserialize(&buf, 8), value);
}

#[test]
fn test_draw_info_matrix_column_major() {
    let transform = Mat4::from_scale_rotation_translation(
        Vec3::splat(2.0),
        Quat::from_rotation_y(0.5),
        Vec3::new(10.0, 20.0, 30.0),
    );
    let info = DrawInfo {
        transform,
        first_vertex_index: 3,
        vertex_count: 6,
        material_index: -1,
    };
    let mut buf = vec![0u8; DrawInfo::PACKED_SIZE];
    info.serialize(&mut buf, 0);

    let floats: [f32; 16] = bytemuck::pod_read_unaligned(&buf[..64]);
    assert_eq!(&floats[12..16], &[10.0, 20.0, 30.0, 1.0]);
    assert_eq!(floats, transform.to_cols_array());
    assert_eq!(DrawInfo::deserialize(&buf, 0), info);
}

#[test]
fn test_slice_round_trip_both_strides() {
    let items = (0..5)
        .map(|i| ThreeFloats {
            a: i as f32,
            b: i as f32 * 2.0,
            c: -(i as f32),
        })
        .collect::<Vec<_>>();

    for mode in [StrideMode::Packed, StrideMode::Aligned16] {
        let mut buf = vec![0u8; slice_byte_len::<ThreeFloats>(items.len(), mode)];
        let written = serialize_slice(&items, &mut buf, 0, mode);
        assert_eq!(written, buf.len());
        assert_eq!(deserialize_slice::<ThreeFloats>(&buf, 0, items.len(), mode), items);
    }
}
