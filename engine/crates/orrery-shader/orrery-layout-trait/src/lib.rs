//! GPU 数据布局
//!
//! 描述一个 CPU 类型写入 storage buffer 时的字节布局：
//!
//! - `BASE_ALIGNMENT`: 类型的基础对齐
//! - `SIZE`: 类型作为结构体成员时占用的字节数
//! - `PACKED_SIZE`: 作为数组元素时的紧凑大小（结构体成员逐个紧密排列）
//!
//! 标量和向量由本 crate 直接实现；结构体通过 `#[derive(GpuLayout)]` 生成。

pub use orrery_layout_macro::GpuLayout;

use glam::{Mat4, Vec2, Vec3, Vec4};

/// GPU 布局描述
///
/// `serialize` / `deserialize` 不做越界检查：调用者需要先保证
/// `offset + Self::SIZE <= buf.len()`，否则会 panic。
pub trait GpuLayout: Sized {
    const BASE_ALIGNMENT: usize;
    const SIZE: usize;
    const PACKED_SIZE: usize;

    /// 将自身写入 `dest[offset..]`
    fn serialize(&self, dest: &mut [u8], offset: usize);

    /// 从 `src[offset..]` 读出一个值
    fn deserialize(src: &[u8], offset: usize) -> Self;
}

/// 向上取整到 16 的倍数
#[inline]
pub const fn round_up_16(n: usize) -> usize {
    (n + 15) & !15
}

/// 编译期求最大值，派生宏用它计算结构体的对齐
pub const fn const_max(values: &[usize]) -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < values.len() {
        if values[i] > max {
            max = values[i];
        }
        i += 1;
    }
    max
}

/// 数组元素之间的步长规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrideMode {
    /// 元素紧密排列，步长为 `PACKED_SIZE`
    Packed,
    /// 步长为 `round_up_16(PACKED_SIZE)`
    Aligned16,
}

impl StrideMode {
    #[inline]
    pub const fn stride_of<T: GpuLayout>(self) -> usize {
        match self {
            StrideMode::Packed => T::PACKED_SIZE,
            StrideMode::Aligned16 => round_up_16(T::PACKED_SIZE),
        }
    }
}

/// `count` 个元素按 `mode` 排列所需的字节数
#[inline]
pub const fn slice_byte_len<T: GpuLayout>(count: usize, mode: StrideMode) -> usize {
    count * mode.stride_of::<T>()
}

/// 按 `mode` 将 `items` 写入 `dest[offset..]`，返回写入的字节数
pub fn serialize_slice<T: GpuLayout>(items: &[T], dest: &mut [u8], offset: usize, mode: StrideMode) -> usize {
    let stride = mode.stride_of::<T>();
    for (i, item) in items.iter().enumerate() {
        item.serialize(dest, offset + i * stride);
    }
    items.len() * stride
}

pub fn deserialize_slice<T: GpuLayout>(src: &[u8], offset: usize, count: usize, mode: StrideMode) -> Vec<T> {
    let stride = mode.stride_of::<T>();
    (0..count).map(|i| T::deserialize(src, offset + i * stride)).collect()
}

/// 标量：对齐 4，大小 4
macro_rules! impl_scalar_layout {
    ($($ty:ty),*) => {
        $(
            impl GpuLayout for $ty {
                const BASE_ALIGNMENT: usize = 4;
                const SIZE: usize = 4;
                const PACKED_SIZE: usize = 4;

                #[inline]
                fn serialize(&self, dest: &mut [u8], offset: usize) {
                    dest[offset..offset + 4].copy_from_slice(&self.to_ne_bytes());
                }

                #[inline]
                fn deserialize(src: &[u8], offset: usize) -> Self {
                    bytemuck::pod_read_unaligned(&src[offset..offset + 4])
                }
            }
        )*
    };
}

impl_scalar_layout!(u32, i32, f32);

impl GpuLayout for Vec2 {
    const BASE_ALIGNMENT: usize = 8;
    const SIZE: usize = 8;
    const PACKED_SIZE: usize = 8;

    #[inline]
    fn serialize(&self, dest: &mut [u8], offset: usize) {
        dest[offset..offset + 8].copy_from_slice(bytemuck::bytes_of(self));
    }

    #[inline]
    fn deserialize(src: &[u8], offset: usize) -> Self {
        bytemuck::pod_read_unaligned(&src[offset..offset + 8])
    }
}

/// vec3 占 16 字节，只写前 12 字节，剩下 4 字节是 padding
impl GpuLayout for Vec3 {
    const BASE_ALIGNMENT: usize = 16;
    const SIZE: usize = 16;
    const PACKED_SIZE: usize = 16;

    #[inline]
    fn serialize(&self, dest: &mut [u8], offset: usize) {
        dest[offset..offset + 12].copy_from_slice(bytemuck::bytes_of(self));
    }

    #[inline]
    fn deserialize(src: &[u8], offset: usize) -> Self {
        bytemuck::pod_read_unaligned(&src[offset..offset + 12])
    }
}

impl GpuLayout for Vec4 {
    const BASE_ALIGNMENT: usize = 16;
    const SIZE: usize = 16;
    const PACKED_SIZE: usize = 16;

    #[inline]
    fn serialize(&self, dest: &mut [u8], offset: usize) {
        dest[offset..offset + 16].copy_from_slice(bytemuck::bytes_of(self));
    }

    #[inline]
    fn deserialize(src: &[u8], offset: usize) -> Self {
        bytemuck::pod_read_unaligned(&src[offset..offset + 16])
    }
}

/// 矩阵按列主序写出
///
/// 源数据按行取出，再显式转置到目标位置：`out[c * 4 + r] = rows[r][c]`
impl GpuLayout for Mat4 {
    const BASE_ALIGNMENT: usize = 16;
    const SIZE: usize = 64;
    const PACKED_SIZE: usize = 64;

    fn serialize(&self, dest: &mut [u8], offset: usize) {
        let rows = self.transpose().to_cols_array_2d();
        let mut out = [0.0f32; 16];
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                out[c * 4 + r] = *value;
            }
        }
        dest[offset..offset + 64].copy_from_slice(bytemuck::cast_slice(&out));
    }

    fn deserialize(src: &[u8], offset: usize) -> Self {
        let cols: [f32; 16] = bytemuck::pod_read_unaligned(&src[offset..offset + 64]);
        Mat4::from_cols_array(&cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up_16() {
        assert_eq!(round_up_16(0), 0);
        assert_eq!(round_up_16(1), 16);
        assert_eq!(round_up_16(12), 16);
        assert_eq!(round_up_16(16), 16);
        assert_eq!(round_up_16(76), 80);
    }

    #[test]
    fn test_const_max() {
        assert_eq!(const_max(&[]), 0);
        assert_eq!(const_max(&[4, 64, 16]), 64);
    }

    #[test]
    fn test_primitive_constants() {
        assert_eq!((f32::BASE_ALIGNMENT, f32::SIZE), (4, 4));
        assert_eq!((Vec2::BASE_ALIGNMENT, Vec2::SIZE), (8, 8));
        assert_eq!((Vec3::BASE_ALIGNMENT, Vec3::SIZE), (16, 16));
        assert_eq!((Vec4::BASE_ALIGNMENT, Vec4::SIZE), (16, 16));
        assert_eq!((Mat4::BASE_ALIGNMENT, Mat4::SIZE), (16, 64));
    }

    #[test]
    fn test_scalar_round_trip() {
        let mut buf = [0u8; 12];
        7u32.serialize(&mut buf, 0);
        (-3i32).serialize(&mut buf, 4);
        1.5f32.serialize(&mut buf, 8);
        assert_eq!(u32::deserialize(&buf, 0), 7);
        assert_eq!(i32::deserialize(&buf, 4), -3);
        assert_eq!(f32::deserialize(&buf, 8), 1.5);
    }

    #[test]
    fn test_vec3_leaves_padding_untouched() {
        let mut buf = [0xAAu8; 16];
        Vec3::new(1.0, 2.0, 3.0).serialize(&mut buf, 0);
        assert_eq!(&buf[12..], &[0xAA; 4]);
        assert_eq!(Vec3::deserialize(&buf, 0), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_mat4_is_column_major() {
        let m = Mat4::from_translation(Vec3::new(5.0, 6.0, 7.0));
        let mut buf = [0u8; 64];
        m.serialize(&mut buf, 0);

        let floats: [f32; 16] = bytemuck::pod_read_unaligned(&buf);
        assert_eq!(&floats[12..16], &[5.0, 6.0, 7.0, 1.0]);
        assert_eq!(Mat4::deserialize(&buf, 0), m);
    }

    #[test]
    fn test_slice_strides() {
        assert_eq!(slice_byte_len::<Vec3>(3, StrideMode::Packed), 48);
        assert_eq!(slice_byte_len::<u32>(3, StrideMode::Packed), 12);
        assert_eq!(slice_byte_len::<u32>(3, StrideMode::Aligned16), 48);

        let values = [Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0)];
        let mut buf = vec![0u8; slice_byte_len::<Vec2>(2, StrideMode::Aligned16)];
        let written = serialize_slice(&values, &mut buf, 0, StrideMode::Aligned16);
        assert_eq!(written, 32);
        assert_eq!(deserialize_slice::<Vec2>(&buf, 0, 2, StrideMode::Aligned16), values);
    }
}
