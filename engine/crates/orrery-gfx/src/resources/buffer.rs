use ash::vk;
use orrery_layout_trait::{GpuLayout, StrideMode, serialize_slice, slice_byte_len};

use crate::{
    commands::command_list::CommandList,
    error::{GfxError, GfxResult},
    memory::arena::{ByteRange, MemoryArena, PoolId},
    resources::image::ImageHandle,
};

/// arena 中的一个 buffer
///
/// 只能由 [`MemoryArena::create_buffer`] 创建，生命周期与 arena 相同，不需要单独销毁。
#[derive(Debug, Clone)]
pub struct BufferHandle {
    pool: PoolId,
    memory_range: ByteRange,
    size: vk::DeviceSize,
    buffer: vk::Buffer,

    usage: vk::BufferUsageFlags,
}

// new & init
impl BufferHandle {
    pub(crate) fn new(
        pool: PoolId,
        memory_range: ByteRange,
        size: vk::DeviceSize,
        buffer: vk::Buffer,
        usage: vk::BufferUsageFlags,
    ) -> Self {
        Self {
            pool,
            memory_range,
            size,
            buffer,
            usage,
        }
    }
}

// getter
impl BufferHandle {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    #[inline]
    pub fn memory_range(&self) -> ByteRange {
        self.memory_range
    }

    /// 创建时请求的大小，可能小于 `memory_range` 的长度
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }
}

// tools
impl BufferHandle {
    /// 通过 mem map 的方式将 bytes 写入 `offset` 处
    ///
    /// 所在的池必须是 host visible 的
    pub fn store(&self, arena: &mut MemoryArena, offset: vk::DeviceSize, bytes: &[u8]) -> GfxResult<()> {
        let dest = self.mapped_bytes(arena, offset, bytes.len() as vk::DeviceSize)?;
        dest.copy_from_slice(bytes);
        Ok(())
    }

    /// 将一个值序列化到 `offset` 处，返回写入的字节数
    pub fn store_value<T: GpuLayout>(
        &self,
        arena: &mut MemoryArena,
        offset: vk::DeviceSize,
        value: &T,
    ) -> GfxResult<vk::DeviceSize> {
        let len = T::PACKED_SIZE as vk::DeviceSize;
        let dest = self.mapped_bytes(arena, offset, len)?;
        value.serialize(dest, 0);
        Ok(len)
    }

    /// 将数组按 `mode` 的步长序列化到 `offset` 处，返回写入的字节数
    pub fn store_slice<T: GpuLayout>(
        &self,
        arena: &mut MemoryArena,
        offset: vk::DeviceSize,
        items: &[T],
        mode: StrideMode,
    ) -> GfxResult<vk::DeviceSize> {
        let len = slice_byte_len::<T>(items.len(), mode) as vk::DeviceSize;
        let dest = self.mapped_bytes(arena, offset, len)?;
        let written = serialize_slice(items, dest, 0, mode);
        Ok(written as vk::DeviceSize)
    }

    fn mapped_bytes<'a>(
        &self,
        arena: &'a mut MemoryArena,
        offset: vk::DeviceSize,
        len: vk::DeviceSize,
    ) -> GfxResult<&'a mut [u8]> {
        if offset.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(GfxError::StoreOutOfRange {
                offset,
                len,
                size: self.size,
            });
        }
        let start = self.memory_range.start + offset;
        arena.mapped_range_mut(self.pool, ByteRange { start, end: start + len })
    }

    /// 录制一条从本 buffer 起始处到 `dst[dst_offset..]` 的拷贝命令
    ///
    /// `byte_count` 为 0 时不录制任何命令
    pub fn copy_to(
        &self,
        dst: &BufferHandle,
        dst_offset: vk::DeviceSize,
        byte_count: vk::DeviceSize,
        cmd: &CommandList,
    ) -> GfxResult<()> {
        if byte_count > self.size || dst_offset.checked_add(byte_count).is_none_or(|end| end > dst.size) {
            return Err(GfxError::CopyOutOfRange {
                byte_count,
                dst_offset,
                src_size: self.size,
                dst_size: dst.size,
            });
        }
        if byte_count == 0 {
            return Ok(());
        }
        cmd.cmd_copy_buffer(
            self.buffer,
            dst.buffer,
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset,
                size: byte_count,
            }],
        );
        Ok(())
    }

    /// 录制整张 image 的 buffer -> image 拷贝
    ///
    /// image 需要已经处于 TRANSFER_DST_OPTIMAL，buffer 中至少有 `width * height * 4` 字节
    pub fn copy_into(&self, image: &ImageHandle, cmd: &CommandList) -> GfxResult<()> {
        if image.layout() != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
            return Err(GfxError::ImageNotWritable { layout: image.layout() });
        }
        let byte_count = image.byte_size();
        if byte_count > self.size {
            return Err(GfxError::CopyOutOfRange {
                byte_count,
                dst_offset: 0,
                src_size: self.size,
                dst_size: byte_count,
            });
        }

        let extent = image.extent();
        cmd.cmd_copy_buffer_to_image(
            self.buffer,
            image.vk_image(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            }],
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::{Mat4, Vec3};

    use super::*;
    use crate::{
        commands::submit_info::GfxSubmitInfo,
        foundation::{device::GfxDevice, headless_device::HeadlessDevice},
        memory::arena::UsageClass,
    };

    fn host_flags() -> vk::MemoryPropertyFlags {
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
    }

    #[test]
    fn test_store_bounds_checked() {
        let device = Rc::new(HeadlessDevice::new());
        let mut arena = MemoryArena::new(device.clone());
        let pool = arena.create_pool(UsageClass::Metadata, host_flags(), 256).unwrap();
        let buffer = arena.create_buffer(pool, 20, vk::BufferUsageFlags::STORAGE_BUFFER).unwrap();

        buffer.store(&mut arena, 16, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.read_buffer(buffer.vk_buffer(), 16, 4).unwrap(), vec![1, 2, 3, 4]);

        let err = buffer.store(&mut arena, 17, &[0; 4]).unwrap_err();
        assert!(matches!(
            err,
            GfxError::StoreOutOfRange {
                offset: 17,
                len: 4,
                size: 20
            }
        ));
        // 写入失败不会改动已有内容
        assert_eq!(device.read_buffer(buffer.vk_buffer(), 16, 4).unwrap(), vec![1, 2, 3, 4]);
        arena.destroy();
    }

    #[test]
    fn test_store_requires_host_visible_pool() {
        let device = Rc::new(HeadlessDevice::new());
        let mut arena = MemoryArena::new(device.clone());
        let pool = arena.create_pool(UsageClass::Geometry, vk::MemoryPropertyFlags::DEVICE_LOCAL, 256).unwrap();
        let buffer = arena.create_buffer(pool, 16, vk::BufferUsageFlags::STORAGE_BUFFER).unwrap();
        assert!(matches!(buffer.store(&mut arena, 0, &[0; 4]), Err(GfxError::NotHostVisible(_))));
        arena.destroy();
    }

    #[test]
    fn test_store_value_and_slice() {
        let device = Rc::new(HeadlessDevice::new());
        let mut arena = MemoryArena::new(device.clone());
        let pool = arena.create_pool(UsageClass::Metadata, host_flags(), 1024).unwrap();
        let buffer = arena.create_buffer(pool, 128, vk::BufferUsageFlags::STORAGE_BUFFER).unwrap();

        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(buffer.store_value(&mut arena, 0, &m).unwrap(), 64);
        let bytes = device.read_buffer(buffer.vk_buffer(), 48, 12).unwrap();
        assert_eq!(bytes, [1.0f32, 2.0, 3.0].iter().flat_map(|f| f.to_ne_bytes()).collect::<Vec<_>>());

        let written = buffer.store_slice(&mut arena, 64, &[7u32, 8, 9], StrideMode::Aligned16).unwrap();
        assert_eq!(written, 48);
        assert_eq!(device.read_buffer(buffer.vk_buffer(), 80, 4).unwrap(), 8u32.to_ne_bytes().to_vec());

        // 64 + 4 * 16 > 128
        assert!(buffer.store_slice(&mut arena, 68, &[0u32; 4], StrideMode::Aligned16).is_err());
        arena.destroy();
    }

    #[test]
    fn test_offsets_near_u64_max_rejected() {
        let device: Rc<dyn GfxDevice> = Rc::new(HeadlessDevice::new());
        let mut arena = MemoryArena::new(device.clone());
        let pool = arena.create_pool(UsageClass::Metadata, host_flags(), 1024).unwrap();
        let src = arena.create_buffer(pool, 32, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        let dst = arena.create_buffer(pool, 64, vk::BufferUsageFlags::TRANSFER_DST).unwrap();

        assert!(matches!(
            src.store(&mut arena, u64::MAX - 1, &[0; 4]),
            Err(GfxError::StoreOutOfRange { .. })
        ));

        let cmd = CommandList::begin(&device, "overflow-test").unwrap();
        assert!(matches!(src.copy_to(&dst, u64::MAX - 8, 16, &cmd), Err(GfxError::CopyOutOfRange { .. })));
        cmd.free();
        arena.destroy();
    }

    #[test]
    fn test_copy_to_checks_both_sides() {
        let device: Rc<dyn GfxDevice> = Rc::new(HeadlessDevice::new());
        let mut arena = MemoryArena::new(device.clone());
        let pool = arena.create_pool(UsageClass::Metadata, host_flags(), 1024).unwrap();
        let src = arena.create_buffer(pool, 32, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        let dst = arena.create_buffer(pool, 64, vk::BufferUsageFlags::TRANSFER_DST).unwrap();

        let cmd = CommandList::begin(&device, "copy-test").unwrap();
        assert!(matches!(src.copy_to(&dst, 0, 33, &cmd), Err(GfxError::CopyOutOfRange { .. })));
        assert!(matches!(src.copy_to(&dst, 40, 32, &cmd), Err(GfxError::CopyOutOfRange { .. })));
        src.copy_to(&dst, 32, 32, &cmd).unwrap();

        device.submit(&GfxSubmitInfo::new(std::slice::from_ref(&cmd)), vk::Fence::null()).unwrap();
        cmd.free();
        arena.destroy();
    }
}
