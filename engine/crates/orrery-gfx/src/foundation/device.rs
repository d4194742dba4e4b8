use ash::vk;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    error::{GfxError, GfxResult},
};

/// 内存池、资源、上传所依赖的设备接口
///
/// 由外部渲染器提供 `VulkanDevice`；测试和 demo 使用 `HeadlessDevice`。
/// 所有方法都是 `&self`，通过 `Rc<dyn GfxDevice>` 共享。
///
/// `cmd_*` 方法只负责录制，`submit` 会先结束 submit info 中的所有 command buffer，再提交。
pub trait GfxDevice {
    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties;

    // memory
    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> GfxResult<vk::DeviceMemory>;
    /// 映射整块内存，返回起始地址
    fn map_memory(&self, memory: vk::DeviceMemory) -> GfxResult<*mut u8>;
    fn unmap_memory(&self, memory: vk::DeviceMemory);
    fn free_memory(&self, memory: vk::DeviceMemory);

    // buffer & image
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> GfxResult<(vk::Buffer, vk::MemoryRequirements)>;
    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> GfxResult<()>;
    fn destroy_buffer(&self, buffer: vk::Buffer);

    fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> GfxResult<(vk::Image, vk::MemoryRequirements)>;
    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> GfxResult<()>;
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> GfxResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn destroy_image(&self, image: vk::Image);

    // commands
    /// 分配并 begin 一个 ONE_TIME_SUBMIT 的 command buffer
    fn begin_one_shot(&self) -> GfxResult<vk::CommandBuffer>;
    fn free_command_buffer(&self, cmd: vk::CommandBuffer);
    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );
    fn cmd_image_barriers(&self, cmd: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]);
    /// `fence` 可以为 `vk::Fence::null()`
    fn submit(&self, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()>;

    // sync
    fn create_fence(&self, signaled: bool) -> GfxResult<vk::Fence>;
    fn wait_fence(&self, fence: vk::Fence) -> GfxResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn create_semaphore(&self) -> GfxResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// 找到第一个同时满足 `type_bits` 和 `properties` 的 memory type
    fn resolve_memory_type(&self, type_bits: u32, properties: vk::MemoryPropertyFlags) -> GfxResult<u32> {
        find_memory_type(self.memory_properties(), type_bits, properties)
    }
}

pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> GfxResult<u32> {
    memory_properties.memory_types[..memory_properties.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            (type_bits & (1 << index)) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(index, _)| index as u32)
        .ok_or(GfxError::NoSuitableMemoryType { type_bits, properties })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_type_properties() -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props
    }

    #[test]
    fn test_find_memory_type() {
        let props = two_type_properties();
        assert_eq!(find_memory_type(&props, !0, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 0);
        assert_eq!(find_memory_type(&props, !0, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap(), 1);
    }

    #[test]
    fn test_find_memory_type_respects_type_bits() {
        let props = two_type_properties();
        let err = find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap_err();
        assert!(matches!(err, GfxError::NoSuitableMemoryType { .. }));
        assert!(err.is_fatal());
    }
}
