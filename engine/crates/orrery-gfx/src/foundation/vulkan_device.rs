use ash::vk;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    error::{GfxResult, VkResultExt},
    foundation::device::GfxDevice,
};

/// 基于 ash 的设备实现
///
/// `ash::Device` 和 queue 由外部渲染器创建并持有，这里只负责一个 TRANSIENT 的 command pool。
/// 需要设备开启 synchronization2。
pub struct VulkanDevice {
    device: ash::Device,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

// new & init
impl VulkanDevice {
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue_family_index: u32,
        queue: vk::Queue,
    ) -> GfxResult<Self> {
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let pool_ci = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_ci, None) }.vk_context("vkCreateCommandPool")?;

        log::info!(
            "VulkanDevice created, queue family: {}, memory types: {}",
            queue_family_index,
            memory_properties.memory_type_count
        );

        Ok(Self {
            device,
            queue,
            command_pool,
            memory_properties,
        })
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
        log::info!("VulkanDevice dropped.");
    }
}

// getter
impl VulkanDevice {
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }
}

impl GfxDevice for VulkanDevice {
    #[inline]
    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> GfxResult<vk::DeviceMemory> {
        let alloc_info = vk::MemoryAllocateInfo::default().allocation_size(size).memory_type_index(memory_type_index);
        unsafe { self.device.allocate_memory(&alloc_info, None) }.vk_context("vkAllocateMemory")
    }

    fn map_memory(&self, memory: vk::DeviceMemory) -> GfxResult<*mut u8> {
        unsafe { self.device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty()) }
            .map(|ptr| ptr as *mut u8)
            .vk_context("vkMapMemory")
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) }
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> GfxResult<(vk::Buffer, vk::MemoryRequirements)> {
        let buffer_ci = vk::BufferCreateInfo::default().size(size).usage(usage).sharing_mode(vk::SharingMode::EXCLUSIVE);
        unsafe {
            let buffer = self.device.create_buffer(&buffer_ci, None).vk_context("vkCreateBuffer")?;
            let requirements = self.device.get_buffer_memory_requirements(buffer);
            Ok((buffer, requirements))
        }
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> GfxResult<()> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, offset) }.vk_context("vkBindBufferMemory")
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> GfxResult<(vk::Image, vk::MemoryRequirements)> {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        unsafe {
            let image = self.device.create_image(&image_ci, None).vk_context("vkCreateImage")?;
            let requirements = self.device.get_image_memory_requirements(image);
            Ok((image, requirements))
        }
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> GfxResult<()> {
        unsafe { self.device.bind_image_memory(image, memory, offset) }.vk_context("vkBindImageMemory")
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> GfxResult<vk::ImageView> {
        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.device.create_image_view(&view_ci, None) }.vk_context("vkCreateImageView")
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    fn begin_one_shot(&self) -> GfxResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        unsafe {
            let cmd = self.device.allocate_command_buffers(&alloc_info).vk_context("vkAllocateCommandBuffers")?[0];
            let begin_info =
                vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            if let Err(result) = self.device.begin_command_buffer(cmd, &begin_info) {
                self.device.free_command_buffers(self.command_pool, &[cmd]);
                return Err(result).vk_context("vkBeginCommandBuffer");
            }
            Ok(cmd)
        }
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(self.command_pool, std::slice::from_ref(&cmd)) }
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, regions) }
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe { self.device.cmd_copy_buffer_to_image(cmd, src, dst, dst_layout, regions) }
    }

    fn cmd_image_barriers(&self, cmd: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(barriers);
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dependency_info) }
    }

    fn submit(&self, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()> {
        unsafe {
            for cmd in submit_info.command_buffers() {
                self.device.end_command_buffer(cmd).vk_context("vkEndCommandBuffer")?;
            }
            self.device
                .queue_submit2(self.queue, std::slice::from_ref(&submit_info.submit_info()), fence)
                .vk_context("vkQueueSubmit2")
        }
    }

    fn create_fence(&self, signaled: bool) -> GfxResult<vk::Fence> {
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None) }
            .vk_context("vkCreateFence")
    }

    fn wait_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        unsafe { self.device.wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX) }
            .vk_context("vkWaitForFences")
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        unsafe { self.device.reset_fences(std::slice::from_ref(&fence)) }.vk_context("vkResetFences")
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn create_semaphore(&self) -> GfxResult<vk::Semaphore> {
        unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .vk_context("vkCreateSemaphore")
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }
}
