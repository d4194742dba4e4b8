use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::{commands::barrier::GfxImageBarrier, error::GfxResult, foundation::device::GfxDevice};

/// 一次性提交的 command buffer
///
/// 创建时已经处于 recording 状态，由 `GfxDevice::submit` 结束录制。
/// 需要手动调用 [`CommandList::free`]。
pub struct CommandList {
    vk_handle: vk::CommandBuffer,
    device: Rc<dyn GfxDevice>,

    name: String,
}

// new & init
impl CommandList {
    pub fn begin(device: &Rc<dyn GfxDevice>, name: impl AsRef<str>) -> GfxResult<Self> {
        let vk_handle = device.begin_one_shot()?;
        log::debug!("begin command list: {}", name.as_ref());
        Ok(Self {
            vk_handle,
            device: device.clone(),
            name: name.as_ref().to_string(),
        })
    }
}

// destroy
impl CommandList {
    #[inline]
    pub fn free(self) {
        self.device.free_command_buffer(self.vk_handle);
    }
}

// getters
impl CommandList {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// 数据传输类型
impl CommandList {
    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.device.cmd_copy_buffer(self.vk_handle, src, dst, regions);
    }

    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    #[inline]
    pub fn cmd_copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.device.cmd_copy_buffer_to_image(self.vk_handle, src, dst, dst_layout, regions);
    }
}

// 同步类型
impl CommandList {
    #[inline]
    pub fn image_memory_barrier(&self, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        self.device.cmd_image_barriers(self.vk_handle, &barriers);
    }
}
