use std::rc::Rc;

use ash::vk;

use crate::{error::GfxResult, foundation::device::GfxDevice};

/// # Destroy
/// 不实现 Drop，需要手动 destroy
pub struct GfxFence {
    fence: vk::Fence,
    device: Rc<dyn GfxDevice>,
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: &Rc<dyn GfxDevice>, signaled: bool) -> GfxResult<Self> {
        let fence = device.create_fence(signaled)?;
        Ok(Self {
            fence,
            device: device.clone(),
        })
    }

    #[inline]
    pub fn destroy(self) {
        self.device.destroy_fence(self.fence);
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence
    #[inline]
    pub fn wait(&self) -> GfxResult<()> {
        self.device.wait_fence(self.fence)
    }

    #[inline]
    pub fn reset(&self) -> GfxResult<()> {
        self.device.reset_fence(self.fence)
    }
}
