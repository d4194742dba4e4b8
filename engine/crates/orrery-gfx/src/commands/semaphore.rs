use std::rc::Rc;

use ash::vk;

use crate::{error::GfxResult, foundation::device::GfxDevice};

/// binary semaphore，需要手动 destroy
pub struct GfxSemaphore {
    semaphore: vk::Semaphore,
    device: Rc<dyn GfxDevice>,
}

impl GfxSemaphore {
    pub fn new(device: &Rc<dyn GfxDevice>) -> GfxResult<Self> {
        let semaphore = device.create_semaphore()?;
        Ok(Self {
            semaphore,
            device: device.clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    #[inline]
    pub fn destroy(self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}
