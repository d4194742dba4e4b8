use ash::vk;

use crate::memory::arena::{ByteRange, PoolId};

/// arena 中的一张 2D image 以及它的 view
///
/// `layout` 记录的是已录制的命令全部执行完之后 image 所处的 layout，
/// 由 [`crate::upload::uploader::ResourceUploader::transition_layout`] 更新。
/// layout 只记录在这一份句柄里，句柄不可 `Clone`：
///
/// ```compile_fail
/// fn needs_clone<T: Clone>() {}
/// needs_clone::<orrery_gfx::resources::image::ImageHandle>();
/// ```
#[derive(Debug)]
pub struct ImageHandle {
    pool: PoolId,
    memory_range: ByteRange,
    image: vk::Image,
    view: vk::ImageView,

    extent: vk::Extent2D,
    format: vk::Format,
    layout: vk::ImageLayout,
}

// new & init
impl ImageHandle {
    pub(crate) fn new(
        pool: PoolId,
        memory_range: ByteRange,
        image: vk::Image,
        view: vk::ImageView,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Self {
        Self {
            pool,
            memory_range,
            image,
            view,
            extent,
            format,
            layout: vk::ImageLayout::UNDEFINED,
        }
    }
}

// getter
impl ImageHandle {
    #[inline]
    pub fn vk_image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn vk_image_view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    #[inline]
    pub fn memory_range(&self) -> ByteRange {
        self.memory_range
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// RGBA8 像素数据的字节数
    #[inline]
    pub fn byte_size(&self) -> vk::DeviceSize {
        self.extent.width as vk::DeviceSize * self.extent.height as vk::DeviceSize * 4
    }
}

impl ImageHandle {
    #[inline]
    pub(crate) fn set_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }
}
