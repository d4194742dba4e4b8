use ash::vk;

use crate::error::{GfxError, GfxResult};

/// barrier 使用的 src 和 dst 访问 mask
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBarrierMask {
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_access: vk::AccessFlags2,
}

impl GfxBarrierMask {
    /// 上传流程中用到的 layout 转换
    ///
    /// | old | new | src | dst |
    /// |---|---|---|---|
    /// | UNDEFINED | TRANSFER_DST_OPTIMAL | TOP_OF_PIPE / NONE | TRANSFER / TRANSFER_WRITE |
    /// | TRANSFER_DST_OPTIMAL | SHADER_READ_ONLY_OPTIMAL | TRANSFER / TRANSFER_WRITE | FRAGMENT_SHADER / SHADER_READ |
    ///
    /// 其他组合返回 [`GfxError::UnsupportedLayoutTransition`]
    pub fn for_layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> GfxResult<Self> {
        match (old, new) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(Self {
                src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                src_access: vk::AccessFlags2::NONE,
                dst_stage: vk::PipelineStageFlags2::TRANSFER,
                dst_access: vk::AccessFlags2::TRANSFER_WRITE,
            }),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok(Self {
                src_stage: vk::PipelineStageFlags2::TRANSFER,
                src_access: vk::AccessFlags2::TRANSFER_WRITE,
                dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                dst_access: vk::AccessFlags2::SHADER_READ,
            }),
            _ => Err(GfxError::UnsupportedLayoutTransition { old, new }),
        }
    }
}

/// 便捷创建 image memory barrier 的结构体
#[derive(Clone, Copy)]
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::UNDEFINED,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_array_layer: 0,
                    layer_count: 1,
                    base_mip_level: 0,
                    level_count: 1,
                },
                ..Default::default()
            },
        }
    }
}

impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'static> {
        &self.inner
    }

    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn mask(mut self, mask: GfxBarrierMask) -> Self {
        self.inner.src_stage_mask = mask.src_stage;
        self.inner.dst_stage_mask = mask.dst_stage;
        self.inner.src_access_mask = mask.src_access;
        self.inner.dst_access_mask = mask.dst_access;
        self
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.inner.image = image;
        self
    }

    /// 根据 layout 转换表构造 barrier
    pub fn layout_transition(image: vk::Image, old: vk::ImageLayout, new: vk::ImageLayout) -> GfxResult<Self> {
        let mask = GfxBarrierMask::for_layout_transition(old, new)?;
        Ok(Self::new().image(image).layout_transfer(old, new).mask(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_barrier_layout_change() {
        let barrier = GfxImageBarrier::layout_transition(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        let inner = barrier.inner();
        assert_eq!(inner.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(inner.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(inner.src_stage_mask, vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert_eq!(inner.dst_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(inner.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_transfer_to_shader_read_masks() {
        let mask = GfxBarrierMask::for_layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(mask.src_access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(mask.dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(mask.dst_access, vk::AccessFlags2::SHADER_READ);
    }

    #[test]
    fn test_unsupported_transition_fails_loudly() {
        let pairs = [
            (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
        ];
        for (old, new) in pairs {
            let err = GfxBarrierMask::for_layout_transition(old, new).unwrap_err();
            assert!(matches!(err, GfxError::UnsupportedLayoutTransition { .. }));
            assert!(!err.is_fatal());
        }
    }
}
