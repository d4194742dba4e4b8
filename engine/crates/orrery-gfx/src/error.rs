use ash::vk;

use crate::memory::arena::PoolId;

pub type GfxResult<T> = Result<T, GfxError>;

#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("memory pool {pool:?} exhausted: requested {requested} bytes at cursor {cursor}, capacity {capacity}")]
    ArenaExhausted {
        pool: PoolId,
        requested: vk::DeviceSize,
        cursor: vk::DeviceSize,
        capacity: vk::DeviceSize,
    },

    #[error("unsupported image layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition { old: vk::ImageLayout, new: vk::ImageLayout },

    #[error("store of {len} bytes at offset {offset} exceeds buffer size {size}")]
    StoreOutOfRange {
        offset: vk::DeviceSize,
        len: vk::DeviceSize,
        size: vk::DeviceSize,
    },

    #[error("copy of {byte_count} bytes (dst offset {dst_offset}) exceeds src size {src_size} or dst size {dst_size}")]
    CopyOutOfRange {
        byte_count: vk::DeviceSize,
        dst_offset: vk::DeviceSize,
        src_size: vk::DeviceSize,
        dst_size: vk::DeviceSize,
    },

    #[error("memory pool {0:?} is not host visible")]
    NotHostVisible(PoolId),

    #[error("unknown memory pool {0:?}")]
    UnknownPool(PoolId),

    #[error("a {usage_class:?} pool already exists for memory type {memory_type_index}")]
    PoolAlreadyExists {
        memory_type_index: u32,
        usage_class: crate::memory::arena::UsageClass,
    },

    #[error("no memory type matches bits {type_bits:#b} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("image is in layout {layout:?}, expected TRANSFER_DST_OPTIMAL")]
    ImageNotWritable { layout: vk::ImageLayout },

    #[error("{call} failed: {result:?}")]
    Vulkan { call: &'static str, result: vk::Result },
}

impl GfxError {
    /// 原生调用失败、找不到内存类型、内存池耗尽都属于无法恢复的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GfxError::Vulkan { .. } | GfxError::NoSuitableMemoryType { .. } | GfxError::ArenaExhausted { .. }
        )
    }
}

/// 将 `VkResult` 转换为 [`GfxError::Vulkan`]
pub(crate) trait VkResultExt<T> {
    fn vk_context(self, call: &'static str) -> GfxResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    #[inline]
    fn vk_context(self, call: &'static str) -> GfxResult<T> {
        self.map_err(|result| GfxError::Vulkan { call, result })
    }
}
