use std::{ptr::NonNull, rc::Rc};

use ash::vk;

use crate::{
    error::{GfxError, GfxResult},
    foundation::device::GfxDevice,
    resources::{buffer::BufferHandle, image::ImageHandle},
};

/// 内存池的用途，同一种 memory type 下每种用途最多一个池
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageClass {
    /// 小块的结构化数据：draw info、material info、camera uniform
    Metadata,
    /// 顶点数据
    Geometry,
    /// 纹理以及纹理上传用的 staging
    Texture,
}

/// 内存池在 arena 中的索引，资源只保存这个 id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(usize);

impl PoolId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// 左闭右开的字节区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: vk::DeviceSize,
    pub end: vk::DeviceSize,
}

impl ByteRange {
    #[inline]
    pub fn len(&self) -> vk::DeviceSize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[inline]
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// 一整块 device memory，上面只做 bump 分配
pub struct MemoryPool {
    memory: vk::DeviceMemory,
    memory_type_index: u32,
    usage_class: UsageClass,
    properties: vk::MemoryPropertyFlags,
    capacity: vk::DeviceSize,
    cursor: vk::DeviceSize,
    /// 第一次 map 之后一直保持映射
    mapped: Option<NonNull<u8>>,
}

// getter
impl MemoryPool {
    #[inline]
    pub fn vk_memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    #[inline]
    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    #[inline]
    pub fn usage_class(&self) -> UsageClass {
        self.usage_class
    }

    #[inline]
    pub fn properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }

    #[inline]
    pub fn capacity(&self) -> vk::DeviceSize {
        self.capacity
    }

    #[inline]
    pub fn cursor(&self) -> vk::DeviceSize {
        self.cursor
    }

    #[inline]
    pub fn is_host_visible(&self) -> bool {
        self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }
}

/// GPU 资源 arena
///
/// 持有若干固定大小的内存池，buffer / image 从池中按顺序切出一段并绑定。
/// 不支持单独释放，所有原生对象在 [`MemoryArena::destroy`] 时一起释放。
pub struct MemoryArena {
    device: Rc<dyn GfxDevice>,
    pools: Vec<MemoryPool>,

    buffers: Vec<vk::Buffer>,
    images: Vec<(vk::Image, vk::ImageView)>,
}

// new & init
impl MemoryArena {
    pub fn new(device: Rc<dyn GfxDevice>) -> Self {
        Self {
            device,
            pools: vec![],
            buffers: vec![],
            images: vec![],
        }
    }

    /// 分配一块 `capacity` 大小的内存作为新的池
    ///
    /// 同一个 (memory type, usage class) 只能有一个池
    pub fn create_pool(
        &mut self,
        usage_class: UsageClass,
        properties: vk::MemoryPropertyFlags,
        capacity: vk::DeviceSize,
    ) -> GfxResult<PoolId> {
        let memory_type_index = self.device.resolve_memory_type(!0, properties)?;
        if self.pools.iter().any(|p| p.memory_type_index == memory_type_index && p.usage_class == usage_class) {
            return Err(GfxError::PoolAlreadyExists {
                memory_type_index,
                usage_class,
            });
        }

        let memory = self.device.allocate_memory(capacity, memory_type_index)?;
        let id = PoolId(self.pools.len());
        self.pools.push(MemoryPool {
            memory,
            memory_type_index,
            usage_class,
            properties,
            capacity,
            cursor: 0,
            mapped: None,
        });

        log::info!(
            "memory pool {:?} created: {:?}, type {}, {:?}, {} bytes",
            id,
            usage_class,
            memory_type_index,
            properties,
            capacity
        );
        Ok(id)
    }
}

// destroy
impl MemoryArena {
    /// 释放所有 buffer、image 以及内存块
    pub fn destroy(mut self) {
        for buffer in self.buffers.drain(..) {
            self.device.destroy_buffer(buffer);
        }
        for (image, view) in self.images.drain(..) {
            self.device.destroy_image_view(view);
            self.device.destroy_image(image);
        }
        for pool in self.pools.drain(..) {
            if pool.mapped.is_some() {
                self.device.unmap_memory(pool.memory);
            }
            self.device.free_memory(pool.memory);
        }
        log::info!("MemoryArena destroyed.");
    }
}

// getter
impl MemoryArena {
    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }

    #[inline]
    pub fn pool(&self, id: PoolId) -> GfxResult<&MemoryPool> {
        self.pools.get(id.0).ok_or(GfxError::UnknownPool(id))
    }

    #[inline]
    fn pool_mut(&mut self, id: PoolId) -> GfxResult<&mut MemoryPool> {
        self.pools.get_mut(id.0).ok_or(GfxError::UnknownPool(id))
    }

    #[inline]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    #[inline]
    pub fn used(&self, id: PoolId) -> GfxResult<vk::DeviceSize> {
        Ok(self.pool(id)?.cursor)
    }

    #[inline]
    pub fn capacity(&self, id: PoolId) -> GfxResult<vk::DeviceSize> {
        Ok(self.pool(id)?.capacity)
    }

    #[inline]
    pub fn remaining(&self, id: PoolId) -> GfxResult<vk::DeviceSize> {
        let pool = self.pool(id)?;
        Ok(pool.capacity - pool.cursor)
    }
}

// allocation
impl MemoryArena {
    /// 从 cursor 处切出 `size` 字节
    ///
    /// 超出容量时返回 [`GfxError::ArenaExhausted`]，cursor 保持不变
    pub fn allocate(&mut self, pool: PoolId, size: vk::DeviceSize) -> GfxResult<ByteRange> {
        self.allocate_aligned(pool, size, 1)
    }

    /// 先将起始位置对齐到 `alignment`，再切出 `size` 字节
    pub fn allocate_aligned(
        &mut self,
        pool_id: PoolId,
        size: vk::DeviceSize,
        alignment: vk::DeviceSize,
    ) -> GfxResult<ByteRange> {
        let pool = self.pool_mut(pool_id)?;
        let range = pool
            .cursor
            .checked_next_multiple_of(alignment.max(1))
            .and_then(|start| Some((start, start.checked_add(size)?)))
            .filter(|&(_, end)| end <= pool.capacity);
        let Some((start, end)) = range else {
            return Err(GfxError::ArenaExhausted {
                pool: pool_id,
                requested: size,
                cursor: pool.cursor,
                capacity: pool.capacity,
            });
        };
        pool.cursor = end;

        log::debug!("pool {:?}: allocated [{}, {}), {} bytes left", pool_id, start, end, pool.capacity - end);
        Ok(ByteRange { start, end })
    }

    /// 持久映射整个池，重复调用无副作用
    pub fn map(&mut self, pool_id: PoolId) -> GfxResult<()> {
        let device = self.device.clone();
        let pool = self.pool_mut(pool_id)?;
        if pool.mapped.is_some() {
            return Ok(());
        }
        if !pool.is_host_visible() {
            return Err(GfxError::NotHostVisible(pool_id));
        }
        let ptr = device.map_memory(pool.memory)?;
        pool.mapped = NonNull::new(ptr);
        if pool.mapped.is_none() {
            return Err(GfxError::Vulkan {
                call: "vkMapMemory",
                result: vk::Result::ERROR_MEMORY_MAP_FAILED,
            });
        }
        log::debug!("pool {:?} mapped", pool_id);
        Ok(())
    }

    /// 池中 `range` 对应的映射内存，池需要是 host visible 的，按需映射
    pub(crate) fn mapped_range_mut(&mut self, pool_id: PoolId, range: ByteRange) -> GfxResult<&mut [u8]> {
        self.map(pool_id)?;
        let pool = self.pool(pool_id)?;
        if range.end > pool.capacity {
            return Err(GfxError::StoreOutOfRange {
                offset: range.start,
                len: range.len(),
                size: pool.capacity,
            });
        }
        let base = pool.mapped.ok_or(GfxError::NotHostVisible(pool_id))?;
        // SAFETY: 映射覆盖整个池，range 在容量之内，返回的切片借用了 &mut self
        Ok(unsafe { std::slice::from_raw_parts_mut(base.as_ptr().add(range.start as usize), range.len() as usize) })
    }
}

// resources
impl MemoryArena {
    /// 创建 buffer，并从池中分配满足 memory requirements 的一段内存进行绑定
    ///
    /// 分配失败时 buffer 会被销毁
    pub fn create_buffer(
        &mut self,
        pool_id: PoolId,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> GfxResult<BufferHandle> {
        let memory = self.pool(pool_id)?.memory;
        let memory_type_index = self.pool(pool_id)?.memory_type_index;

        let (buffer, requirements) = self.device.create_buffer(size, usage)?;
        let bound = self.check_type_bits(pool_id, memory_type_index, requirements).and_then(|_| {
            let range = self.allocate_aligned(pool_id, requirements.size, requirements.alignment)?;
            self.device.bind_buffer_memory(buffer, memory, range.start)?;
            Ok(range)
        });
        let range = match bound {
            Ok(range) => range,
            Err(err) => {
                self.device.destroy_buffer(buffer);
                return Err(err);
            }
        };

        self.buffers.push(buffer);
        log::debug!("buffer created in pool {:?}: {} bytes at {:?}, usage {:?}", pool_id, size, range, usage);
        Ok(BufferHandle::new(pool_id, range, size, buffer, usage))
    }

    /// 创建 2D image 和对应的 view，初始 layout 为 UNDEFINED
    pub fn create_image(
        &mut self,
        pool_id: PoolId,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> GfxResult<ImageHandle> {
        let memory = self.pool(pool_id)?.memory;
        let memory_type_index = self.pool(pool_id)?.memory_type_index;

        let (image, requirements) = self.device.create_image(extent, format, usage)?;
        let bound = self.check_type_bits(pool_id, memory_type_index, requirements).and_then(|_| {
            let range = self.allocate_aligned(pool_id, requirements.size, requirements.alignment)?;
            self.device.bind_image_memory(image, memory, range.start)?;
            Ok(range)
        });
        let range = match bound {
            Ok(range) => range,
            Err(err) => {
                self.device.destroy_image(image);
                return Err(err);
            }
        };
        let view = match self.device.create_image_view(image, format) {
            Ok(view) => view,
            Err(err) => {
                self.device.destroy_image(image);
                return Err(err);
            }
        };

        self.images.push((image, view));
        log::debug!("image created in pool {:?}: {}x{} {:?} at {:?}", pool_id, extent.width, extent.height, format, range);
        Ok(ImageHandle::new(pool_id, range, image, view, extent, format))
    }

    fn check_type_bits(
        &self,
        pool_id: PoolId,
        memory_type_index: u32,
        requirements: vk::MemoryRequirements,
    ) -> GfxResult<()> {
        if requirements.memory_type_bits & (1 << memory_type_index) == 0 {
            return Err(GfxError::NoSuitableMemoryType {
                type_bits: requirements.memory_type_bits,
                properties: self.pool(pool_id)?.properties,
            });
        }
        Ok(())
    }
}
