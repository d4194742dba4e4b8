use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
};

use ash::vk::{self, Handle};
use itertools::Itertools;

use crate::{
    commands::submit_info::GfxSubmitInfo,
    error::{GfxError, GfxResult},
    foundation::device::GfxDevice,
};

const BUFFER_ALIGNMENT: vk::DeviceSize = 16;
const IMAGE_ALIGNMENT: vk::DeviceSize = 256;
const TEXEL_SIZE: vk::DeviceSize = 4;

/// 没有 GPU 的设备实现
///
/// - 内存是主机上的一块分配，两种 memory type：0 = DEVICE_LOCAL，1 = HOST_VISIBLE | HOST_COHERENT
/// - 命令在录制时只是记下来，`submit` 时按顺序执行
/// - submit 会像验证层一样检查 fence / semaphore / image layout 的状态
///
/// 提供 `read_buffer`、`image_layout` 等查询接口，用于测试和 demo。
pub struct HeadlessDevice {
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    next_handle: Cell<u64>,
    fail_next_submit: Cell<bool>,
    state: RefCell<HeadlessState>,
}

/// 运行统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessStats {
    pub submits: u32,
    pub fence_waits: u32,
    pub buffer_copies: u32,
    pub image_copies: u32,
    pub barriers: u32,
}

#[derive(Default)]
struct HeadlessState {
    memories: HashMap<u64, HeadlessMemory>,
    buffers: HashMap<u64, HeadlessBuffer>,
    images: HashMap<u64, HeadlessImage>,
    views: HashMap<u64, u64>,
    command_buffers: HashMap<u64, CommandState>,
    fences: HashMap<u64, bool>,
    semaphores: HashMap<u64, bool>,
    stats: HeadlessStats,
}

/// 所有访问都通过裸指针进行，`map_memory` 返回的指针在 `free_memory` 之前一直有效
struct HeadlessMemory {
    ptr: *mut u8,
    len: usize,
    memory_type_index: u32,
}

impl HeadlessMemory {
    fn new(len: usize, memory_type_index: u32) -> Self {
        let ptr = Box::into_raw(vec![0u8; len].into_boxed_slice()) as *mut u8;
        Self {
            ptr,
            len,
            memory_type_index,
        }
    }

    fn release(self) {
        // SAFETY: ptr / len 来自 `Box::into_raw`，且只释放一次
        unsafe { drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.ptr, self.len))) }
    }
}

#[derive(Clone, Copy)]
struct Binding {
    memory: u64,
    offset: vk::DeviceSize,
}

struct HeadlessBuffer {
    size: vk::DeviceSize,
    binding: Option<Binding>,
}

struct HeadlessImage {
    extent: vk::Extent2D,
    layout: vk::ImageLayout,
    binding: Option<Binding>,
}

impl HeadlessImage {
    #[inline]
    fn byte_size(&self) -> vk::DeviceSize {
        self.extent.width as vk::DeviceSize * self.extent.height as vk::DeviceSize * TEXEL_SIZE
    }
}

enum Recorded {
    CopyBuffer {
        src: u64,
        dst: u64,
        regions: Vec<vk::BufferCopy>,
    },
    CopyBufferToImage {
        src: u64,
        dst: u64,
        dst_layout: vk::ImageLayout,
        regions: Vec<vk::BufferImageCopy>,
    },
    ImageBarrier {
        image: u64,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
}

#[derive(Default)]
struct CommandState {
    commands: Vec<Recorded>,
    submitted: bool,
}

#[inline]
fn validation_failed(call: &'static str) -> GfxError {
    GfxError::Vulkan {
        call,
        result: vk::Result::ERROR_VALIDATION_FAILED_EXT,
    }
}

// new & init
impl HeadlessDevice {
    pub fn new() -> Self {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            memory_heap_count: 2,
            ..Default::default()
        };
        memory_properties.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 0,
        };
        memory_properties.memory_types[1] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 1,
        };
        memory_properties.memory_heaps[0] = vk::MemoryHeap {
            size: 1 << 30,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory_properties.memory_heaps[1] = vk::MemoryHeap {
            size: 1 << 30,
            flags: vk::MemoryHeapFlags::empty(),
        };

        Self {
            memory_properties,
            next_handle: Cell::new(1),
            fail_next_submit: Cell::new(false),
            state: RefCell::new(HeadlessState::default()),
        }
    }

    #[inline]
    fn next_raw(&self) -> u64 {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        raw
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.buffers.is_empty() || !state.images.is_empty() || !state.memories.is_empty() {
            log::warn!(
                "HeadlessDevice dropped with live objects: {} buffers, {} images, {} memory blocks",
                state.buffers.len(),
                state.images.len(),
                state.memories.len()
            );
        }
        for (_, memory) in state.memories.drain() {
            memory.release();
        }
        log::info!("HeadlessDevice dropped.");
    }
}

// inspection
impl HeadlessDevice {
    /// 读取 buffer 中 `[offset, offset + len)` 的内容
    pub fn read_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, len: vk::DeviceSize) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let buf = state.buffers.get(&buffer.as_raw())?;
        if offset + len > buf.size {
            return None;
        }
        let binding = buf.binding?;
        state.read_memory(binding.memory, binding.offset + offset, len)
    }

    /// 读取 image 的全部像素（RGBA8，行主序）
    pub fn read_image(&self, image: vk::Image) -> Option<Vec<u8>> {
        let state = self.state.borrow();
        let img = state.images.get(&image.as_raw())?;
        let binding = img.binding?;
        state.read_memory(binding.memory, binding.offset, img.byte_size())
    }

    pub fn image_layout(&self, image: vk::Image) -> Option<vk::ImageLayout> {
        self.state.borrow().images.get(&image.as_raw()).map(|img| img.layout)
    }

    pub fn semaphore_signaled(&self, semaphore: vk::Semaphore) -> Option<bool> {
        self.state.borrow().semaphores.get(&semaphore.as_raw()).copied()
    }

    #[inline]
    pub fn stats(&self) -> HeadlessStats {
        self.state.borrow().stats
    }

    #[inline]
    pub fn live_command_buffers(&self) -> usize {
        self.state.borrow().command_buffers.len()
    }

    #[inline]
    pub fn live_semaphores(&self) -> usize {
        self.state.borrow().semaphores.len()
    }

    /// 返回 (buffer, image, memory block) 的存活数量
    pub fn live_objects(&self) -> (usize, usize, usize) {
        let state = self.state.borrow();
        (state.buffers.len(), state.images.len(), state.memories.len())
    }

    /// 下一次 `submit` 返回 `VK_ERROR_DEVICE_LOST`，用于测试失败路径
    #[inline]
    pub fn fail_next_submit(&self) {
        self.fail_next_submit.set(true);
    }
}

// tools
impl HeadlessState {
    fn read_memory(&self, memory: u64, offset: vk::DeviceSize, len: vk::DeviceSize) -> Option<Vec<u8>> {
        let mem = self.memories.get(&memory)?;
        let (offset, len) = (offset as usize, len as usize);
        if offset + len > mem.len {
            return None;
        }
        // SAFETY: 范围已经检查过
        Some(unsafe { std::slice::from_raw_parts(mem.ptr.add(offset), len) }.to_vec())
    }

    /// `[offset, offset + len)` 是否落在 buffer 以及它绑定的内存之内
    fn check_span(
        &self,
        size: vk::DeviceSize,
        binding: Binding,
        offset: vk::DeviceSize,
        len: vk::DeviceSize,
        call: &'static str,
    ) -> GfxResult<()> {
        let mem_len = self.memories.get(&binding.memory).ok_or(validation_failed(call))?.len as vk::DeviceSize;
        let end = offset.checked_add(len).ok_or(validation_failed(call))?;
        let mem_end = binding.offset.checked_add(end).ok_or(validation_failed(call))?;
        if end > size || mem_end > mem_len {
            return Err(validation_failed(call));
        }
        Ok(())
    }

    /// 检查一条命令能否执行，不修改任何状态
    ///
    /// `layouts` 记录同一次提交中前面的 barrier 造成的 layout 变化
    fn validate(&self, command: &Recorded, layouts: &mut HashMap<u64, vk::ImageLayout>) -> GfxResult<()> {
        match command {
            Recorded::CopyBuffer { src, dst, regions } => {
                let call = "vkCmdCopyBuffer";
                let src_buf = self.buffers.get(src).ok_or(validation_failed(call))?;
                let dst_buf = self.buffers.get(dst).ok_or(validation_failed(call))?;
                let (Some(src_binding), Some(dst_binding)) = (src_buf.binding, dst_buf.binding) else {
                    return Err(validation_failed(call));
                };
                for region in regions {
                    self.check_span(src_buf.size, src_binding, region.src_offset, region.size, call)?;
                    self.check_span(dst_buf.size, dst_binding, region.dst_offset, region.size, call)?;
                }
            }
            Recorded::CopyBufferToImage {
                src,
                dst,
                dst_layout,
                regions,
            } => {
                let call = "vkCmdCopyBufferToImage";
                let src_buf = self.buffers.get(src).ok_or(validation_failed(call))?;
                let dst_img = self.images.get(dst).ok_or(validation_failed(call))?;
                let current = layouts.get(dst).copied().unwrap_or(dst_img.layout);
                if current != *dst_layout || *dst_layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
                    log::error!("copy into image in layout {:?} (recorded {:?})", current, dst_layout);
                    return Err(validation_failed(call));
                }
                let (Some(src_binding), Some(dst_binding)) = (src_buf.binding, dst_img.binding) else {
                    return Err(validation_failed(call));
                };
                for region in regions {
                    // 只支持整张图的拷贝，buffer 中的数据紧密排列
                    let len = region.image_extent.width as vk::DeviceSize
                        * region.image_extent.height as vk::DeviceSize
                        * TEXEL_SIZE;
                    if len != dst_img.byte_size() {
                        return Err(validation_failed(call));
                    }
                    self.check_span(src_buf.size, src_binding, region.buffer_offset, len, call)?;
                    self.check_span(len, dst_binding, 0, len, call)?;
                }
            }
            Recorded::ImageBarrier {
                image,
                old_layout,
                new_layout,
            } => {
                let img = self.images.get(image).ok_or(validation_failed("vkCmdPipelineBarrier2"))?;
                let current = layouts.get(image).copied().unwrap_or(img.layout);
                if *old_layout != vk::ImageLayout::UNDEFINED && *old_layout != current {
                    log::error!("barrier old layout {:?} does not match current {:?}", old_layout, current);
                    return Err(validation_failed("vkCmdPipelineBarrier2"));
                }
                layouts.insert(*image, *new_layout);
            }
        }
        Ok(())
    }

    /// 在两个 (memory, offset) 之间拷贝，允许重叠，范围需要事先检查过
    fn copy_memory(&self, src: Binding, dst: Binding, len: vk::DeviceSize) {
        let (Some(src_mem), Some(dst_mem)) = (self.memories.get(&src.memory), self.memories.get(&dst.memory)) else {
            return;
        };
        // SAFETY: validate 已经确认两端范围都在各自的分配之内
        unsafe {
            std::ptr::copy(src_mem.ptr.add(src.offset as usize), dst_mem.ptr.add(dst.offset as usize), len as usize);
        }
    }

    /// 执行一条通过了 [`HeadlessState::validate`] 的命令
    fn apply(&mut self, command: &Recorded) {
        match command {
            Recorded::CopyBuffer { src, dst, regions } => {
                let src_binding = self.buffers.get(src).and_then(|buf| buf.binding);
                let dst_binding = self.buffers.get(dst).and_then(|buf| buf.binding);
                let (Some(src_binding), Some(dst_binding)) = (src_binding, dst_binding) else {
                    return;
                };
                for region in regions {
                    self.copy_memory(
                        Binding {
                            memory: src_binding.memory,
                            offset: src_binding.offset + region.src_offset,
                        },
                        Binding {
                            memory: dst_binding.memory,
                            offset: dst_binding.offset + region.dst_offset,
                        },
                        region.size,
                    );
                }
                self.stats.buffer_copies += 1;
            }
            Recorded::CopyBufferToImage { src, dst, regions, .. } => {
                let src_binding = self.buffers.get(src).and_then(|buf| buf.binding);
                let dst_binding = self.images.get(dst).and_then(|img| img.binding);
                let (Some(src_binding), Some(dst_binding)) = (src_binding, dst_binding) else {
                    return;
                };
                for region in regions {
                    let len = region.image_extent.width as vk::DeviceSize
                        * region.image_extent.height as vk::DeviceSize
                        * TEXEL_SIZE;
                    self.copy_memory(
                        Binding {
                            memory: src_binding.memory,
                            offset: src_binding.offset + region.buffer_offset,
                        },
                        dst_binding,
                        len,
                    );
                }
                self.stats.image_copies += 1;
            }
            Recorded::ImageBarrier { image, new_layout, .. } => {
                if let Some(img) = self.images.get_mut(image) {
                    img.layout = *new_layout;
                }
                self.stats.barriers += 1;
            }
        }
    }

    fn record(&mut self, cmd: vk::CommandBuffer, command: Recorded) {
        match self.command_buffers.get_mut(&cmd.as_raw()) {
            Some(state) if !state.submitted => state.commands.push(command),
            _ => log::error!("recording into invalid command buffer {:?}", cmd),
        }
    }
}

impl GfxDevice for HeadlessDevice {
    #[inline]
    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> GfxResult<vk::DeviceMemory> {
        if memory_type_index >= self.memory_properties.memory_type_count {
            return Err(validation_failed("vkAllocateMemory"));
        }
        let raw = self.next_raw();
        self.state.borrow_mut().memories.insert(raw, HeadlessMemory::new(size as usize, memory_type_index));
        Ok(vk::DeviceMemory::from_raw(raw))
    }

    fn map_memory(&self, memory: vk::DeviceMemory) -> GfxResult<*mut u8> {
        let state = self.state.borrow();
        let mem = state.memories.get(&memory.as_raw()).ok_or(validation_failed("vkMapMemory"))?;
        let flags = self.memory_properties.memory_types[mem.memory_type_index as usize].property_flags;
        if !flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(GfxError::Vulkan {
                call: "vkMapMemory",
                result: vk::Result::ERROR_MEMORY_MAP_FAILED,
            });
        }
        Ok(mem.ptr)
    }

    fn unmap_memory(&self, _memory: vk::DeviceMemory) {}

    fn free_memory(&self, memory: vk::DeviceMemory) {
        if let Some(mem) = self.state.borrow_mut().memories.remove(&memory.as_raw()) {
            mem.release();
        }
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
    ) -> GfxResult<(vk::Buffer, vk::MemoryRequirements)> {
        if size == 0 {
            return Err(validation_failed("vkCreateBuffer"));
        }
        let raw = self.next_raw();
        self.state.borrow_mut().buffers.insert(raw, HeadlessBuffer { size, binding: None });

        let requirements = vk::MemoryRequirements {
            size: size.next_multiple_of(BUFFER_ALIGNMENT),
            alignment: BUFFER_ALIGNMENT,
            memory_type_bits: 0b11,
        };
        Ok((vk::Buffer::from_raw(raw), requirements))
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        let mem_len = state.memories.get(&memory.as_raw()).ok_or(validation_failed("vkBindBufferMemory"))?.len;
        let buf = state.buffers.get_mut(&buffer.as_raw()).ok_or(validation_failed("vkBindBufferMemory"))?;
        if buf.binding.is_some() || offset % BUFFER_ALIGNMENT != 0 || (offset + buf.size) as usize > mem_len {
            return Err(validation_failed("vkBindBufferMemory"));
        }
        buf.binding = Some(Binding {
            memory: memory.as_raw(),
            offset,
        });
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.state.borrow_mut().buffers.remove(&buffer.as_raw());
    }

    fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        _usage: vk::ImageUsageFlags,
    ) -> GfxResult<(vk::Image, vk::MemoryRequirements)> {
        let supported = [
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::R8G8B8A8_SRGB,
            vk::Format::B8G8R8A8_UNORM,
            vk::Format::B8G8R8A8_SRGB,
        ];
        if !supported.contains(&format) {
            return Err(GfxError::Vulkan {
                call: "vkCreateImage",
                result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
            });
        }
        if extent.width == 0 || extent.height == 0 {
            return Err(validation_failed("vkCreateImage"));
        }

        let image = HeadlessImage {
            extent,
            layout: vk::ImageLayout::UNDEFINED,
            binding: None,
        };
        let requirements = vk::MemoryRequirements {
            size: image.byte_size().next_multiple_of(IMAGE_ALIGNMENT),
            alignment: IMAGE_ALIGNMENT,
            memory_type_bits: 0b11,
        };
        let raw = self.next_raw();
        self.state.borrow_mut().images.insert(raw, image);
        Ok((vk::Image::from_raw(raw), requirements))
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        let mem_len = state.memories.get(&memory.as_raw()).ok_or(validation_failed("vkBindImageMemory"))?.len;
        let img = state.images.get_mut(&image.as_raw()).ok_or(validation_failed("vkBindImageMemory"))?;
        if img.binding.is_some() || offset % IMAGE_ALIGNMENT != 0 || (offset + img.byte_size()) as usize > mem_len {
            return Err(validation_failed("vkBindImageMemory"));
        }
        img.binding = Some(Binding {
            memory: memory.as_raw(),
            offset,
        });
        Ok(())
    }

    fn create_image_view(&self, image: vk::Image, _format: vk::Format) -> GfxResult<vk::ImageView> {
        let mut state = self.state.borrow_mut();
        if !state.images.contains_key(&image.as_raw()) {
            return Err(validation_failed("vkCreateImageView"));
        }
        let raw = self.next_raw();
        state.views.insert(raw, image.as_raw());
        Ok(vk::ImageView::from_raw(raw))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.borrow_mut().views.remove(&view.as_raw());
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state.borrow_mut().images.remove(&image.as_raw());
    }

    fn begin_one_shot(&self) -> GfxResult<vk::CommandBuffer> {
        let raw = self.next_raw();
        self.state.borrow_mut().command_buffers.insert(raw, CommandState::default());
        Ok(vk::CommandBuffer::from_raw(raw))
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        self.state.borrow_mut().command_buffers.remove(&cmd.as_raw());
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.state.borrow_mut().record(
            cmd,
            Recorded::CopyBuffer {
                src: src.as_raw(),
                dst: dst.as_raw(),
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.state.borrow_mut().record(
            cmd,
            Recorded::CopyBufferToImage {
                src: src.as_raw(),
                dst: dst.as_raw(),
                dst_layout,
                regions: regions.to_vec(),
            },
        );
    }

    fn cmd_image_barriers(&self, cmd: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let mut state = self.state.borrow_mut();
        for barrier in barriers {
            state.record(
                cmd,
                Recorded::ImageBarrier {
                    image: barrier.image.as_raw(),
                    old_layout: barrier.old_layout,
                    new_layout: barrier.new_layout,
                },
            );
        }
    }

    fn submit(&self, submit_info: &GfxSubmitInfo, fence: vk::Fence) -> GfxResult<()> {
        if self.fail_next_submit.replace(false) {
            return Err(GfxError::Vulkan {
                call: "vkQueueSubmit2",
                result: vk::Result::ERROR_DEVICE_LOST,
            });
        }

        let mut state = self.state.borrow_mut();

        // 先检查，全部通过之后再执行
        if fence != vk::Fence::null() && state.fences.get(&fence.as_raw()) != Some(&false) {
            log::error!("submit with unknown or signaled fence {:?}", fence);
            return Err(validation_failed("vkQueueSubmit2"));
        }
        for wait in submit_info.wait_infos() {
            if state.semaphores.get(&wait.semaphore.as_raw()) != Some(&true) {
                log::error!("submit waits on semaphore {:?} that has no pending signal", wait.semaphore);
                return Err(validation_failed("vkQueueSubmit2"));
            }
        }
        let cmds = submit_info.command_buffers().map(|cmd| cmd.as_raw()).collect::<Vec<_>>();
        if !cmds.iter().all_unique() {
            return Err(validation_failed("vkQueueSubmit2"));
        }
        let mut layouts = HashMap::new();
        for cmd in &cmds {
            match state.command_buffers.get(cmd) {
                Some(cmd_state) if !cmd_state.submitted => {
                    for command in &cmd_state.commands {
                        state.validate(command, &mut layouts)?;
                    }
                }
                _ => return Err(validation_failed("vkQueueSubmit2")),
            }
        }

        for wait in submit_info.wait_infos() {
            state.semaphores.insert(wait.semaphore.as_raw(), false);
        }
        for cmd in &cmds {
            let commands = state
                .command_buffers
                .get_mut(cmd)
                .map(|cmd_state| {
                    cmd_state.submitted = true;
                    std::mem::take(&mut cmd_state.commands)
                })
                .unwrap_or_default();
            for command in &commands {
                state.apply(command);
            }
        }
        for signal in submit_info.signal_infos() {
            state.semaphores.insert(signal.semaphore.as_raw(), true);
        }
        if fence != vk::Fence::null() {
            state.fences.insert(fence.as_raw(), true);
        }
        state.stats.submits += 1;
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> GfxResult<vk::Fence> {
        let raw = self.next_raw();
        self.state.borrow_mut().fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn wait_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        let signaled = state.fences.get(&fence.as_raw()).copied();
        match signaled {
            Some(true) => {
                state.stats.fence_waits += 1;
                Ok(())
            }
            // 没有 GPU 在执行，永远等不到 signal
            Some(false) => Err(GfxError::Vulkan {
                call: "vkWaitForFences",
                result: vk::Result::TIMEOUT,
            }),
            None => Err(validation_failed("vkWaitForFences")),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        let signaled = state.fences.get_mut(&fence.as_raw()).ok_or(validation_failed("vkResetFences"))?;
        *signaled = false;
        Ok(())
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state.borrow_mut().fences.remove(&fence.as_raw());
    }

    fn create_semaphore(&self) -> GfxResult<vk::Semaphore> {
        let raw = self.next_raw();
        self.state.borrow_mut().semaphores.insert(raw, false);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.borrow_mut().semaphores.remove(&semaphore.as_raw());
    }
}
