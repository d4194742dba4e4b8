use std::rc::Rc;

use ash::vk;

use crate::{
    commands::{
        barrier::GfxImageBarrier, command_list::CommandList, fence::GfxFence, semaphore::GfxSemaphore,
        submit_info::GfxSubmitInfo,
    },
    error::{GfxError, GfxResult},
    foundation::device::GfxDevice,
    memory::arena::MemoryArena,
    resources::{buffer::BufferHandle, image::ImageHandle},
};

/// 上传完成的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// 提交后阻塞等待 fence
    #[default]
    Synchronous,
    /// 提交时 signal 一个 semaphore，由下一次 draw 提交等待
    Pipelined,
}

/// 一次上传提交之后的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCompletion {
    /// 数据已经在 GPU 上可用
    Complete,
    /// 下一次 draw 提交需要在 `wait_stage` 等待 `semaphore`
    Pending {
        semaphore: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags2,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    pub buffer_uploads: u32,
    pub image_uploads: u32,
    pub fence_waits: u32,
    pub pipelined_submits: u32,
}

/// storage buffer 在顶点和片元着色器中都会被读取
const BUFFER_WAIT_STAGE: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::VERTEX_SHADER.as_raw() | vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw(),
);
const IMAGE_WAIT_STAGE: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::FRAGMENT_SHADER;

/// 负责把 staging 中的数据拷贝到 GPU 资源
///
/// 同步模式下复用同一个 fence；异步模式下每次提交创建一个 semaphore，
/// 对应的 command buffer 和 semaphore 一直保留到 [`ResourceUploader::reclaim`]。
pub struct ResourceUploader {
    device: Rc<dyn GfxDevice>,
    fence: GfxFence,

    /// 已经提交、还可能在执行的上传
    parked: Vec<(CommandList, GfxSemaphore)>,

    stats: UploadStats,
}

// new & init
impl ResourceUploader {
    pub fn new(device: &Rc<dyn GfxDevice>) -> GfxResult<Self> {
        Ok(Self {
            device: device.clone(),
            fence: GfxFence::new(device, false)?,
            parked: vec![],
            stats: UploadStats::default(),
        })
    }
}

// destroy
impl ResourceUploader {
    pub fn destroy(mut self) {
        let parked = self.reclaim();
        self.fence.destroy();
        log::info!("ResourceUploader destroyed, {} parked uploads released.", parked);
    }
}

// getter
impl ResourceUploader {
    #[inline]
    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    /// 以 Pipelined 方式提交、还没有 reclaim 的上传数量
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.parked.len()
    }
}

// tools
impl ResourceUploader {
    #[inline]
    pub fn begin_one_shot(&self, name: impl AsRef<str>) -> GfxResult<CommandList> {
        CommandList::begin(&self.device, name)
    }

    /// 提交 `cmd` 并按 `mode` 处理完成
    ///
    /// 无论成功与否，`cmd` 的所有权都由 uploader 接管
    pub fn submit_and_end(
        &mut self,
        cmd: CommandList,
        mode: UploadMode,
        wait_stage: vk::PipelineStageFlags2,
    ) -> GfxResult<UploadCompletion> {
        match mode {
            UploadMode::Synchronous => {
                let submit_info = GfxSubmitInfo::new(std::slice::from_ref(&cmd));
                let result = self
                    .device
                    .submit(&submit_info, self.fence.handle())
                    .and_then(|_| self.fence.wait())
                    .and_then(|_| self.fence.reset());
                log::debug!("synchronous upload `{}` finished: {}", cmd.name(), result.is_ok());
                cmd.free();
                result?;

                self.stats.fence_waits += 1;
                Ok(UploadCompletion::Complete)
            }
            UploadMode::Pipelined => {
                let semaphore = match GfxSemaphore::new(&self.device) {
                    Ok(semaphore) => semaphore,
                    Err(err) => {
                        cmd.free();
                        return Err(err);
                    }
                };
                let submit_info = GfxSubmitInfo::new(std::slice::from_ref(&cmd)).signal(
                    semaphore.handle(),
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    None,
                );
                if let Err(err) = self.device.submit(&submit_info, vk::Fence::null()) {
                    cmd.free();
                    semaphore.destroy();
                    return Err(err);
                }

                let completion = UploadCompletion::Pending {
                    semaphore: semaphore.handle(),
                    wait_stage,
                };
                log::debug!("pipelined upload `{}` submitted, signal {:?}", cmd.name(), semaphore.handle());
                self.parked.push((cmd, semaphore));
                self.stats.pipelined_submits += 1;
                Ok(completion)
            }
        }
    }

    /// 将 staging 的前 `byte_count` 字节拷贝到 `dst` 起始处
    ///
    /// staging 中的数据需要调用者事先写好
    pub fn upload_buffer(
        &mut self,
        staging: &BufferHandle,
        dst: &BufferHandle,
        byte_count: vk::DeviceSize,
        mode: UploadMode,
    ) -> GfxResult<UploadCompletion> {
        let cmd = self.begin_one_shot("upload-buffer")?;
        if let Err(err) = staging.copy_to(dst, 0, byte_count, &cmd) {
            cmd.free();
            return Err(err);
        }
        let completion = self.submit_and_end(cmd, mode, BUFFER_WAIT_STAGE)?;

        self.stats.buffer_uploads += 1;
        log::debug!("uploaded {} bytes into buffer {:?}", byte_count, dst.vk_buffer());
        Ok(completion)
    }

    /// 将 RGBA8 像素写入 staging，再拷贝到 image，最终 image 处于 SHADER_READ_ONLY_OPTIMAL
    ///
    /// image 需要处于 UNDEFINED（新创建的 image）
    pub fn upload_image(
        &mut self,
        arena: &mut MemoryArena,
        pixels: &[u8],
        staging: &BufferHandle,
        image: &mut ImageHandle,
        mode: UploadMode,
    ) -> GfxResult<UploadCompletion> {
        if pixels.len() as vk::DeviceSize != image.byte_size() {
            return Err(GfxError::CopyOutOfRange {
                byte_count: pixels.len() as vk::DeviceSize,
                dst_offset: 0,
                src_size: pixels.len() as vk::DeviceSize,
                dst_size: image.byte_size(),
            });
        }
        staging.store(arena, 0, pixels)?;

        let old_layout = image.layout();
        let cmd = self.begin_one_shot("upload-image")?;
        if let Err(err) = self.record_image_copy(staging, image, &cmd) {
            image.set_layout(old_layout);
            cmd.free();
            return Err(err);
        }

        let completion = match self.submit_and_end(cmd, mode, IMAGE_WAIT_STAGE) {
            Ok(completion) => completion,
            Err(err) => {
                image.set_layout(old_layout);
                return Err(err);
            }
        };

        self.stats.image_uploads += 1;
        log::debug!(
            "uploaded {}x{} texture into image {:?}",
            image.extent().width,
            image.extent().height,
            image.vk_image()
        );
        Ok(completion)
    }

    fn record_image_copy(&self, staging: &BufferHandle, image: &mut ImageHandle, cmd: &CommandList) -> GfxResult<()> {
        self.transition_layout(image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, cmd)?;
        staging.copy_into(image, cmd)?;
        self.transition_layout(image, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, cmd)
    }

    /// 录制从 image 当前 layout 到 `new_layout` 的 barrier
    ///
    /// 不在转换表中的组合返回 [`GfxError::UnsupportedLayoutTransition`]，不会录制任何命令
    pub fn transition_layout(
        &self,
        image: &mut ImageHandle,
        new_layout: vk::ImageLayout,
        cmd: &CommandList,
    ) -> GfxResult<()> {
        let barrier = GfxImageBarrier::layout_transition(image.vk_image(), image.layout(), new_layout)?;
        cmd.image_memory_barrier(&[barrier]);
        image.set_layout(new_layout);
        Ok(())
    }

    /// 释放所有以 Pipelined 方式提交的 command buffer 和 semaphore
    ///
    /// 只能在确认对应的帧已经执行完之后调用，返回释放的数量
    pub fn reclaim(&mut self) -> usize {
        let count = self.parked.len();
        for (cmd, semaphore) in self.parked.drain(..) {
            cmd.free();
            semaphore.destroy();
        }
        if count > 0 {
            log::debug!("reclaimed {} pipelined uploads", count);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::headless_device::HeadlessDevice,
        memory::arena::{PoolId, UsageClass},
    };

    struct Fixture {
        device: Rc<HeadlessDevice>,
        arena: MemoryArena,
        uploader: ResourceUploader,
        host: PoolId,
        local: PoolId,
    }

    fn fixture() -> Fixture {
        orrery_crate_tools::init_log::init_log();
        let device = Rc::new(HeadlessDevice::new());
        let dyn_device: Rc<dyn GfxDevice> = device.clone();
        let mut arena = MemoryArena::new(dyn_device.clone());
        let host = arena
            .create_pool(
                UsageClass::Texture,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                1 << 16,
            )
            .unwrap();
        let local = arena.create_pool(UsageClass::Texture, vk::MemoryPropertyFlags::DEVICE_LOCAL, 1 << 16).unwrap();
        let uploader = ResourceUploader::new(&dyn_device).unwrap();
        Fixture {
            device,
            arena,
            uploader,
            host,
            local,
        }
    }

    impl Fixture {
        fn finish(self) {
            self.uploader.destroy();
            self.arena.destroy();
            assert_eq!(self.device.live_objects(), (0, 0, 0));
            assert_eq!(self.device.live_command_buffers(), 0);
            assert_eq!(self.device.live_semaphores(), 0);
        }
    }

    #[test]
    fn test_synchronous_buffer_upload() {
        let mut f = fixture();
        let staging = f.arena.create_buffer(f.host, 64, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        let dst = f.arena.create_buffer(f.local, 64, vk::BufferUsageFlags::STORAGE_BUFFER).unwrap();

        staging.store(&mut f.arena, 0, &[9; 32]).unwrap();
        let completion = f.uploader.upload_buffer(&staging, &dst, 32, UploadMode::Synchronous).unwrap();

        assert_eq!(completion, UploadCompletion::Complete);
        assert_eq!(f.device.read_buffer(dst.vk_buffer(), 0, 32).unwrap(), vec![9; 32]);
        assert_eq!(f.device.read_buffer(dst.vk_buffer(), 32, 4).unwrap(), vec![0; 4]);
        assert_eq!(f.uploader.stats().fence_waits, 1);
        assert_eq!(f.uploader.stats().buffer_uploads, 1);
        assert_eq!(f.device.live_command_buffers(), 0);
        f.finish();
    }

    #[test]
    fn test_pipelined_upload_hands_out_semaphore() {
        let mut f = fixture();
        let staging = f.arena.create_buffer(f.host, 16, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        let dst = f.arena.create_buffer(f.local, 16, vk::BufferUsageFlags::STORAGE_BUFFER).unwrap();
        staging.store(&mut f.arena, 0, &[5; 16]).unwrap();

        let completion = f.uploader.upload_buffer(&staging, &dst, 16, UploadMode::Pipelined).unwrap();
        let UploadCompletion::Pending { semaphore, wait_stage } = completion else {
            panic!("expected a pending completion, got {completion:?}");
        };
        assert_eq!(wait_stage, BUFFER_WAIT_STAGE);
        assert_eq!(f.device.semaphore_signaled(semaphore), Some(true));
        assert_eq!(f.uploader.stats().fence_waits, 0);
        assert_eq!(f.uploader.pending_count(), 1);
        assert_eq!(f.device.live_command_buffers(), 1);

        // 模拟下一次 draw 提交等待这个 semaphore
        let draw = GfxSubmitInfo::new(&[]).wait(semaphore, wait_stage, None);
        f.device.submit(&draw, vk::Fence::null()).unwrap();

        assert_eq!(f.uploader.reclaim(), 1);
        assert_eq!(f.device.live_command_buffers(), 0);
        f.finish();
    }

    #[test]
    fn test_image_upload_transitions_layouts() {
        let mut f = fixture();
        let staging = f.arena.create_buffer(f.host, 1024, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        let mut image = f
            .arena
            .create_image(
                f.local,
                vk::Extent2D { width: 2, height: 2 },
                vk::Format::R8G8B8A8_SRGB,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            )
            .unwrap();

        let pixels = (0u8..16).collect::<Vec<_>>();
        f.uploader.upload_image(&mut f.arena, &pixels, &staging, &mut image, UploadMode::Synchronous).unwrap();

        assert_eq!(image.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(f.device.image_layout(image.vk_image()), Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        assert_eq!(f.device.read_image(image.vk_image()).unwrap(), pixels);
        assert_eq!(f.device.stats().barriers, 2);
        assert_eq!(f.uploader.stats().image_uploads, 1);

        // 已经是 SHADER_READ_ONLY，不能再走上传流程
        let err = f.uploader.upload_image(&mut f.arena, &pixels, &staging, &mut image, UploadMode::Synchronous);
        assert!(matches!(err, Err(GfxError::UnsupportedLayoutTransition { .. })));
        assert_eq!(image.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(f.device.live_command_buffers(), 0);
        f.finish();
    }

    #[test]
    fn test_copy_into_requires_transfer_dst() {
        let mut f = fixture();
        let staging = f.arena.create_buffer(f.host, 64, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        let image = f
            .arena
            .create_image(
                f.local,
                vk::Extent2D { width: 2, height: 2 },
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::TRANSFER_DST,
            )
            .unwrap();
        let cmd = f.uploader.begin_one_shot("copy-into").unwrap();
        assert!(matches!(
            staging.copy_into(&image, &cmd),
            Err(GfxError::ImageNotWritable {
                layout: vk::ImageLayout::UNDEFINED
            })
        ));
        cmd.free();
        f.finish();
    }

    #[test]
    fn test_failed_submit_releases_command_buffer() {
        let mut f = fixture();
        let staging = f.arena.create_buffer(f.host, 16, vk::BufferUsageFlags::TRANSFER_SRC).unwrap();
        let dst = f.arena.create_buffer(f.local, 16, vk::BufferUsageFlags::STORAGE_BUFFER).unwrap();

        for mode in [UploadMode::Synchronous, UploadMode::Pipelined] {
            f.device.fail_next_submit();
            let err = f.uploader.upload_buffer(&staging, &dst, 16, mode).unwrap_err();
            assert!(err.is_fatal());
            assert_eq!(f.device.live_command_buffers(), 0);
            assert_eq!(f.device.live_semaphores(), 0);
        }
        assert_eq!(f.uploader.stats().buffer_uploads, 0);
        f.finish();
    }
}
