use ash::vk;
use itertools::Itertools;

use crate::commands::command_list::CommandList;

/// 对 `vk::SubmitInfo2` 的封装
///
/// 内部持有 command buffer / semaphore 的数组，调用 [`GfxSubmitInfo::submit_info`] 时再组装，
/// 避免悬垂指针。
#[derive(Default, Clone)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBufferSubmitInfo<'static>>,
    wait_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signal_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

// new & init
impl GfxSubmitInfo {
    pub fn new(commands: &[CommandList]) -> Self {
        Self::with_command_buffers(&commands.iter().map(|cmd| cmd.vk_handle()).collect_vec())
    }

    pub fn with_command_buffers(commands: &[vk::CommandBuffer]) -> Self {
        let command_buffers = commands
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
            .collect_vec();

        Self {
            command_buffers,
            wait_infos: vec![],
            signal_infos: vec![],
        }
    }

    /// builder
    #[inline]
    pub fn wait(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.wait_infos.push(
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(stage)
                .value(value.unwrap_or_default()),
        );
        self
    }

    /// builder
    #[inline]
    pub fn signal(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.signal_infos.push(
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(stage)
                .value(value.unwrap_or_default()),
        );
        self
    }
}

// getter
impl GfxSubmitInfo {
    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo2<'_> {
        vk::SubmitInfo2::default()
            .command_buffer_infos(&self.command_buffers)
            .wait_semaphore_infos(&self.wait_infos)
            .signal_semaphore_infos(&self.signal_infos)
    }

    #[inline]
    pub fn command_buffers(&self) -> impl Iterator<Item = vk::CommandBuffer> + '_ {
        self.command_buffers.iter().map(|info| info.command_buffer)
    }

    #[inline]
    pub fn wait_infos(&self) -> &[vk::SemaphoreSubmitInfo<'static>] {
        &self.wait_infos
    }

    #[inline]
    pub fn signal_infos(&self) -> &[vk::SemaphoreSubmitInfo<'static>] {
        &self.signal_infos
    }
}
