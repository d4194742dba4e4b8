use std::rc::Rc;

use orrery_gfx::{
    GfxResult,
    commands::{fence::GfxFence, submit_info::GfxSubmitInfo},
    foundation::device::GfxDevice,
};
use orrery_scene::{
    SceneResult,
    config::StreamConfig,
    scene::Scene,
    scene_sync::{DrawWait, SceneSyncTracker, SyncReport},
};

/// 一帧的结果
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameSummary {
    /// 同步失败但可以重试时为 `None`
    pub report: Option<SyncReport>,
    pub camera_updated: bool,
    pub draw_waits: usize,
    pub reclaimed: usize,
}

/// 模拟外部渲染器的帧循环：同步场景，提交一次等待上传完成的 draw，再回收上传资源
pub struct FrameLoop {
    device: Rc<dyn GfxDevice>,
    tracker: SceneSyncTracker,
    frame_fence: GfxFence,
}

impl FrameLoop {
    pub fn new(device: &Rc<dyn GfxDevice>, config: &StreamConfig) -> SceneResult<Self> {
        let tracker = SceneSyncTracker::new(device, config)?;
        let frame_fence = match GfxFence::new(device, false) {
            Ok(fence) => fence,
            Err(err) => {
                tracker.destroy();
                return Err(err.into());
            }
        };
        Ok(Self {
            device: device.clone(),
            tracker,
            frame_fence,
        })
    }

    #[inline]
    pub fn tracker(&self) -> &SceneSyncTracker {
        &self.tracker
    }

    pub fn destroy(self) {
        self.frame_fence.destroy();
        self.tracker.destroy();
    }

    /// 无法恢复的错误直接返回，其余错误留给下一帧重试
    pub fn run_frame(&mut self, scene: &mut Scene) -> SceneResult<FrameSummary> {
        let report = match self.tracker.sync_update(scene) {
            Ok(report) => Some(report),
            Err(err) if !err.is_fatal() => {
                log::warn!("scene sync will be retried next frame: {}", err);
                None
            }
            Err(err) => return Err(err),
        };
        let camera_updated = self.tracker.sync_camera(scene)?;

        let waits = self.tracker.take_draw_waits();
        self.submit_draw(&waits)?;
        let reclaimed = self.tracker.reclaim();
        scene.advance_frame();

        Ok(FrameSummary {
            report,
            camera_updated,
            draw_waits: waits.len(),
            reclaimed,
        })
    }

    /// draw 命令由外部渲染器录制，这里只提交等待与 fence
    fn submit_draw(&self, waits: &[DrawWait]) -> GfxResult<()> {
        let submit_info = waits
            .iter()
            .fold(GfxSubmitInfo::default(), |info, wait| info.wait(wait.semaphore, wait.stage, None));
        self.device.submit(&submit_info, self.frame_fence.handle())?;
        self.frame_fence.wait()?;
        self.frame_fence.reset()
    }
}
