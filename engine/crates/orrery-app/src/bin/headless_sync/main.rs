//! 在 headless 设备上运行若干帧场景同步
//!
//! 用法：`headless_sync [config.toml] [frames]`

use std::rc::Rc;

use anyhow::Context;
use orrery_app::{demo_scene::DemoScene, frame_loop::FrameLoop};
use orrery_gfx::foundation::{device::GfxDevice, headless_device::HeadlessDevice};
use orrery_scene::config::StreamConfig;

fn main() -> anyhow::Result<()> {
    orrery_crate_tools::init_log::init_log();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => StreamConfig::from_file(&path)?,
        None => StreamConfig::default(),
    };
    let frames = match args.next() {
        Some(frames) => frames.parse::<u32>().with_context(|| format!("帧数无效: {frames}"))?,
        None => 8,
    };
    log::info!("headless sync: {} frames, {:?}", frames, config);

    let device = Rc::new(HeadlessDevice::new());
    let dyn_device: Rc<dyn GfxDevice> = device.clone();
    let mut demo = DemoScene::build(6)?;
    let mut frame_loop = FrameLoop::new(&dyn_device, &config)?;

    let result = (0..frames).try_for_each(|frame| -> anyhow::Result<()> {
        demo.animate(frame)?;
        let summary = frame_loop.run_frame(&mut demo.scene)?;
        log::info!("frame {}: {:?}", frame, summary);
        Ok(())
    });

    log::info!("upload stats: {:?}", frame_loop.tracker().upload_stats());
    log::info!("device stats: {:?}", device.stats());
    frame_loop.destroy();
    result
}
