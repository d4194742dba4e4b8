//! Orrery GFX 层
//!
//! 提供场景数据上传所需的 GPU 资源抽象：
//! - [`foundation::device::GfxDevice`]：与外部渲染器之间的设备接口，带 Vulkan 与 headless 两种实现
//! - [`memory::arena::MemoryArena`]：固定大小内存池上的 bump 分配
//! - [`resources`]：buffer / image 句柄，支持 mem map 写入与拷贝命令录制
//! - [`upload::uploader::ResourceUploader`]：同步（fence）与异步（semaphore）两种上传方式

pub mod commands;
pub mod error;
pub mod foundation;
pub mod memory;
pub mod resources;
pub mod upload;

pub use error::{GfxError, GfxResult};
