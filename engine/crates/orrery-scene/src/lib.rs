//! Orrery 场景层
//!
//! CPU 侧的 [`scene::Scene`] 记录对象、mesh、材质和相机，以及它们的 dirty 状态；
//! [`scene_sync::SceneSyncTracker`] 根据 dirty 状态决定需要重建哪些 GPU buffer，
//! 并通过 [`orrery_gfx::upload::uploader::ResourceUploader`] 上传。

pub mod components;
pub mod config;
pub mod error;
pub mod gpu_types;
pub mod handles;
pub mod material_registry;
pub mod scene;
pub mod scene_sync;

pub use error::{SceneError, SceneResult};
