pub mod device;
pub mod headless_device;
pub mod vulkan_device;
