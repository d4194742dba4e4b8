use std::{fs, path::Path};

use anyhow::Context;
use ash::vk;
use orrery_gfx::upload::uploader::UploadMode;
use serde::{Deserialize, Serialize};

const MIB: vk::DeviceSize = 1024 * 1024;

/// 各个内存池的容量，单位为字节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSizes {
    pub metadata_host: vk::DeviceSize,
    pub metadata_local: vk::DeviceSize,
    pub geometry_host: vk::DeviceSize,
    pub geometry_local: vk::DeviceSize,
    pub texture_local: vk::DeviceSize,
    /// 纹理 staging buffer 所在的 host visible 池
    pub texture_staging: vk::DeviceSize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            metadata_host: 10 * MIB,
            metadata_local: 10 * MIB,
            geometry_host: 10 * MIB,
            geometry_local: 10 * MIB,
            texture_local: 100 * MIB,
            texture_staging: 50 * MIB,
        }
    }
}

/// 各个 buffer 的大小，单位为字节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSizes {
    /// geometry buffer 及其 staging
    pub geometry: vk::DeviceSize,
    /// draw-info buffer 及其 staging
    pub draw_info: vk::DeviceSize,
    pub material: vk::DeviceSize,
    pub texture_staging: vk::DeviceSize,
}

impl Default for BufferSizes {
    fn default() -> Self {
        Self {
            geometry: MIB,
            draw_info: MIB,
            material: 1024,
            texture_staging: 10 * MIB,
        }
    }
}

/// 场景同步的配置，对应 TOML 文件
///
/// ```toml
/// upload_mode = "pipelined"
///
/// [pools]
/// texture_local = 209715200
///
/// [buffers]
/// geometry = 4194304
/// ```
///
/// 没有写出的字段使用默认值
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub upload_mode: UploadMode,
    pub pools: PoolSizes,
    pub buffers: BufferSizes,
}

impl StreamConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("解析 stream 配置失败")
    }

    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        toml::from_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path.as_ref()))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path.as_ref(), content).with_context(|| format!("写入配置文件失败: {:?}", path.as_ref()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.upload_mode, UploadMode::Synchronous);
        assert_eq!(config.pools.metadata_host, 10 * MIB);
        assert_eq!(config.pools.texture_local, 100 * MIB);
        assert_eq!(config.pools.texture_staging, 50 * MIB);
        assert_eq!(config.buffers.geometry, MIB);
        assert_eq!(config.buffers.material, 1024);
        assert_eq!(config.buffers.texture_staging, 10 * MIB);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = StreamConfig::from_toml_str(
            r#"
            upload_mode = "pipelined"

            [buffers]
            geometry = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.upload_mode, UploadMode::Pipelined);
        assert_eq!(config.buffers.geometry, 4096);
        assert_eq!(config.buffers.draw_info, MIB);
        assert_eq!(config.pools, PoolSizes::default());
    }

    #[test]
    fn test_bad_mode_rejected() {
        assert!(StreamConfig::from_toml_str("upload_mode = \"eventually\"").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("orrery-stream-{}.toml", std::process::id()));
        let config = StreamConfig {
            upload_mode: UploadMode::Pipelined,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(StreamConfig::from_file(&path).unwrap(), config);
        fs::remove_file(&path).unwrap();

        assert!(StreamConfig::from_file(&path).is_err());
    }
}
