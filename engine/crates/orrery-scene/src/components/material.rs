use crate::error::{SceneError, SceneResult};

/// RGBA8 纹理数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    /// `pixels` 的长度必须等于 `width * height * 4`
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> SceneResult<Self> {
        if width == 0 || height == 0 || pixels.len() != width as usize * height as usize * 4 {
            return Err(SceneError::InvalidTextureData {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// 纯色纹理
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> SceneResult<Self> {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self::new(width, height, pixels)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// 材质
#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    /// 带纹理的漫反射
    Lambertian { texture: TextureData },
    /// 透明折射
    Dielectric { refractive_index: f32 },
}

impl Material {
    pub const KIND_DIELECTRIC: u32 = 0;
    pub const KIND_LAMBERTIAN: u32 = 1;

    /// shader 中用来区分材质类型的值
    #[inline]
    pub fn kind(&self) -> u32 {
        match self {
            Material::Lambertian { .. } => Self::KIND_LAMBERTIAN,
            Material::Dielectric { .. } => Self::KIND_DIELECTRIC,
        }
    }

    #[inline]
    pub fn texture(&self) -> Option<&TextureData> {
        match self {
            Material::Lambertian { texture } => Some(texture),
            Material::Dielectric { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_size_checked() {
        assert!(TextureData::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureData::new(2, 2, vec![0; 15]),
            Err(SceneError::InvalidTextureData { len: 15, .. })
        ));
        assert!(TextureData::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_solid_texture() {
        let texture = TextureData::solid(3, 1, [1, 2, 3, 4]).unwrap();
        assert_eq!(texture.pixels(), &[1, 2, 3, 4, 1, 2, 3, 4, 1, 2, 3, 4]);
    }
}
