use orrery_gfx::GfxError;

use crate::handles::{MaterialHandle, MeshHandle, ObjectHandle};

pub type SceneResult<T> = Result<T, SceneError>;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error(transparent)]
    Gfx(#[from] GfxError),

    #[error("unknown mesh {0:?}")]
    UnknownMesh(MeshHandle),

    #[error("unknown material {0:?}")]
    UnknownMaterial(MaterialHandle),

    #[error("unknown object {0:?}")]
    UnknownObject(ObjectHandle),

    #[error("material {material:?} is still referenced by {objects} objects")]
    MaterialInUse { material: MaterialHandle, objects: usize },

    #[error("mesh {mesh:?} is still referenced by {objects} objects")]
    MeshInUse { mesh: MeshHandle, objects: usize },

    #[error("vertex index {index} out of range, mesh has {vertex_count} vertices")]
    InvalidMeshIndex { index: u32, vertex_count: usize },

    #[error("texture {width}x{height} expects width * height * 4 bytes of RGBA8, got {len}")]
    InvalidTextureData { width: u32, height: u32, len: usize },

    #[error("texture of {len} bytes does not fit the {staging} byte texture staging buffer")]
    TextureTooLarge { len: usize, staging: u64 },
}

impl SceneError {
    /// 底层的 GPU 错误是否无法恢复
    pub fn is_fatal(&self) -> bool {
        match self {
            SceneError::Gfx(err) => err.is_fatal(),
            _ => false,
        }
    }
}
