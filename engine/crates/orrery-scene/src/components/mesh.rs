use std::borrow::Cow;

use crate::{
    components::vertex::Vertex,
    error::{SceneError, SceneResult},
};

/// CPU 侧的 mesh
///
/// 上传到 GPU 的是展开后的顶点序列：有 index 时按 index 依次取顶点。
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Option<Vec<u32>>,
}

// new & init
impl Mesh {
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self {
            vertices,
            indices: None,
        }
    }

    /// index 越界时返回 [`SceneError::InvalidMeshIndex`]
    pub fn indexed(vertices: Vec<Vertex>, indices: Vec<u32>) -> SceneResult<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(SceneError::InvalidMeshIndex {
                index,
                vertex_count: vertices.len(),
            });
        }
        Ok(Self {
            vertices,
            indices: Some(indices),
        })
    }
}

// getter
impl Mesh {
    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// 展开后的顶点数量
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.indices.as_ref().map_or(self.vertices.len(), Vec::len)
    }

    pub fn flat_vertices(&self) -> Cow<'_, [Vertex]> {
        match &self.indices {
            None => Cow::Borrowed(&self.vertices),
            Some(indices) => Cow::Owned(indices.iter().map(|&i| self.vertices[i as usize]).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::*;

    fn quad_corners() -> Vec<Vertex> {
        [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .into_iter()
            .map(|(x, y)| Vertex::new(Vec3::new(x, y, 0.0), Vec2::new(x, y)))
            .collect()
    }

    #[test]
    fn test_indexed_mesh_flattens() {
        let mesh = Mesh::indexed(quad_corners(), vec![0, 1, 2, 2, 3, 0]).unwrap();
        assert_eq!(mesh.vertex_count(), 6);

        let flat = mesh.flat_vertices();
        assert_eq!(flat.len(), 6);
        assert_eq!(flat[3], mesh.vertices()[2]);
        assert_eq!(flat[5], mesh.vertices()[0]);
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let err = Mesh::indexed(quad_corners(), vec![0, 1, 4]).unwrap_err();
        assert!(matches!(
            err,
            SceneError::InvalidMeshIndex {
                index: 4,
                vertex_count: 4
            }
        ));
    }

    #[test]
    fn test_plain_mesh_borrows() {
        let mesh = Mesh::new(quad_corners());
        assert_eq!(mesh.vertex_count(), 4);
        assert!(matches!(mesh.flat_vertices(), Cow::Borrowed(_)));
    }
}
