use glam::Vec3;

use crate::gpu_types::CameraUniform;

/// right = (0, 1, 0) x forward，up = forward x right
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    /// 静止时累计的帧数，相机移动后归零
    pub frame_count: u32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            frame_count: 0,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, forward: Vec3) -> Self {
        Self {
            position,
            forward,
            frame_count: 0,
        }
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        Vec3::Y.cross(self.forward)
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.forward.cross(self.right())
    }

    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform {
            position: self.position,
            forward: self.forward,
            right: self.right(),
            up: self.up(),
            frame_count: self.frame_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_basis() {
        let camera = Camera::new(Vec3::new(0.0, 1.0, 5.0), Vec3::NEG_Z);
        assert_eq!(camera.right(), Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(camera.up(), Vec3::Y);

        let uniform = camera.to_uniform();
        assert_eq!(uniform.position, camera.position);
        assert_eq!(uniform.frame_count, 0);
    }
}
