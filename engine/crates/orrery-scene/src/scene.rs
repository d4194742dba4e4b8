use bitflags::bitflags;
use glam::Mat4;
use slotmap::SlotMap;

use crate::{
    components::{camera::Camera, material::Material, mesh::Mesh},
    error::{SceneError, SceneResult},
    handles::{MaterialHandle, MeshHandle, ObjectHandle},
};

bitflags! {
    /// 对象需要重新上传的部分
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u8 {
        /// mesh 引用或 mesh 数据变化，需要重建 geometry buffer
        const MESH = 1;
        const MATERIAL = 1 << 1;
        /// 只需要重建 draw-info buffer
        const TRANSFORM = 1 << 2;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    mesh: MeshHandle,
    material: MaterialHandle,
    transform: Mat4,
    dirty: DirtyFlags,
}

impl SceneObject {
    #[inline]
    pub fn mesh(&self) -> MeshHandle {
        self.mesh
    }

    #[inline]
    pub fn material(&self) -> MaterialHandle {
        self.material
    }

    #[inline]
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    #[inline]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }
}

/// 在 CPU 侧管理场景数据，并记录哪些部分需要同步到 GPU
#[derive(Default)]
pub struct Scene {
    meshes: SlotMap<MeshHandle, Mesh>,
    materials: SlotMap<MaterialHandle, Material>,
    objects: SlotMap<ObjectHandle, SceneObject>,

    camera: Camera,
    camera_dirty: bool,

    /// 有对象被移除，两个 buffer 都要重建
    structure_dirty: bool,
}

// new & init
impl Scene {
    pub fn new(camera: Camera) -> Self {
        Self {
            meshes: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            objects: SlotMap::with_key(),
            camera,
            camera_dirty: true,
            structure_dirty: false,
        }
    }
}

// getter
impl Scene {
    #[inline]
    pub fn mesh(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle)
    }

    #[inline]
    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle)
    }

    #[inline]
    pub fn object(&self, handle: ObjectHandle) -> Option<&SceneObject> {
        self.objects.get(handle)
    }

    #[inline]
    pub fn objects(&self) -> impl Iterator<Item = (ObjectHandle, &SceneObject)> {
        self.objects.iter()
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_dirty(&self) -> bool {
        self.camera_dirty
    }

    #[inline]
    pub fn structure_dirty(&self) -> bool {
        self.structure_dirty
    }

    /// 是否有对象带有 `flags` 中的任意一个
    pub fn any_dirty(&self, flags: DirtyFlags) -> bool {
        self.objects.values().any(|object| object.dirty.intersects(flags))
    }

    fn objects_using_mesh(&self, mesh: MeshHandle) -> usize {
        self.objects.values().filter(|object| object.mesh == mesh).count()
    }

    fn objects_using_material(&self, material: MaterialHandle) -> usize {
        self.objects.values().filter(|object| object.material == material).count()
    }
}

// tools
impl Scene {
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshHandle {
        self.meshes.insert(mesh)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialHandle {
        self.materials.insert(material)
    }

    pub fn add_object(
        &mut self,
        mesh: MeshHandle,
        material: MaterialHandle,
        transform: Mat4,
    ) -> SceneResult<ObjectHandle> {
        self.check_mesh(mesh)?;
        self.check_material(material)?;
        Ok(self.objects.insert(SceneObject {
            mesh,
            material,
            transform,
            dirty: DirtyFlags::MESH | DirtyFlags::MATERIAL,
        }))
    }

    pub fn set_mesh(&mut self, object: ObjectHandle, mesh: MeshHandle) -> SceneResult<()> {
        self.check_mesh(mesh)?;
        let record = self.object_mut(object)?;
        record.mesh = mesh;
        record.dirty |= DirtyFlags::MESH;
        Ok(())
    }

    pub fn set_material(&mut self, object: ObjectHandle, material: MaterialHandle) -> SceneResult<()> {
        self.check_material(material)?;
        let record = self.object_mut(object)?;
        record.material = material;
        record.dirty |= DirtyFlags::MATERIAL;
        Ok(())
    }

    pub fn set_transform(&mut self, object: ObjectHandle, transform: Mat4) -> SceneResult<()> {
        let record = self.object_mut(object)?;
        record.transform = transform;
        record.dirty |= DirtyFlags::TRANSFORM;
        Ok(())
    }

    /// 替换 mesh 的数据，所有引用它的对象都会被标记为 MESH
    pub fn update_mesh(&mut self, handle: MeshHandle, mesh: Mesh) -> SceneResult<()> {
        let slot = self.meshes.get_mut(handle).ok_or(SceneError::UnknownMesh(handle))?;
        *slot = mesh;
        self.objects
            .values_mut()
            .filter(|object| object.mesh == handle)
            .for_each(|object| object.dirty |= DirtyFlags::MESH);
        Ok(())
    }

    pub fn remove_object(&mut self, object: ObjectHandle) -> SceneResult<SceneObject> {
        let record = self.objects.remove(object).ok_or(SceneError::UnknownObject(object))?;
        self.structure_dirty = true;
        Ok(record)
    }

    /// 仍有对象引用时返回 [`SceneError::MaterialInUse`]
    pub fn remove_material(&mut self, material: MaterialHandle) -> SceneResult<Material> {
        self.check_material(material)?;
        let objects = self.objects_using_material(material);
        if objects > 0 {
            return Err(SceneError::MaterialInUse { material, objects });
        }
        self.materials.remove(material).ok_or(SceneError::UnknownMaterial(material))
    }

    /// 仍有对象引用时返回 [`SceneError::MeshInUse`]
    pub fn remove_mesh(&mut self, mesh: MeshHandle) -> SceneResult<Mesh> {
        self.check_mesh(mesh)?;
        let objects = self.objects_using_mesh(mesh);
        if objects > 0 {
            return Err(SceneError::MeshInUse { mesh, objects });
        }
        self.meshes.remove(mesh).ok_or(SceneError::UnknownMesh(mesh))
    }

    /// 相机移动后累计帧数归零
    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = Camera {
            frame_count: 0,
            ..camera
        };
        self.camera_dirty = true;
    }

    pub fn advance_frame(&mut self) {
        self.camera.frame_count += 1;
        self.camera_dirty = true;
    }

    /// 清除所有对象的 dirty 标记以及结构变化标记
    pub fn clear_dirty(&mut self) {
        self.objects.values_mut().for_each(|object| object.dirty = DirtyFlags::empty());
        self.structure_dirty = false;
    }

    pub(crate) fn clear_camera_dirty(&mut self) {
        self.camera_dirty = false;
    }

    fn object_mut(&mut self, object: ObjectHandle) -> SceneResult<&mut SceneObject> {
        self.objects.get_mut(object).ok_or(SceneError::UnknownObject(object))
    }

    fn check_mesh(&self, mesh: MeshHandle) -> SceneResult<()> {
        if self.meshes.contains_key(mesh) { Ok(()) } else { Err(SceneError::UnknownMesh(mesh)) }
    }

    fn check_material(&self, material: MaterialHandle) -> SceneResult<()> {
        if self.materials.contains_key(material) { Ok(()) } else { Err(SceneError::UnknownMaterial(material)) }
    }
}
