use std::{borrow::Cow, rc::Rc};

use ash::vk;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use orrery_gfx::{
    foundation::device::GfxDevice,
    memory::arena::{MemoryArena, PoolId, UsageClass},
    resources::buffer::BufferHandle,
    upload::uploader::{ResourceUploader, UploadCompletion, UploadMode, UploadStats},
};
use orrery_layout_trait::{GpuLayout, StrideMode, round_up_16};

use crate::{
    components::vertex::Vertex,
    config::StreamConfig,
    error::{SceneError, SceneResult},
    gpu_types::{CameraUniform, ObjectDrawInfo},
    handles::{MaterialHandle, MeshHandle, ObjectHandle},
    material_registry::MaterialRegistry,
    scene::{DirtyFlags, Scene},
};

/// 下一次 draw 提交需要等待的 semaphore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawWait {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

/// 一次 [`SceneSyncTracker::sync_update`] 做了什么
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub geometry_uploaded: bool,
    pub draw_infos_uploaded: bool,
    /// 本次移除的材质数量，非零时 shader 一侧的材质描述需要重新绑定
    pub removed_materials: usize,
    pub vertex_count: u32,
    pub draw_info_count: u32,
}

struct SyncPools {
    geometry_local: PoolId,
    geometry_host: PoolId,
    metadata_local: PoolId,
    metadata_host: PoolId,
    texture_local: PoolId,
    texture_host: PoolId,
}

struct SyncBuffers {
    geometry_staging: BufferHandle,
    geometry: BufferHandle,
    draw_info_staging: BufferHandle,
    draw_info: BufferHandle,
    camera: BufferHandle,
}

/// 追踪场景的变化，并把变化的部分同步到 GPU
///
/// 任何 mesh 变化都会重建整个 geometry buffer；任何材质或变换的变化都会重建整个 draw-info buffer。
pub struct SceneSyncTracker {
    arena: MemoryArena,
    uploader: ResourceUploader,
    registry: MaterialRegistry,
    buffers: SyncBuffers,

    mode: UploadMode,
    draw_waits: Vec<DrawWait>,

    /// mesh -> (first vertex, vertex count)，按第一次出现的顺序
    mesh_ranges: IndexMap<MeshHandle, (u32, u32)>,
    draw_indices: IndexMap<ObjectHandle, u32>,
    vertex_count: u32,
}

// new & init
impl SceneSyncTracker {
    pub fn new(device: &Rc<dyn GfxDevice>, config: &StreamConfig) -> SceneResult<Self> {
        let mut arena = MemoryArena::new(device.clone());
        let created = Self::create_pools(&mut arena, config).and_then(|pools| {
            let buffers = Self::create_buffers(&mut arena, &pools, config)?;
            let registry = MaterialRegistry::new(
                &mut arena,
                pools.texture_local,
                pools.texture_host,
                pools.metadata_host,
                config.buffers.texture_staging,
                config.buffers.material,
            )?;
            let uploader = ResourceUploader::new(device)?;
            Ok((buffers, registry, uploader))
        });
        let (buffers, registry, uploader) = match created {
            Ok(created) => created,
            Err(err) => {
                arena.destroy();
                return Err(err);
            }
        };

        log::info!("SceneSyncTracker created, upload mode {:?}", config.upload_mode);
        Ok(Self {
            arena,
            uploader,
            registry,
            buffers,
            mode: config.upload_mode,
            draw_waits: vec![],
            mesh_ranges: IndexMap::new(),
            draw_indices: IndexMap::new(),
            vertex_count: 0,
        })
    }

    fn create_pools(arena: &mut MemoryArena, config: &StreamConfig) -> SceneResult<SyncPools> {
        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let sizes = &config.pools;
        Ok(SyncPools {
            geometry_local: arena.create_pool(UsageClass::Geometry, local, sizes.geometry_local)?,
            geometry_host: arena.create_pool(UsageClass::Geometry, host, sizes.geometry_host)?,
            metadata_local: arena.create_pool(UsageClass::Metadata, local, sizes.metadata_local)?,
            metadata_host: arena.create_pool(UsageClass::Metadata, host, sizes.metadata_host)?,
            texture_local: arena.create_pool(UsageClass::Texture, local, sizes.texture_local)?,
            texture_host: arena.create_pool(UsageClass::Texture, host, sizes.texture_staging)?,
        })
    }

    fn create_buffers(arena: &mut MemoryArena, pools: &SyncPools, config: &StreamConfig) -> SceneResult<SyncBuffers> {
        let sizes = &config.buffers;
        let device_usage = vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST;
        let camera_size = round_up_16(CameraUniform::PACKED_SIZE) as vk::DeviceSize;
        Ok(SyncBuffers {
            geometry_staging: arena.create_buffer(
                pools.geometry_host,
                sizes.geometry,
                vk::BufferUsageFlags::TRANSFER_SRC,
            )?,
            geometry: arena.create_buffer(pools.geometry_local, sizes.geometry, device_usage)?,
            draw_info_staging: arena.create_buffer(
                pools.metadata_host,
                sizes.draw_info,
                vk::BufferUsageFlags::TRANSFER_SRC,
            )?,
            draw_info: arena.create_buffer(pools.metadata_local, sizes.draw_info, device_usage)?,
            camera: arena.create_buffer(pools.metadata_host, camera_size, vk::BufferUsageFlags::UNIFORM_BUFFER)?,
        })
    }
}

// destroy
impl SceneSyncTracker {
    pub fn destroy(self) {
        if !self.draw_waits.is_empty() {
            log::warn!("{} draw waits dropped without being consumed", self.draw_waits.len());
        }
        self.uploader.destroy();
        self.arena.destroy();
        log::info!("SceneSyncTracker destroyed.");
    }
}

// getter
impl SceneSyncTracker {
    #[inline]
    pub fn upload_mode(&self) -> UploadMode {
        self.mode
    }

    #[inline]
    pub fn upload_stats(&self) -> UploadStats {
        self.uploader.stats()
    }

    #[inline]
    pub fn arena(&self) -> &MemoryArena {
        &self.arena
    }

    #[inline]
    pub fn registry(&self) -> &MaterialRegistry {
        &self.registry
    }

    /// geometry buffer 中的顶点总数
    #[inline]
    pub fn geometry_vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn draw_info_count(&self) -> u32 {
        self.draw_indices.len() as u32
    }

    /// mesh 在 geometry buffer 中的 (起始顶点, 顶点数)
    #[inline]
    pub fn mesh_range(&self, mesh: MeshHandle) -> Option<(u32, u32)> {
        self.mesh_ranges.get(&mesh).copied()
    }

    /// 对象在 draw-info buffer 中的下标
    #[inline]
    pub fn draw_index(&self, object: ObjectHandle) -> Option<u32> {
        self.draw_indices.get(&object).copied()
    }

    #[inline]
    pub fn geometry_buffer(&self) -> &BufferHandle {
        &self.buffers.geometry
    }

    #[inline]
    pub fn draw_info_buffer(&self) -> &BufferHandle {
        &self.buffers.draw_info
    }

    #[inline]
    pub fn material_buffer(&self) -> &BufferHandle {
        self.registry.material_buffer()
    }

    #[inline]
    pub fn camera_buffer(&self) -> &BufferHandle {
        &self.buffers.camera
    }

    /// 还没有被 [`SceneSyncTracker::take_draw_waits`] 取走的等待
    #[inline]
    pub fn pending_draw_waits(&self) -> &[DrawWait] {
        &self.draw_waits
    }
}

// sync
impl SceneSyncTracker {
    /// 将场景的变化同步到 GPU
    ///
    /// 失败时 dirty 标记保持不变，下一次调用会重新执行同样的工作
    pub fn sync_update(&mut self, scene: &mut Scene) -> SceneResult<SyncReport> {
        match self.run_sync_pass(scene) {
            Ok(report) => {
                scene.clear_dirty();
                if report.geometry_uploaded || report.draw_infos_uploaded || report.removed_materials > 0 {
                    log::info!(
                        "scene synced: geometry {} ({} vertices), draw infos {} ({} objects), {} materials removed",
                        report.geometry_uploaded,
                        report.vertex_count,
                        report.draw_infos_uploaded,
                        report.draw_info_count,
                        report.removed_materials
                    );
                }
                Ok(report)
            }
            Err(err) => {
                log::error!("scene sync aborted, dirty flags kept for retry: {}", err);
                Err(err)
            }
        }
    }

    fn run_sync_pass(&mut self, scene: &Scene) -> SceneResult<SyncReport> {
        let mut report = SyncReport::default();

        // 1. 场景中仍在使用的材质
        let referenced: IndexSet<MaterialHandle> = scene.objects().map(|(_, object)| object.material()).collect();

        // 2. 移除不再被引用的材质
        let stale = self.registry.known_materials().filter(|material| !referenced.contains(material)).collect_vec();
        for material in stale {
            if let Some(index) = self.registry.remove_material(material) {
                log::warn!("material {:?} no longer referenced, draw-info index {} released", material, index);
                report.removed_materials += 1;
            }
        }

        let rebuild_geometry = scene.structure_dirty() || scene.any_dirty(DirtyFlags::MESH);
        let rebuild_draw_infos =
            rebuild_geometry || scene.any_dirty(DirtyFlags::MATERIAL | DirtyFlags::TRANSFORM);

        // 上一次的拷贝还没有 reclaim 时，staging buffer 可能仍在被读取，这一轮改为同步上传
        let mode = if self.mode == UploadMode::Pipelined && self.uploader.pending_count() > 0 && rebuild_draw_infos {
            log::warn!(
                "{} pipelined uploads not reclaimed yet, this pass uploads synchronously",
                self.uploader.pending_count()
            );
            UploadMode::Synchronous
        } else {
            self.mode
        };

        // 3. geometry buffer
        let geometry = if rebuild_geometry {
            let (mesh_ranges, vertex_count) = self.rebuild_geometry(scene, mode)?;
            report.geometry_uploaded = true;
            report.vertex_count = vertex_count;
            Some((mesh_ranges, vertex_count))
        } else {
            report.vertex_count = self.vertex_count;
            None
        };

        // 4. draw-info buffer 与 material buffer
        let draw_indices = if rebuild_draw_infos {
            let ranges = match &geometry {
                Some((ranges, _)) => Cow::Borrowed(ranges),
                None => Cow::Owned(self.mesh_ranges.clone()),
            };
            let draw_indices = self.rebuild_draw_infos(scene, &ranges, mode)?;
            self.registry.update_gpu_data(&mut self.arena)?;
            report.draw_infos_uploaded = true;
            report.draw_info_count = draw_indices.len() as u32;
            Some(draw_indices)
        } else {
            report.draw_info_count = self.draw_indices.len() as u32;
            None
        };

        // 全部成功之后才更新记录
        if let Some((ranges, vertex_count)) = geometry {
            self.mesh_ranges = ranges;
            self.vertex_count = vertex_count;
        }
        if let Some(draw_indices) = draw_indices {
            self.draw_indices = draw_indices;
        }
        Ok(report)
    }

    /// 按第一次出现的顺序展开所有被引用的 mesh，写入 staging 后整体上传
    fn rebuild_geometry(
        &mut self,
        scene: &Scene,
        mode: UploadMode,
    ) -> SceneResult<(IndexMap<MeshHandle, (u32, u32)>, u32)> {
        let mut mesh_ranges = IndexMap::new();
        let mut vertices: Vec<Vertex> = vec![];
        for (_, object) in scene.objects() {
            let handle = object.mesh();
            if mesh_ranges.contains_key(&handle) {
                continue;
            }
            let mesh = scene.mesh(handle).ok_or(SceneError::UnknownMesh(handle))?;
            let flat = mesh.flat_vertices();
            mesh_ranges.insert(handle, (vertices.len() as u32, flat.len() as u32));
            vertices.extend_from_slice(&flat);
        }

        let byte_count =
            self.buffers.geometry_staging.store_slice(&mut self.arena, 0, &vertices, StrideMode::Aligned16)?;
        if byte_count > 0 {
            let completion = self.uploader.upload_buffer(
                &self.buffers.geometry_staging,
                &self.buffers.geometry,
                byte_count,
                mode,
            )?;
            self.track(completion);
        }
        log::debug!("geometry rebuilt: {} meshes, {} vertices", mesh_ranges.len(), vertices.len());
        Ok((mesh_ranges, vertices.len() as u32))
    }

    fn rebuild_draw_infos(
        &mut self,
        scene: &Scene,
        mesh_ranges: &IndexMap<MeshHandle, (u32, u32)>,
        mode: UploadMode,
    ) -> SceneResult<IndexMap<ObjectHandle, u32>> {
        let mut draw_indices = IndexMap::with_capacity(scene.object_count());
        let mut draw_infos = Vec::with_capacity(scene.object_count());
        for (handle, object) in scene.objects() {
            let material = scene.material(object.material()).ok_or(SceneError::UnknownMaterial(object.material()))?;
            let material_index =
                self.registry.load_material(&mut self.arena, &mut self.uploader, object.material(), material)?;
            let &(first_vertex_index, vertex_count) =
                mesh_ranges.get(&object.mesh()).ok_or(SceneError::UnknownMesh(object.mesh()))?;

            draw_indices.insert(handle, draw_infos.len() as u32);
            draw_infos.push(ObjectDrawInfo {
                transform: object.transform(),
                first_vertex_index,
                vertex_count,
                material_index,
            });
        }

        let byte_count =
            self.buffers.draw_info_staging.store_slice(&mut self.arena, 0, &draw_infos, StrideMode::Aligned16)?;
        if byte_count > 0 {
            let completion = self.uploader.upload_buffer(
                &self.buffers.draw_info_staging,
                &self.buffers.draw_info,
                byte_count,
                mode,
            )?;
            self.track(completion);
        }
        Ok(draw_indices)
    }

    fn track(&mut self, completion: UploadCompletion) {
        if let UploadCompletion::Pending { semaphore, wait_stage } = completion {
            self.draw_waits.push(DrawWait {
                semaphore,
                stage: wait_stage,
            });
        }
    }

    /// 相机变化时写入 camera buffer，返回是否写入
    pub fn sync_camera(&mut self, scene: &mut Scene) -> SceneResult<bool> {
        if !scene.camera_dirty() {
            return Ok(false);
        }
        self.buffers.camera.store_value(&mut self.arena, 0, &scene.camera().to_uniform())?;
        scene.clear_camera_dirty();
        Ok(true)
    }

    /// 取走 Pipelined 模式下产生的等待，交给下一次 draw 提交
    pub fn take_draw_waits(&mut self) -> Vec<DrawWait> {
        std::mem::take(&mut self.draw_waits)
    }

    /// 在等待过这些 semaphore 的帧执行完之后调用，释放上传用的 command buffer 和 semaphore
    pub fn reclaim(&mut self) -> usize {
        if !self.draw_waits.is_empty() {
            log::warn!("reclaim with {} draw waits never taken, dropping them", self.draw_waits.len());
            self.draw_waits.clear();
        }
        self.uploader.reclaim()
    }
}
