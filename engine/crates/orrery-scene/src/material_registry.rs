use ash::vk;
use orrery_gfx::{
    memory::arena::{MemoryArena, PoolId},
    resources::{buffer::BufferHandle, image::ImageHandle},
    upload::uploader::{ResourceUploader, UploadMode},
};
use orrery_layout_trait::StrideMode;
use slotmap::SecondaryMap;

use crate::{
    components::material::{Material, TextureData},
    error::{SceneError, SceneResult},
    gpu_types::MaterialDrawInfo,
    handles::MaterialHandle,
};

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// 已经加载到 GPU 的材质
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialRecord {
    pub draw_info_index: u32,
    /// 在 [`MaterialRegistry::textures`] 中的下标
    pub texture_index: Option<u32>,
}

/// 材质到 draw-info 下标的映射，以及纹理的上传
///
/// 材质以场景中的 [`MaterialHandle`] 区分，内容相同但分别注册的两个材质占用两个槽位。
/// 移除材质后槽位可以被复用，但纹理仍然留在 arena 中。
pub struct MaterialRegistry {
    records: SecondaryMap<MaterialHandle, MaterialRecord>,
    /// 按 draw-info 下标排列，`None` 为空出的槽位
    draw_infos: Vec<Option<MaterialDrawInfo>>,
    textures: Vec<ImageHandle>,
    /// 上传失败的纹理，同一个材质重试时复用，不再从 texture pool 分配
    failed_textures: SecondaryMap<MaterialHandle, ImageHandle>,

    texture_pool: PoolId,
    texture_staging: BufferHandle,
    material_buffer: BufferHandle,

    texture_upload_count: u32,
}

// new & init
impl MaterialRegistry {
    /// - `texture_pool`: device local，存放纹理
    /// - `staging_pool`: host visible，存放纹理 staging buffer
    /// - `metadata_pool`: host visible，存放 material buffer
    pub fn new(
        arena: &mut MemoryArena,
        texture_pool: PoolId,
        staging_pool: PoolId,
        metadata_pool: PoolId,
        texture_staging_size: vk::DeviceSize,
        material_buffer_size: vk::DeviceSize,
    ) -> SceneResult<Self> {
        let texture_staging =
            arena.create_buffer(staging_pool, texture_staging_size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        let material_buffer =
            arena.create_buffer(metadata_pool, material_buffer_size, vk::BufferUsageFlags::STORAGE_BUFFER)?;
        Ok(Self {
            records: SecondaryMap::new(),
            draw_infos: vec![],
            textures: vec![],
            failed_textures: SecondaryMap::new(),
            texture_pool,
            texture_staging,
            material_buffer,
            texture_upload_count: 0,
        })
    }
}

// getter
impl MaterialRegistry {
    #[inline]
    pub fn contains(&self, identity: MaterialHandle) -> bool {
        self.records.contains_key(identity)
    }

    #[inline]
    pub fn index_of(&self, identity: MaterialHandle) -> Option<u32> {
        self.records.get(identity).map(|record| record.draw_info_index)
    }

    #[inline]
    pub fn record(&self, identity: MaterialHandle) -> Option<&MaterialRecord> {
        self.records.get(identity)
    }

    /// 已加载的材质数量
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn known_materials(&self) -> impl Iterator<Item = MaterialHandle> + '_ {
        self.records.keys()
    }

    /// 所有上传过的纹理，按纹理下标排列
    #[inline]
    pub fn textures(&self) -> &[ImageHandle] {
        &self.textures
    }

    #[inline]
    pub fn texture_upload_count(&self) -> u32 {
        self.texture_upload_count
    }

    #[inline]
    pub fn material_buffer(&self) -> &BufferHandle {
        &self.material_buffer
    }

    /// draw-info 表的长度，包括空出的槽位
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.draw_infos.len()
    }
}

// tools
impl MaterialRegistry {
    /// 返回材质的 draw-info 下标，第一次遇到时上传纹理并分配槽位
    ///
    /// 纹理 staging buffer 只有一份，所以纹理总是同步上传
    pub fn load_material(
        &mut self,
        arena: &mut MemoryArena,
        uploader: &mut ResourceUploader,
        identity: MaterialHandle,
        material: &Material,
    ) -> SceneResult<u32> {
        if let Some(record) = self.records.get(identity) {
            return Ok(record.draw_info_index);
        }

        let texture_index = match material.texture() {
            Some(texture) => Some(self.upload_texture(arena, uploader, identity, texture)?),
            None => None,
        };

        let draw_info = MaterialDrawInfo::new(material, texture_index);
        let draw_info_index = match self.draw_infos.iter().position(Option::is_none) {
            Some(vacant) => {
                self.draw_infos[vacant] = Some(draw_info);
                vacant
            }
            None => {
                self.draw_infos.push(Some(draw_info));
                self.draw_infos.len() - 1
            }
        } as u32;

        self.records.insert(
            identity,
            MaterialRecord {
                draw_info_index,
                texture_index,
            },
        );
        log::debug!("material {:?} loaded at index {}", identity, draw_info_index);
        Ok(draw_info_index)
    }

    fn upload_texture(
        &mut self,
        arena: &mut MemoryArena,
        uploader: &mut ResourceUploader,
        identity: MaterialHandle,
        texture: &TextureData,
    ) -> SceneResult<u32> {
        if texture.pixels().len() as vk::DeviceSize > self.texture_staging.size() {
            return Err(SceneError::TextureTooLarge {
                len: texture.pixels().len(),
                staging: self.texture_staging.size(),
            });
        }

        let extent = vk::Extent2D {
            width: texture.width(),
            height: texture.height(),
        };
        let mut image = match self.failed_textures.remove(identity) {
            Some(image) if image.extent() == extent => image,
            stale => {
                if let Some(stale) = stale {
                    log::warn!("texture of material {:?} changed size, image {:?} is abandoned", identity, stale.vk_image());
                }
                arena.create_image(
                    self.texture_pool,
                    extent,
                    TEXTURE_FORMAT,
                    vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                )?
            }
        };
        if let Err(err) =
            uploader.upload_image(arena, texture.pixels(), &self.texture_staging, &mut image, UploadMode::Synchronous)
        {
            self.failed_textures.insert(identity, image);
            return Err(err.into());
        }

        self.textures.push(image);
        self.texture_upload_count += 1;
        Ok(self.textures.len() as u32 - 1)
    }

    /// 移除材质，返回它空出的下标
    pub fn remove_material(&mut self, identity: MaterialHandle) -> Option<u32> {
        self.failed_textures.remove(identity);
        let record = self.records.remove(identity)?;
        self.draw_infos[record.draw_info_index as usize] = None;
        log::debug!("material {:?} removed, index {} is free", identity, record.draw_info_index);
        Some(record.draw_info_index)
    }

    /// 将整张 draw-info 表写入 material buffer，空槽位写入全零
    pub fn update_gpu_data(&self, arena: &mut MemoryArena) -> SceneResult<()> {
        if self.draw_infos.is_empty() {
            return Ok(());
        }
        let infos = self.draw_infos.iter().map(|info| info.unwrap_or_default()).collect::<Vec<_>>();
        let written = self.material_buffer.store_slice(arena, 0, &infos, StrideMode::Packed)?;
        log::debug!("material buffer updated: {} slots, {} bytes", infos.len(), written);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use orrery_gfx::{
        foundation::{device::GfxDevice, headless_device::HeadlessDevice},
        memory::arena::UsageClass,
    };
    use orrery_layout_trait::GpuLayout;
    use slotmap::SlotMap;

    use super::*;

    struct Fixture {
        device: Rc<HeadlessDevice>,
        arena: MemoryArena,
        uploader: ResourceUploader,
        registry: MaterialRegistry,
        texture_pool: PoolId,
        handles: SlotMap<MaterialHandle, ()>,
    }

    fn fixture() -> Fixture {
        orrery_crate_tools::init_log::init_log();
        let device = Rc::new(HeadlessDevice::new());
        let dyn_device: Rc<dyn GfxDevice> = device.clone();
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        let mut arena = MemoryArena::new(dyn_device.clone());
        let texture_pool = arena.create_pool(UsageClass::Texture, vk::MemoryPropertyFlags::DEVICE_LOCAL, 1 << 16).unwrap();
        let staging_pool = arena.create_pool(UsageClass::Texture, host, 1 << 16).unwrap();
        let metadata_pool = arena.create_pool(UsageClass::Metadata, host, 1 << 12).unwrap();
        let registry = MaterialRegistry::new(&mut arena, texture_pool, staging_pool, metadata_pool, 4096, 256).unwrap();
        let uploader = ResourceUploader::new(&dyn_device).unwrap();

        Fixture {
            device,
            arena,
            uploader,
            registry,
            texture_pool,
            handles: SlotMap::with_key(),
        }
    }

    impl Fixture {
        fn load(&mut self, identity: MaterialHandle, material: &Material) -> u32 {
            self.registry.load_material(&mut self.arena, &mut self.uploader, identity, material).unwrap()
        }

        fn finish(self) {
            self.uploader.destroy();
            self.arena.destroy();
            assert_eq!(self.device.live_objects(), (0, 0, 0));
        }
    }

    fn checker() -> Material {
        Material::Lambertian {
            texture: TextureData::new(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 255]).unwrap(),
        }
    }

    #[test]
    fn test_cache_hit_skips_upload() {
        let mut f = fixture();
        let identity = f.handles.insert(());
        let material = checker();

        let first = f.load(identity, &material);
        let second = f.load(identity, &material);
        assert_eq!(first, second);
        assert_eq!(f.registry.texture_upload_count(), 1);
        assert_eq!(f.uploader.stats().image_uploads, 1);

        let texture = &f.registry.textures()[0];
        assert_eq!(texture.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(f.device.read_image(texture.vk_image()).unwrap(), material.texture().unwrap().pixels());
        f.finish();
    }

    #[test]
    fn test_equal_materials_registered_twice_are_distinct() {
        let mut f = fixture();
        let a = f.handles.insert(());
        let b = f.handles.insert(());
        let glass = Material::Dielectric { refractive_index: 1.5 };

        assert_eq!(f.load(a, &glass), 0);
        assert_eq!(f.load(b, &glass), 1);
        assert_eq!(f.registry.len(), 2);
        assert_eq!(f.registry.texture_upload_count(), 0);
        f.finish();
    }

    #[test]
    fn test_vacated_index_reused() {
        let mut f = fixture();
        let [a, b, c] = [(); 3].map(|_| f.handles.insert(()));
        let glass = Material::Dielectric { refractive_index: 1.5 };
        f.load(a, &glass);
        f.load(b, &glass);

        assert_eq!(f.registry.remove_material(a), Some(0));
        assert_eq!(f.registry.remove_material(a), None);
        assert!(!f.registry.contains(a));

        assert_eq!(f.load(c, &checker()), 0);
        assert_eq!(f.registry.index_of(b), Some(1));
        assert_eq!(f.registry.record(c).unwrap().texture_index, Some(0));
        f.finish();
    }

    #[test]
    fn test_update_gpu_data_writes_packed_records() {
        let mut f = fixture();
        let [a, b, c] = [(); 3].map(|_| f.handles.insert(()));
        f.load(a, &Material::Dielectric { refractive_index: 1.25 });
        f.load(b, &checker());
        f.load(c, &Material::Dielectric { refractive_index: 2.0 });
        f.registry.remove_material(a);
        f.registry.update_gpu_data(&mut f.arena).unwrap();

        let stride = MaterialDrawInfo::PACKED_SIZE as vk::DeviceSize;
        let bytes = f.device.read_buffer(f.registry.material_buffer().vk_buffer(), 0, 3 * stride).unwrap();
        assert_eq!(&bytes[..12], &[0; 12]);

        let lambertian = MaterialDrawInfo::deserialize(&bytes, 12);
        assert_eq!(lambertian.kind, Material::KIND_LAMBERTIAN);
        assert_eq!(lambertian.texture_index, 0);

        let glass = MaterialDrawInfo::deserialize(&bytes, 24);
        assert_eq!(glass.kind, Material::KIND_DIELECTRIC);
        assert_eq!(glass.texture_index, -1);
        assert_eq!(glass.refractive_index, 2.0);
        f.finish();
    }

    #[test]
    fn test_oversized_texture_fails_without_record() {
        let mut f = fixture();
        let identity = f.handles.insert(());
        // 64 * 32 * 4 > 4096 字节的 staging
        let big = Material::Lambertian {
            texture: TextureData::solid(64, 32, [1, 2, 3, 4]).unwrap(),
        };
        for _ in 0..12 {
            let result = f.registry.load_material(&mut f.arena, &mut f.uploader, identity, &big);
            assert!(matches!(result, Err(SceneError::TextureTooLarge { len: 8192, staging: 4096 })));
        }
        assert!(!f.registry.contains(identity));
        assert_eq!(f.registry.texture_upload_count(), 0);
        assert_eq!(f.arena.used(f.texture_pool).unwrap(), 0);
        f.finish();
    }

    #[test]
    fn test_failed_texture_upload_reuses_image() {
        let mut f = fixture();
        let identity = f.handles.insert(());
        let material = Material::Lambertian {
            texture: TextureData::solid(8, 8, [7, 8, 9, 255]).unwrap(),
        };

        f.device.fail_next_submit();
        assert!(f.registry.load_material(&mut f.arena, &mut f.uploader, identity, &material).is_err());
        let used = f.arena.used(f.texture_pool).unwrap();
        assert!(used > 0);

        for _ in 0..5 {
            f.device.fail_next_submit();
            assert!(f.registry.load_material(&mut f.arena, &mut f.uploader, identity, &material).is_err());
            assert_eq!(f.arena.used(f.texture_pool).unwrap(), used);
        }

        assert_eq!(f.load(identity, &material), 0);
        assert_eq!(f.arena.used(f.texture_pool).unwrap(), used);
        assert_eq!(f.registry.texture_upload_count(), 1);
        let texture = &f.registry.textures()[0];
        assert_eq!(texture.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(f.device.read_image(texture.vk_image()).unwrap(), material.texture().unwrap().pixels());
        f.finish();
    }
}
