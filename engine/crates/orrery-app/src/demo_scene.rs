use glam::{Mat4, Vec2, Vec3};
use orrery_scene::{
    SceneResult,
    components::{
        camera::Camera,
        material::{Material, TextureData},
        mesh::Mesh,
        vertex::Vertex,
    },
    handles::ObjectHandle,
    scene::Scene,
};

/// 演示场景：一个地面、若干个带纹理的三角形和一块玻璃
pub struct DemoScene {
    pub scene: Scene,
    /// 每帧会移动的对象
    pub spinning: Vec<ObjectHandle>,
}

fn quad_mesh(size: f32) -> SceneResult<Mesh> {
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
        .into_iter()
        .map(|(x, z)| Vertex::new(Vec3::new(x * size, 0.0, z * size), Vec2::new((x + 1.0) / 2.0, (z + 1.0) / 2.0)))
        .collect();
    Mesh::indexed(corners, vec![0, 1, 2, 2, 3, 0])
}

fn triangle_mesh() -> Mesh {
    Mesh::new(vec![
        Vertex::new(Vec3::new(-0.5, 0.0, 0.0), Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(0.5, 0.0, 0.0), Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(0.0, 1.0, 0.0), Vec2::new(0.5, 1.0)),
    ])
}

/// 两种颜色交替的棋盘格
fn checker_texture(size: u32, a: [u8; 4], b: [u8; 4]) -> SceneResult<TextureData> {
    let pixels = (0..size * size).flat_map(|i| if (i / size + i % size) % 2 == 0 { a } else { b }).collect();
    TextureData::new(size, size, pixels)
}

impl DemoScene {
    pub fn build(triangle_count: usize) -> SceneResult<Self> {
        let mut scene = Scene::new(Camera::new(Vec3::new(0.0, 2.0, 6.0), Vec3::new(0.0, -0.3, -1.0).normalize()));

        let ground_mesh = scene.add_mesh(quad_mesh(5.0)?);
        let triangle = scene.add_mesh(triangle_mesh());

        let ground = scene.add_material(Material::Lambertian {
            texture: checker_texture(8, [200, 200, 200, 255], [40, 40, 40, 255])?,
        });
        let red = scene.add_material(Material::Lambertian {
            texture: TextureData::solid(4, 4, [220, 30, 30, 255])?,
        });
        let glass = scene.add_material(Material::Dielectric { refractive_index: 1.5 });

        scene.add_object(ground_mesh, ground, Mat4::IDENTITY)?;
        let mut spinning = Vec::with_capacity(triangle_count);
        for i in 0..triangle_count {
            let material = if i % 2 == 0 { red } else { glass };
            let offset = Vec3::new(i as f32 - triangle_count as f32 / 2.0, 0.0, 0.0);
            spinning.push(scene.add_object(triangle, material, Mat4::from_translation(offset))?);
        }

        Ok(Self { scene, spinning })
    }

    /// 让所有三角形绕 y 轴转动
    pub fn animate(&mut self, frame: u32) -> SceneResult<()> {
        let angle = frame as f32 * 0.1;
        for (i, &object) in self.spinning.iter().enumerate() {
            let offset = Vec3::new(i as f32 - self.spinning.len() as f32 / 2.0, 0.0, 0.0);
            self.scene.set_transform(object, Mat4::from_translation(offset) * Mat4::from_rotation_y(angle))?;
        }
        Ok(())
    }
}
