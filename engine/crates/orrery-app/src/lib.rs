pub mod demo_scene;
pub mod frame_loop;
