pub mod buffer;
pub mod image;
