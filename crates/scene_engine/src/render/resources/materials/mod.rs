//! Material system
//!
//! Material definitions and the uniform values they upload.

pub mod material;
pub mod material_uniforms;

pub use material::{EnvMapMode, MapSlot, Material, MaterialType, ShaderSource, TextureHandle};
pub use material_uniforms::{map_uniform_name, material_uniforms};
