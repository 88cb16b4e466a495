//! Resource management
//!
//! Materials and the shader programs compiled for them.

pub mod materials;
pub mod programs;
