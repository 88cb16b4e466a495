//! Ray picking
//!
//! Converts pointer coordinates to normalized device coordinates, builds a
//! world-space ray from a camera and intersects it with the scene's
//! drawables. Picking reads the same graph the renderer draws but never
//! touches GPU state.
//!
//! ```text
//! pointer (px) ──screen_to_ndc──> NDC ──set_from_camera──> Ray
//!                                                           │
//!                         intersect_object(s) <─────────────┘
//!                                 │
//!                 mesh / line / points / sprite tests
//!                                 │
//!                     Vec<Intersection> (nearest first)
//! ```

pub mod intersect;
pub mod raycaster;

pub use intersect::{Face, Intersection};
pub use raycaster::{RaycastParams, Raycaster};

use crate::foundation::math::Vec2;

/// Pointer position in pixels (origin top-left) to NDC (`[-1, 1]`, y up)
pub fn screen_to_ndc(x: f32, y: f32, width: u32, height: u32) -> Vec2 {
    let width = width.max(1) as f32;
    let height = height.max(1) as f32;
    Vec2::new(x / width * 2.0 - 1.0, -(y / height) * 2.0 + 1.0)
}
