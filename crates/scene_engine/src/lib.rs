//! # Scene Engine
//!
//! A retained-mode 3D scene graph with an API-independent render core.
//!
//! ## Features
//!
//! - **Transform Hierarchy**: nodes with cached local/world matrices and dirty tracking
//! - **Buffer Geometry**: typed vertex attributes, narrow index selection, groups and bounds
//! - **Program Cache**: materials map to shader programs keyed by their feature set
//! - **Render Lists**: frustum culling, bucketing and deterministic sorting
//! - **Draw Loop**: state-diffed backend calls through the [`GpuBackend`](render::GpuBackend) trait
//! - **Picking**: ray intersection against meshes, lines, points and sprites
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scene = Scene::new();
//!     let root = scene.root();
//!
//!     let camera = scene.add_camera(root, Camera::perspective(50.0, 16.0 / 9.0, 0.1, 100.0))?;
//!     if let Some(node) = scene.graph.node_mut(camera) {
//!         node.set_position(Vec3::new(0.0, 0.0, 5.0));
//!     }
//!
//!     let geometry = scene.add_geometry(BufferGeometry::from_positions(&[
//!         Vec3::new(-1.0, -1.0, 0.0),
//!         Vec3::new(1.0, -1.0, 0.0),
//!         Vec3::new(0.0, 1.0, 0.0),
//!     ]));
//!     let material = scene.add_material(Material::basic(Vec3::new(1.0, 0.0, 0.0)));
//!     scene.add_mesh(root, geometry, material)?;
//!
//!     let mut renderer = Renderer::new(HeadlessBackend::new(), RendererConfig::default());
//!     renderer.set_size(1280, 720, 1.0);
//!     renderer.render(&mut scene, camera)?;
//!
//!     let mut raycaster = Raycaster::default();
//!     raycaster.set_from_camera(screen_to_ndc(640.0, 360.0, 1280, 720), &scene, camera)?;
//!     let hits = raycaster.intersect_object(&scene, root, true);
//!     println!("{} hit(s), {} draw call(s)", hits.len(), renderer.info().calls);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core settings
pub mod core;

pub mod config;
pub mod foundation;
pub mod geometry;
pub mod picking;
pub mod render;
pub mod scene;

#[cfg(test)]
mod tests;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::Config,
        core::config::{EngineConfig, LoggingConfig, PickingConfig, RendererConfig},
        foundation::{
            bounds::{BoundingSphere, Frustum, Plane, AABB},
            math::{Mat4, Quat, Transform, Vec2, Vec3, Vec4},
            ray::Ray,
        },
        geometry::{BufferAttribute, BufferGeometry, GeometryError},
        picking::{screen_to_ndc, Intersection, Raycaster},
        render::{
            resources::materials::{Material, MaterialType},
            GpuBackend, HeadlessBackend, RenderError, RenderInfo, Renderer,
        },
        scene::{
            Camera, Drawable, GeometryId, Light, LineTopology, MaterialId, NodeId, NodeKind, Primitive, Scene,
            SceneError,
        },
    };
}
